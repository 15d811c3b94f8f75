//! Inbound-only push notifications on a second connection.

use std::time::Duration;

use crate::codec::{self, WireKind, WireValue};
use crate::error::RobolinkError;
use crate::model::{Handle, Matrix2D, Pose};
use crate::transport::{self, TcpTransport, Transport};

/// Opening line that subscribes a connection to events.
pub const EVENT_SUBSCRIBE: &str = "RDK_EVT";
/// Event protocol version requested by this client.
pub const EVENT_PROTOCOL_VERSION: i32 = 0;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EventKind {
    SelectionChanged,
    ItemMoved,
    ReferencePicked,
    ReferenceReleased,
    ToolModified,
    Selection3dChanged,
    ViewMoved,
    RobotMoved,
    Key,
    ItemMovedPose,
    Selection3dClick,
    ItemChanged,
    ItemRenamed,
    ItemVisibility,
    StationChanged,
}

/// Shape of the payload that follows an event's item handle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum PayloadShape {
    Empty,
    PoseOnly,
    PoseAndMatrix,
    ThreeInts,
}

impl EventKind {
    pub fn from_code(code: i32) -> Option<Self> {
        let kind = match code {
            1 => Self::SelectionChanged,
            2 => Self::ItemMoved,
            3 => Self::ReferencePicked,
            4 => Self::ReferenceReleased,
            5 => Self::ToolModified,
            7 => Self::Selection3dChanged,
            8 => Self::ViewMoved,
            9 => Self::RobotMoved,
            10 => Self::Key,
            11 => Self::ItemMovedPose,
            15 => Self::Selection3dClick,
            16 => Self::ItemChanged,
            17 => Self::ItemRenamed,
            18 => Self::ItemVisibility,
            19 => Self::StationChanged,
            _ => return None,
        };
        Some(kind)
    }

    pub fn code(self) -> i32 {
        match self {
            Self::SelectionChanged => 1,
            Self::ItemMoved => 2,
            Self::ReferencePicked => 3,
            Self::ReferenceReleased => 4,
            Self::ToolModified => 5,
            Self::Selection3dChanged => 7,
            Self::ViewMoved => 8,
            Self::RobotMoved => 9,
            Self::Key => 10,
            Self::ItemMovedPose => 11,
            Self::Selection3dClick => 15,
            Self::ItemChanged => 16,
            Self::ItemRenamed => 17,
            Self::ItemVisibility => 18,
            Self::StationChanged => 19,
        }
    }

    fn payload_shape(self) -> PayloadShape {
        match self {
            Self::ItemMovedPose => PayloadShape::PoseOnly,
            Self::Selection3dChanged => PayloadShape::PoseAndMatrix,
            Self::Key | Self::Selection3dClick => PayloadShape::ThreeInts,
            _ => PayloadShape::Empty,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum EventPayload {
    None,
    Pose(Pose),
    /// Pick pose plus the remote's pick data (point, normal, ...).
    Pick { pose: Pose, data: Matrix2D },
    Key {
        pressed: bool,
        key: i32,
        modifiers: i32,
    },
    Pointer {
        x: i32,
        y: i32,
        button: i32,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub item: Handle,
    pub payload: EventPayload,
}

/// A subscribed event connection. No bytes go to the remote after subscribing.
#[derive(Debug)]
pub struct EventChannel<T: Transport = TcpTransport> {
    transport: T,
    version: i32,
}

impl<T: Transport> EventChannel<T> {
    pub fn subscribe(mut transport: T, timeout: Duration) -> Result<Self, RobolinkError> {
        match subscribe_handshake(&mut transport, timeout) {
            Ok(version) => {
                debug!(version, "event channel subscribed");
                Ok(Self { transport, version })
            }
            Err(err) => {
                transport.shutdown();
                Err(err)
            }
        }
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    /// How long [`EventChannel::next_event`] waits for an event to start arriving.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<(), RobolinkError> {
        self.transport.set_read_timeout(timeout)
    }

    /// Reads the next event, or `None` when none starts within the timeout.
    ///
    /// A timeout after the first byte of an event has arrived is a framing
    /// error, as is an unknown event code whose payload length is unknowable.
    pub fn next_event(&mut self) -> Result<Option<Event>, RobolinkError> {
        if !self.transport.wait_readable()? {
            return Ok(None);
        }

        let code = transport::read_int(&mut self.transport).map_err(mid_event)?;
        let kind = EventKind::from_code(code).ok_or_else(|| RobolinkError::Framing {
            reason: format!("unknown event code {code}"),
        })?;
        let item = match read(&mut self.transport, WireKind::Handle)? {
            WireValue::Handle(handle) => handle,
            other => return Err(unexpected(other)),
        };

        let payload = match kind.payload_shape() {
            PayloadShape::Empty => EventPayload::None,
            PayloadShape::PoseOnly => EventPayload::Pose(read_pose(&mut self.transport)?),
            PayloadShape::PoseAndMatrix => {
                let pose = read_pose(&mut self.transport)?;
                let data = match read(&mut self.transport, WireKind::Matrix2D)? {
                    WireValue::Matrix2D(data) => data,
                    other => return Err(unexpected(other)),
                };
                EventPayload::Pick { pose, data }
            }
            PayloadShape::ThreeInts => {
                let first = transport::read_int(&mut self.transport).map_err(mid_event)?;
                let second = transport::read_int(&mut self.transport).map_err(mid_event)?;
                let third = transport::read_int(&mut self.transport).map_err(mid_event)?;
                if kind == EventKind::Key {
                    EventPayload::Key {
                        pressed: first != 0,
                        key: second,
                        modifiers: third,
                    }
                } else {
                    EventPayload::Pointer {
                        x: first,
                        y: second,
                        button: third,
                    }
                }
            }
        };

        Ok(Some(Event {
            kind,
            item,
            payload,
        }))
    }

    pub fn close(mut self) {
        self.transport.shutdown();
    }
}

impl EventChannel<TcpTransport> {
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, RobolinkError> {
        let address = format!("{host}:{port}");
        let transport = TcpTransport::connect(&address, timeout)?;
        let channel = Self::subscribe(transport, timeout)?;
        info!(address = %address, "event channel connected");
        Ok(channel)
    }
}

fn subscribe_handshake<T: Transport>(
    transport: &mut T,
    timeout: Duration,
) -> Result<i32, RobolinkError> {
    transport.set_read_timeout(timeout)?;

    let mut hello = Vec::new();
    codec::encode_line(EVENT_SUBSCRIBE, &mut hello);
    codec::encode_int(EVENT_PROTOCOL_VERSION, &mut hello);
    transport.send(&hello)?;

    let handshake_error = |reason: String| RobolinkError::Handshake {
        address: "event channel".to_string(),
        reason,
    };

    let echo = transport::read_line(transport).map_err(|err| handshake_error(err.to_string()))?;
    if echo != EVENT_SUBSCRIBE {
        return Err(handshake_error(format!("unexpected reply `{echo}`")));
    }
    let version = transport::read_int(transport).map_err(|err| handshake_error(err.to_string()))?;
    let status = transport::read_int(transport).map_err(|err| handshake_error(err.to_string()))?;
    if status != 0 {
        return Err(handshake_error(format!("subscription refused with status {status}")));
    }

    Ok(version)
}

fn read<T: Transport>(transport: &mut T, kind: WireKind) -> Result<WireValue, RobolinkError> {
    transport::read_value(transport, kind).map_err(mid_event)
}

fn read_pose<T: Transport>(transport: &mut T) -> Result<Pose, RobolinkError> {
    match read(transport, WireKind::Pose)? {
        WireValue::Pose(pose) => Ok(pose),
        other => Err(unexpected(other)),
    }
}

/// Once an event has started, running out of time leaves the stream misaligned.
fn mid_event(err: RobolinkError) -> RobolinkError {
    match err {
        RobolinkError::Timeout { timeout } => RobolinkError::Framing {
            reason: format!("event truncated after {timeout:?}"),
        },
        other => other,
    }
}

fn unexpected(value: WireValue) -> RobolinkError {
    RobolinkError::Framing {
        reason: format!("unexpected {} in event payload", value.kind()),
    }
}

#[cfg(feature = "async")]
mod forward {
    use std::thread;

    use tokio::sync::mpsc;

    use super::{Event, EventChannel};
    use crate::error::RobolinkError;
    use crate::transport::Transport;

    const EVENT_QUEUE_CAPACITY: usize = 256;

    impl<T: Transport + 'static> EventChannel<T> {
        /// Moves the inbound loop onto its own thread and forwards events.
        ///
        /// The loop ends when the receiver is dropped, the remote disconnects,
        /// or the stream loses framing.
        pub fn spawn(mut self) -> Result<mpsc::Receiver<Event>, RobolinkError> {
            let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

            let worker_name = format!("robolink-events-{}", std::process::id());
            thread::Builder::new()
                .name(worker_name)
                .spawn(move || loop {
                    match self.next_event() {
                        Ok(Some(event)) => {
                            if event_tx.blocking_send(event).is_err() {
                                debug!("event receiver dropped");
                                break;
                            }
                        }
                        Ok(None) => {
                            if event_tx.is_closed() {
                                break;
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "event channel stopped");
                            break;
                        }
                    }
                })
                .map_err(|err| RobolinkError::Connection {
                    address: "event channel".to_string(),
                    reason: err.to_string(),
                })?;

            Ok(event_rx)
        }
    }
}
