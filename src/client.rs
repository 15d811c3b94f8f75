use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::blocking;
use crate::commands::{
    IS_BUSY, ITEM, JOINTS, MAKE_PROGRAM, NAME, POSE, REMOVE, SET_JOINTS, SET_NAME, SET_POSE,
    WAIT_MOVE,
};
use crate::config::{ClientConfig, ConfigOverrides};
use crate::error::RobolinkError;
use crate::event::{Event, EventChannel};
use crate::model::{Handle, JointVector, Pose};
use crate::request::{Request, Response};
use crate::session::Session;

const JOB_QUEUE_CAPACITY: usize = 64;

/// Async handle to one remote session.
///
/// Clones share the same worker thread and socket. Jobs from every clone are
/// served strictly in submission order, one request/response cycle at a time.
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    job_tx: mpsc::Sender<Job>,
    config: ClientConfig,
    banner: String,
}

type Reply<R> = oneshot::Sender<Result<R, RobolinkError>>;

#[derive(Debug)]
enum Job {
    Call {
        request: Request,
        reply: Reply<Response>,
    },
    CallBlocking {
        request: Request,
        reply: Reply<Response>,
    },
    WaitIdle {
        handle: Handle,
        timeout: Duration,
        reply: Reply<()>,
    },
    Reconnect {
        reply: Reply<()>,
    },
}

#[derive(Clone, Debug, Default)]
pub struct ClientBuilder {
    overrides: ConfigOverrides,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.overrides.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.overrides.port = Some(port);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.overrides.timeout = Some(timeout);
        self
    }

    /// Read timeout used while a blocking command or busy-wait runs.
    pub fn extended_timeout(mut self, timeout: Duration) -> Self {
        self.overrides.extended_timeout = Some(timeout);
        self
    }

    /// Process to start when nothing answers on the port.
    pub fn launch(mut self, path: impl Into<PathBuf>) -> Self {
        self.overrides.launch_path = Some(path.into());
        self
    }

    /// Space-separated arguments for the launched process.
    pub fn launch_args(mut self, args: impl Into<String>) -> Self {
        self.overrides.launch_args = Some(args.into());
        self
    }

    pub fn launch_timeout(mut self, timeout: Duration) -> Self {
        self.overrides.launch_timeout = Some(timeout);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.overrides.poll_interval = Some(interval);
        self
    }

    pub fn resolve(&self) -> Result<ClientConfig, RobolinkError> {
        ClientConfig::resolve(&self.overrides)
    }

    pub async fn connect(self) -> Result<Client, RobolinkError> {
        let config = self.resolve()?;
        Client::with_config(config).await
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Connects using environment variables and defaults.
    pub async fn connect() -> Result<Self, RobolinkError> {
        ClientBuilder::new().connect().await
    }

    pub async fn with_config(config: ClientConfig) -> Result<Self, RobolinkError> {
        let session_config = config.clone();
        let session = tokio::task::spawn_blocking(move || session_config.connect_session())
            .await
            .map_err(|err| RobolinkError::RuntimeJoin(err.to_string()))??;

        let banner = session.banner().to_string();
        let job_tx = spawn_worker(session, config.clone())?;
        info!(address = %config.address(), banner = %banner, "client connected");

        Ok(Self {
            inner: Arc::new(ClientInner {
                job_tx,
                config,
                banner,
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn address(&self) -> String {
        self.inner.config.address()
    }

    pub fn timeout(&self) -> Duration {
        self.inner.config.timeout
    }

    /// The remote's handshake reply from the initial connection.
    pub fn banner(&self) -> &str {
        &self.inner.banner
    }

    /// Runs one request; catalog commands marked blocking get the extended timeout.
    pub async fn call(&self, request: Request) -> Result<Response, RobolinkError> {
        self.dispatch(|reply| Job::Call { request, reply }).await
    }

    /// Like [`Client::call`], with the extended timeout in effect for this request only.
    pub async fn call_blocking(&self, request: Request) -> Result<Response, RobolinkError> {
        self.dispatch(|reply| Job::CallBlocking { request, reply }).await
    }

    pub async fn wait_until_idle(
        &self,
        handle: Handle,
        timeout: Duration,
    ) -> Result<(), RobolinkError> {
        self.dispatch(|reply| Job::WaitIdle {
            handle,
            timeout,
            reply,
        })
        .await
    }

    /// Replaces a discarded or stale socket with a fresh, handshaken one.
    pub async fn reconnect(&self) -> Result<(), RobolinkError> {
        self.dispatch(|reply| Job::Reconnect { reply }).await
    }

    pub async fn item(&self, name: &str, kind: i32) -> Result<Handle, RobolinkError> {
        let request = Request::for_command(&ITEM).arg(name).arg(kind);
        self.call(request).await?.take_handle()
    }

    pub async fn name(&self, item: Handle) -> Result<String, RobolinkError> {
        self.call(Request::for_command(&NAME).arg(item))
            .await?
            .take_line()
    }

    pub async fn set_name(&self, item: Handle, name: &str) -> Result<(), RobolinkError> {
        self.call(Request::for_command(&SET_NAME).arg(item).arg(name)).await?;
        Ok(())
    }

    pub async fn pose(&self, item: Handle) -> Result<Pose, RobolinkError> {
        self.call(Request::for_command(&POSE).arg(item))
            .await?
            .take_pose()
    }

    pub async fn set_pose(&self, item: Handle, pose: Pose) -> Result<(), RobolinkError> {
        self.call(Request::for_command(&SET_POSE).arg(item).arg(pose)).await?;
        Ok(())
    }

    pub async fn joints(&self, robot: Handle) -> Result<JointVector, RobolinkError> {
        self.call(Request::for_command(&JOINTS).arg(robot))
            .await?
            .take_joints()
    }

    pub async fn set_joints(
        &self,
        robot: Handle,
        joints: impl Into<JointVector>,
    ) -> Result<(), RobolinkError> {
        let request = Request::for_command(&SET_JOINTS)
            .arg(joints.into())
            .arg(robot);
        self.call(request).await?;
        Ok(())
    }

    pub async fn is_busy(&self, item: Handle) -> Result<bool, RobolinkError> {
        let busy = self
            .call(Request::for_command(&IS_BUSY).arg(item))
            .await?
            .take_int()?;
        Ok(busy != 0)
    }

    /// Removes the item remotely and invalidates the caller's handle.
    pub async fn delete(&self, item: &mut Handle) -> Result<(), RobolinkError> {
        self.call(Request::for_command(&REMOVE).arg(*item)).await?;
        item.invalidate();
        Ok(())
    }

    pub async fn wait_move(&self, robot: Handle) -> Result<(), RobolinkError> {
        self.call(Request::for_command(&WAIT_MOVE).arg(robot)).await?;
        Ok(())
    }

    /// Generates the program for `program` into `folder`; returns the
    /// generator's status and its log text.
    pub async fn make_program(
        &self,
        program: Handle,
        folder: &str,
    ) -> Result<(i32, String), RobolinkError> {
        let request = Request::for_command(&MAKE_PROGRAM).arg(program).arg(folder);
        let mut response = self.call(request).await?;
        let status = response.take_int()?;
        let log = response.take_line()?;
        Ok((status, log))
    }

    /// Opens a second connection subscribed to station events.
    pub async fn subscribe_events(&self) -> Result<mpsc::Receiver<Event>, RobolinkError> {
        let host = self.inner.config.host.clone();
        let port = self.inner.config.port;
        let timeout = self.inner.config.timeout;

        let channel =
            tokio::task::spawn_blocking(move || EventChannel::connect(&host, port, timeout))
                .await
                .map_err(|err| RobolinkError::RuntimeJoin(err.to_string()))??;
        channel.spawn()
    }

    async fn dispatch<R>(
        &self,
        make_job: impl FnOnce(Reply<R>) -> Job,
    ) -> Result<R, RobolinkError> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.inner
            .job_tx
            .send(make_job(reply_tx))
            .await
            .map_err(|_| RobolinkError::TransportClosed)?;

        reply_rx.await.map_err(|_| RobolinkError::TransportClosed)?
    }
}

fn spawn_worker(session: Session, config: ClientConfig) -> Result<mpsc::Sender<Job>, RobolinkError> {
    let (job_tx, mut job_rx) = mpsc::channel::<Job>(JOB_QUEUE_CAPACITY);
    let address = config.address();

    let worker_name = format!("robolink-session-{}", std::process::id());
    thread::Builder::new()
        .name(worker_name)
        .spawn(move || {
            let mut session = session;
            while let Some(job) = job_rx.blocking_recv() {
                serve(&mut session, &config, job);
            }
            debug!(address = %session.address(), "all client handles dropped; closing session");
        })
        .map_err(|err| RobolinkError::Connection {
            address,
            reason: err.to_string(),
        })?;

    Ok(job_tx)
}

fn serve(session: &mut Session, config: &ClientConfig, job: Job) {
    match job {
        Job::Call { request, reply } if !request.is_blocking() => {
            let _ = reply.send(session.call(&request));
        }
        Job::Call { request, reply } | Job::CallBlocking { request, reply } => {
            let result =
                blocking::call_blocking(session, &request, config.timeout, config.extended_timeout);
            let _ = reply.send(result);
        }
        Job::WaitIdle {
            handle,
            timeout,
            reply,
        } => {
            let result = blocking::wait_until_idle(
                session,
                handle,
                timeout,
                config.poll_interval,
                config.timeout,
                config.extended_timeout,
            );
            let _ = reply.send(result);
        }
        Job::Reconnect { reply } => {
            let _ = reply.send(reconnect(session, config));
        }
    }
}

/// Reconnects to the same address, relaunching the remote if that fails and
/// a launch path is configured.
fn reconnect(session: &mut Session, config: &ClientConfig) -> Result<(), RobolinkError> {
    match session.reconnect() {
        Ok(()) => Ok(()),
        Err(err) if config.launch.is_some() => {
            warn!(error = %err, "reconnect failed; trying to relaunch remote");
            *session = config.connect_session()?;
            Ok(())
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    use super::Client;
    use crate::codec::{self, CodecError, WireKind, WireValue};
    use crate::commands;
    use crate::error::RobolinkError;
    use crate::event::{EventKind, EventPayload};
    use crate::model::{Handle, JointVector, Pose};

    /// Reply bytes for one request, given its command name and decoded arguments.
    type Responder = Box<dyn FnMut(&str, &[WireValue]) -> Option<Vec<u8>> + Send>;

    /// Serves handshakes and catalog commands on loopback until `responder`
    /// returns `None`, which closes the connection.
    fn station(connections: usize, mut responder: Responder) -> (u16, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let port = listener.local_addr().expect("local addr").port();
        let handle = thread::spawn(move || {
            let mut commands_seen = Vec::new();
            for _ in 0..connections {
                let (stream, _) = listener.accept().expect("accept");
                let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
                let mut writer = stream;

                let mut greeting = String::new();
                reader.read_line(&mut greeting).expect("start line");
                reader.read_line(&mut greeting).expect("version line");
                writer.write_all(b"READY 1.0\n").expect("ready reply");

                loop {
                    let Some(name) = read_command(&mut reader) else { break };
                    let spec = commands::lookup(&name).expect("catalog command");
                    let args = spec
                        .args
                        .iter()
                        .map(|kind| read_arg(&mut reader, *kind))
                        .collect::<Vec<_>>();
                    commands_seen.push(name.clone());
                    match responder(&name, &args) {
                        Some(reply) => writer.write_all(&reply).expect("reply"),
                        None => break,
                    }
                }
            }
            commands_seen
        });
        (port, handle)
    }

    fn read_command(reader: &mut BufReader<TcpStream>) -> Option<String> {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches('\n').to_string()),
        }
    }

    fn read_arg(reader: &mut BufReader<TcpStream>, kind: WireKind) -> WireValue {
        let mut buf = Vec::new();
        if kind == WireKind::Line {
            reader.read_until(b'\n', &mut buf).expect("line argument");
        }
        loop {
            match codec::decode(kind, &buf) {
                Ok((value, _)) => return value,
                Err(CodecError::Incomplete { needed, available }) => {
                    buf.resize(needed, 0);
                    reader
                        .read_exact(&mut buf[available..])
                        .expect("argument bytes");
                }
                Err(err) => panic!("undecodable argument: {err}"),
            }
        }
    }

    fn ok(values: &[WireValue]) -> Vec<u8> {
        let mut bytes = Vec::new();
        codec::encode_int(0, &mut bytes);
        for value in values {
            codec::encode(value, &mut bytes).expect("reply value encodes");
        }
        bytes
    }

    async fn client(port: u16) -> Client {
        Client::builder()
            .host("127.0.0.1")
            .port(port)
            .timeout(Duration::from_millis(500))
            .poll_interval(Duration::from_millis(5))
            .connect()
            .await
            .expect("client connects")
    }

    #[tokio::test]
    async fn typed_helpers_roundtrip_through_worker() {
        let robot = Handle::new(0xBEEF, 2);
        let pose = Pose::translation(100.0, 0.0, 250.0);
        let (port, station) = station(
            1,
            Box::new(move |name: &str, args: &[WireValue]| match name {
                "G_Item2" => {
                    assert_eq!(args[0], WireValue::from("UR10"));
                    Some(ok(&[WireValue::Handle(robot)]))
                }
                "G_Name" => Some(ok(&[WireValue::from("UR10")])),
                "G_Hlocal" => Some(ok(&[WireValue::Pose(pose)])),
                "G_Thetas" => Some(ok(&[WireValue::JointVector(JointVector::new(vec![
                    0.0, -90.0, 90.0, 0.0, 90.0, 0.0,
                ]))])),
                "S_Thetas" => {
                    assert_eq!(args[1], WireValue::Handle(robot));
                    Some(ok(&[]))
                }
                "IsBusy" => Some(ok(&[WireValue::Int32(0)])),
                "Remove" => Some(ok(&[])),
                _ => None,
            }),
        );

        let client = client(port).await;
        assert!(client.banner().starts_with("READY"));

        let mut handle = client.item("UR10", 2).await.expect("item lookup");
        assert_eq!(handle, robot);
        assert_eq!(client.name(handle).await.expect("name"), "UR10");
        assert_eq!(client.pose(handle).await.expect("pose"), pose);
        assert_eq!(client.joints(handle).await.expect("joints").len(), 6);
        client
            .set_joints(handle, vec![0.0, -80.0, 80.0, 0.0, 90.0, 0.0])
            .await
            .expect("set joints");
        assert!(!client.is_busy(handle).await.expect("busy query"));
        client.delete(&mut handle).await.expect("remove");
        assert_eq!(handle.id, 0);

        drop(client);
        let seen = station.join().expect("station thread");
        assert_eq!(
            seen,
            ["G_Item2", "G_Name", "G_Hlocal", "G_Thetas", "S_Thetas", "IsBusy", "Remove"]
        );
    }

    #[tokio::test]
    async fn clones_share_one_ordered_session() {
        let (port, station) = station(
            1,
            Box::new(|name: &str, args: &[WireValue]| match (name, args.first()) {
                ("G_Name", Some(WireValue::Handle(handle))) => {
                    Some(ok(&[WireValue::from(format!("item-{}", handle.id))]))
                }
                _ => None,
            }),
        );

        let client = client(port).await;
        let tasks = (1..=8u64)
            .map(|id| {
                let client = client.clone();
                tokio::spawn(async move { (id, client.name(Handle::new(id, 1)).await) })
            })
            .collect::<Vec<_>>();

        for task in tasks {
            let (id, name) = task.await.expect("task joins");
            assert_eq!(name.expect("name query"), format!("item-{id}"));
        }

        drop(client);
        assert_eq!(station.join().expect("station thread").len(), 8);
    }

    #[tokio::test]
    async fn application_errors_keep_session_alive() {
        let (port, station) = station(
            1,
            Box::new(|name: &str, _: &[WireValue]| match name {
                "G_Item2" => {
                    let mut bytes = Vec::new();
                    codec::encode_int(3, &mut bytes);
                    codec::encode_line("Item not found", &mut bytes);
                    Some(bytes)
                }
                "IsBusy" => Some(ok(&[WireValue::Int32(1)])),
                _ => None,
            }),
        );

        let client = client(port).await;
        let err = client.item("Missing", -1).await.expect_err("no such item");
        assert!(matches!(err, RobolinkError::Application { code: 3, .. }));
        assert!(client.is_busy(Handle::new(1, 2)).await.expect("still usable"));

        drop(client);
        station.join().expect("station thread");
    }

    #[tokio::test]
    async fn disconnect_poisons_until_reconnect() {
        let mut served = 0;
        let (port, station) = station(
            2,
            Box::new(move |_: &str, _: &[WireValue]| {
                served += 1;
                (served > 1).then(|| ok(&[WireValue::Int32(0)]))
            }),
        );

        let client = client(port).await;
        let robot = Handle::new(9, 2);

        let err = client.is_busy(robot).await.expect_err("station hung up");
        assert!(matches!(err, RobolinkError::Disconnected));
        let err = client.is_busy(robot).await.expect_err("socket discarded");
        assert!(matches!(err, RobolinkError::SessionPoisoned));

        client.reconnect().await.expect("fresh session");
        assert!(!client.is_busy(robot).await.expect("busy after reconnect"));

        drop(client);
        station.join().expect("station thread");
    }

    #[tokio::test]
    async fn wait_until_idle_polls_busy_flag() {
        let mut polls = 0;
        let (port, station) = station(
            1,
            Box::new(move |name: &str, _: &[WireValue]| {
                if name != "IsBusy" {
                    return None;
                }
                polls += 1;
                Some(ok(&[WireValue::Int32(i32::from(polls < 3))]))
            }),
        );

        let client = client(port).await;
        client
            .wait_until_idle(Handle::new(4, 2), Duration::from_secs(5))
            .await
            .expect("robot settles");

        drop(client);
        assert_eq!(station.join().expect("station thread").len(), 3);
    }

    #[tokio::test]
    async fn blocking_commands_outlast_default_timeout() {
        let (port, station) = station(
            1,
            Box::new(|name: &str, _: &[WireValue]| match name {
                "MakeProg" => {
                    thread::sleep(Duration::from_millis(800));
                    Some(ok(&[WireValue::Int32(0), WireValue::from("Program generated")]))
                }
                "IsBusy" => Some(ok(&[WireValue::Int32(0)])),
                _ => None,
            }),
        );

        let client = client(port).await;
        let (status, log) = client
            .make_program(Handle::new(21, 8), "/tmp/programs")
            .await
            .expect("generation outlasts the 500 ms default");
        assert_eq!(status, 0);
        assert_eq!(log, "Program generated");
        assert!(!client.is_busy(Handle::new(1, 2)).await.expect("default timeout back"));

        drop(client);
        station.join().expect("station thread");
    }

    #[tokio::test]
    async fn subscribe_events_uses_a_second_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let port = listener.local_addr().expect("local addr").port();
        let robot = Handle::new(0x51, 2);
        let station = thread::spawn(move || {
            let (command, _) = listener.accept().expect("command connection");
            let mut reader = BufReader::new(command.try_clone().expect("clone stream"));
            let mut greeting = String::new();
            reader.read_line(&mut greeting).expect("start line");
            reader.read_line(&mut greeting).expect("version line");
            (&command).write_all(b"READY 1.0\n").expect("ready reply");

            let (events, _) = listener.accept().expect("event connection");
            let mut reader = BufReader::new(events.try_clone().expect("clone stream"));
            let mut subscribe = String::new();
            reader.read_line(&mut subscribe).expect("subscribe line");
            let mut version = [0u8; 4];
            reader.read_exact(&mut version).expect("event protocol version");

            let mut bytes = Vec::new();
            codec::encode_line("RDK_EVT", &mut bytes);
            codec::encode_int(0, &mut bytes);
            codec::encode_int(0, &mut bytes);
            codec::encode_int(17, &mut bytes);
            codec::encode_handle(robot, &mut bytes);
            (&events).write_all(&bytes).expect("subscription reply and event");

            (subscribe, i32::from_be_bytes(version))
        });

        let client = client(port).await;
        let mut events = client.subscribe_events().await.expect("subscribed");

        let event = events.recv().await.expect("renamed event");
        assert_eq!(event.kind, EventKind::ItemRenamed);
        assert_eq!(event.item, robot);
        assert_eq!(event.payload, EventPayload::None);
        assert!(events.recv().await.is_none());

        let (subscribe, version) = station.join().expect("station thread");
        assert_eq!(subscribe, "RDK_EVT\n");
        assert_eq!(version, 0);
    }

    #[tokio::test]
    async fn connect_refused_is_a_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let port = listener.local_addr().expect("local addr").port();
        drop(listener);

        let err = Client::builder()
            .host("127.0.0.1")
            .port(port)
            .connect()
            .await
            .expect_err("nothing listening");
        assert!(err.is_retryable());
    }
}
