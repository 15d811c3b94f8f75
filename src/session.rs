use std::process::Child;
use std::time::Duration;

use crate::codec;
use crate::error::RobolinkError;
use crate::launcher::{self, LaunchConfig};
use crate::transport::{self, TcpTransport, Transport};

pub const HANDSHAKE_START: &str = "CMD_START";
/// Client protocol version, major then minor.
pub const HANDSHAKE_VERSION: &str = "1 0";
pub const HANDSHAKE_READY: &str = "READY";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1_000);

/// One live, handshaken connection plus its current read timeout.
///
/// The session is the only owner of its transport. After a session-fatal error
/// the transport is dropped and every further request fails with
/// [`RobolinkError::SessionPoisoned`] until the session is re-established.
#[derive(Debug)]
pub struct Session<T: Transport = TcpTransport> {
    transport: Option<T>,
    address: String,
    banner: String,
    timeout: Duration,
    in_flight: bool,
    launched: Option<Child>,
}

impl<T: Transport> Session<T> {
    /// Runs the request/response handshake over an already open transport.
    ///
    /// The transport is shut down and dropped if the remote does not answer
    /// with a line starting with `READY`.
    pub fn establish(
        mut transport: T,
        address: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RobolinkError> {
        let address = address.into();
        if let Err(err) = transport.set_read_timeout(timeout) {
            transport.shutdown();
            return Err(err);
        }

        match handshake(&mut transport, &address) {
            Ok(banner) => {
                debug!(address = %address, banner = %banner, "session established");
                Ok(Self {
                    transport: Some(transport),
                    address,
                    banner,
                    timeout,
                    in_flight: false,
                    launched: None,
                })
            }
            Err(err) => {
                transport.shutdown();
                Err(err)
            }
        }
    }

    pub fn connected(&self) -> bool {
        self.transport.is_some()
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// The remote's `READY ...` reply line.
    pub fn banner(&self) -> &str {
        &self.banner
    }

    pub fn current_timeout(&self) -> Duration {
        self.timeout
    }

    /// Changes the read timeout for subsequent reads.
    ///
    /// The recorded timeout is updated even when the socket is already gone, so
    /// a discarded session still reports what it would use after reconnecting.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<(), RobolinkError> {
        self.timeout = timeout;
        match self.transport.as_mut() {
            Some(transport) => transport.set_read_timeout(timeout),
            None => Ok(()),
        }
    }

    pub fn launched_pid(&self) -> Option<u32> {
        self.launched.as_ref().map(Child::id)
    }

    /// Drops the socket; the byte stream can no longer be trusted.
    pub fn discard(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            warn!(address = %self.address, "discarding session");
            transport.shutdown();
        }
        self.in_flight = false;
    }

    pub(crate) fn transport_mut(&mut self) -> Result<&mut T, RobolinkError> {
        self.transport.as_mut().ok_or(RobolinkError::SessionPoisoned)
    }

    /// Marks the start of a request, refusing if a previous one was not drained.
    pub(crate) fn begin_request(&mut self) -> Result<(), RobolinkError> {
        let transport = self.transport.as_ref().ok_or(RobolinkError::SessionPoisoned)?;
        if self.in_flight || transport.has_pending() {
            return Err(RobolinkError::RequestInFlight);
        }
        self.in_flight = true;
        Ok(())
    }

    pub(crate) fn finish_request(&mut self) {
        self.in_flight = false;
    }

    #[cfg(test)]
    pub(crate) fn transport_ref(&self) -> Option<&T> {
        self.transport.as_ref()
    }
}

impl Session<TcpTransport> {
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, RobolinkError> {
        let address = format!("{host}:{port}");
        let transport = TcpTransport::connect(&address, timeout)?;
        Self::establish(transport, address, timeout)
    }

    /// Connects, or launches the remote and retries exactly once.
    ///
    /// Launch failures surface as [`RobolinkError::Launch`] or
    /// [`RobolinkError::LaunchTimeout`]; a failed retry against a launched
    /// process surfaces as [`RobolinkError::SessionUnavailable`].
    pub fn connect_or_launch(
        host: &str,
        port: u16,
        timeout: Duration,
        launch: &LaunchConfig,
    ) -> Result<Self, RobolinkError> {
        let first_error = match Self::connect(host, port, timeout) {
            Ok(session) => return Ok(session),
            Err(err) => err,
        };
        info!(host, port, error = %first_error, "no session; launching remote process");

        let child = launcher::launch(launch)?;
        match Self::connect(host, port, timeout) {
            Ok(mut session) => {
                session.launched = Some(child);
                Ok(session)
            }
            Err(err) => Err(RobolinkError::SessionUnavailable {
                address: format!("{host}:{port}"),
                path: launch.path.display().to_string(),
                reason: err.to_string(),
            }),
        }
    }

    /// Replaces the socket with a freshly handshaken one, keeping the timeout.
    pub fn reconnect(&mut self) -> Result<(), RobolinkError> {
        self.discard();
        let transport = TcpTransport::connect(&self.address, self.timeout)?;
        let fresh = Self::establish(transport, self.address.clone(), self.timeout)?;
        info!(address = %self.address, "session re-established");
        self.transport = fresh.transport;
        self.banner = fresh.banner;
        Ok(())
    }
}

fn handshake<T: Transport>(transport: &mut T, address: &str) -> Result<String, RobolinkError> {
    let mut hello = Vec::new();
    codec::encode_line(HANDSHAKE_START, &mut hello);
    codec::encode_line(HANDSHAKE_VERSION, &mut hello);
    transport.send(&hello)?;

    let reply = transport::read_line(transport).map_err(|err| RobolinkError::Handshake {
        address: address.to_string(),
        reason: err.to_string(),
    })?;

    if !reply.starts_with(HANDSHAKE_READY) {
        return Err(RobolinkError::Handshake {
            address: address.to_string(),
            reason: format!("unexpected reply `{reply}`"),
        });
    }

    Ok(reply)
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    use super::{Session, DEFAULT_TIMEOUT};
    use crate::error::RobolinkError;
    use crate::launcher::LaunchConfig;
    use crate::transport::testing::{ScriptedTransport, Step};

    /// Accepts one connection per entry and answers its handshake with it.
    fn mock_server(replies: Vec<Option<&'static str>>) -> (u16, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let port = listener.local_addr().expect("local addr").port();
        let handle = thread::spawn(move || {
            let mut greetings = Vec::new();
            for reply in replies {
                let (stream, _) = listener.accept().expect("accept");
                greetings.push(read_greeting(&stream));
                if let Some(reply) = reply {
                    (&stream).write_all(reply.as_bytes()).expect("reply");
                    thread::sleep(Duration::from_millis(50));
                } else {
                    thread::sleep(Duration::from_millis(400));
                }
            }
            greetings
        });
        (port, handle)
    }

    fn read_greeting(stream: &TcpStream) -> String {
        let mut reader = BufReader::new(stream);
        let mut greeting = String::new();
        for _ in 0..2 {
            reader.read_line(&mut greeting).expect("greeting line");
        }
        greeting
    }

    #[test]
    fn ready_reply_establishes_session() {
        let (port, server) = mock_server(vec![Some("READY 1.0\n")]);
        let session = Session::connect("127.0.0.1", port, DEFAULT_TIMEOUT).expect("handshake");

        assert!(session.connected());
        assert_eq!(session.banner(), "READY 1.0");
        assert_eq!(session.current_timeout(), DEFAULT_TIMEOUT);

        let greetings = server.join().expect("server thread");
        assert_eq!(greetings, vec!["CMD_START\n1 0\n".to_string()]);
    }

    #[test]
    fn wrong_reply_fails_handshake() {
        let (port, server) = mock_server(vec![Some("NOPE\n")]);
        let err = Session::connect("127.0.0.1", port, DEFAULT_TIMEOUT).expect_err("NOPE rejected");
        assert!(matches!(err, RobolinkError::Handshake { .. }));
        server.join().expect("server thread");
    }

    #[test]
    fn failed_handshake_closes_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let port = listener.local_addr().expect("local addr").port();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            read_greeting(&stream);
            (&stream).write_all(b"NOPE\n").expect("reply");
            stream
                .set_read_timeout(Some(Duration::from_secs(2)))
                .expect("server read timeout");
            let mut buf = [0u8; 16];
            (&stream).read(&mut buf).expect("client closes instead of stalling")
        });

        let err = Session::connect("127.0.0.1", port, DEFAULT_TIMEOUT).expect_err("NOPE rejected");
        assert!(matches!(err, RobolinkError::Handshake { .. }));
        assert_eq!(server.join().expect("server thread"), 0);
    }

    #[test]
    fn silent_server_fails_handshake() {
        let (port, server) = mock_server(vec![None]);
        let err = Session::connect("127.0.0.1", port, Duration::from_millis(150))
            .expect_err("silence rejected");
        assert!(matches!(err, RobolinkError::Handshake { .. }));
        server.join().expect("server thread");
    }

    #[test]
    fn non_ready_reply_or_timeout_fails_handshake() {
        let mut transport = ScriptedTransport::new(vec![Step::Reply(b"NOPE\n".to_vec())]);
        let err = super::handshake(&mut transport, "scripted").expect_err("NOPE rejected");
        assert!(matches!(err, RobolinkError::Handshake { .. }));
        assert_eq!(transport.written, b"CMD_START\n1 0\n");

        let err = Session::establish(
            ScriptedTransport::new(vec![Step::Stall]),
            "scripted",
            DEFAULT_TIMEOUT,
        )
        .expect_err("timeout rejected");
        assert!(matches!(err, RobolinkError::Handshake { .. }));
    }

    #[test]
    fn timeout_survives_discard() {
        let mut session = Session::establish(
            ScriptedTransport::new(vec![ScriptedTransport::ready()]),
            "scripted",
            DEFAULT_TIMEOUT,
        )
        .expect("handshake");

        session.discard();
        assert!(!session.connected());
        session
            .set_timeout(Duration::from_secs(5))
            .expect("timeout is recorded without a socket");
        assert_eq!(session.current_timeout(), Duration::from_secs(5));
        assert!(matches!(
            session.transport_mut(),
            Err(RobolinkError::SessionPoisoned)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn launch_then_retry_succeeds() {
        let (port, server) = mock_server(vec![Some("NOPE\n"), Some("READY 1.0\n")]);
        let launch = LaunchConfig::new("echo").args("Running");

        let session = Session::connect_or_launch("127.0.0.1", port, DEFAULT_TIMEOUT, &launch)
            .expect("second attempt succeeds");
        assert!(session.connected());
        assert!(session.launched_pid().is_some());
        assert_eq!(server.join().expect("server thread").len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn failed_retry_is_session_unavailable() {
        let (port, server) = mock_server(vec![Some("NOPE\n"), Some("NOPE\n")]);
        let launch = LaunchConfig::new("echo").args("Running");

        let err = Session::connect_or_launch("127.0.0.1", port, DEFAULT_TIMEOUT, &launch)
            .expect_err("retry fails too");
        assert!(matches!(err, RobolinkError::SessionUnavailable { .. }));
        server.join().expect("server thread");
    }

    #[test]
    fn spawn_failure_is_distinct_from_handshake_failure() {
        let (port, server) = mock_server(vec![Some("NOPE\n")]);
        let launch = LaunchConfig::new("/nonexistent/robot-station");

        let err = Session::connect_or_launch("127.0.0.1", port, DEFAULT_TIMEOUT, &launch)
            .expect_err("nothing to launch");
        assert!(matches!(err, RobolinkError::Launch { .. }));
        server.join().expect("server thread");
    }
}
