use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::codec::{self, CodecError, WireKind, WireValue, MAX_LINE_BYTES, MAX_VALUE_BYTES};
use crate::error::RobolinkError;

/// Ordered byte stream with a mutable read timeout and no protocol knowledge.
pub trait Transport: Send {
    fn send(&mut self, bytes: &[u8]) -> Result<(), RobolinkError>;

    /// Fills `buf` completely or fails.
    fn recv_exact(&mut self, buf: &mut [u8]) -> Result<(), RobolinkError>;

    /// Reads through the next `\n` (inclusive), failing after `limit` bytes.
    fn recv_line(&mut self, limit: usize) -> Result<Vec<u8>, RobolinkError>;

    /// Blocks until at least one byte is readable without consuming it.
    ///
    /// Returns `Ok(false)` when the read timeout elapses first.
    fn wait_readable(&mut self) -> Result<bool, RobolinkError>;

    /// Whether bytes have arrived that nobody has read yet.
    fn has_pending(&self) -> bool;

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), RobolinkError>;

    fn read_timeout(&self) -> Duration;

    fn shutdown(&mut self);
}

#[derive(Debug)]
pub struct TcpTransport {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    timeout: Duration,
    peer: SocketAddr,
}

impl TcpTransport {
    pub fn connect(address: &str, timeout: Duration) -> Result<Self, RobolinkError> {
        let connection_error = |reason: String| RobolinkError::Connection {
            address: address.to_string(),
            reason,
        };

        if timeout.is_zero() {
            return Err(RobolinkError::Config {
                reason: "timeout must be greater than zero".to_string(),
            });
        }

        let candidates = address
            .to_socket_addrs()
            .map_err(|err| connection_error(err.to_string()))?;

        let mut last_error = None;
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => return configured_stream(stream, candidate, timeout),
                Err(err) => last_error = Some(err),
            }
        }

        Err(connection_error(
            last_error.map_or_else(|| "address resolved to nothing".to_string(), |err| err.to_string()),
        ))
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

fn configured_stream(
    stream: TcpStream,
    peer: SocketAddr,
    timeout: Duration,
) -> Result<TcpTransport, RobolinkError> {
    let connection_error = |err: io::Error| RobolinkError::Connection {
        address: peer.to_string(),
        reason: err.to_string(),
    };

    stream.set_nodelay(true).map_err(connection_error)?;
    stream
        .set_read_timeout(Some(timeout))
        .map_err(connection_error)?;
    stream
        .set_write_timeout(Some(timeout))
        .map_err(connection_error)?;
    let writer = stream.try_clone().map_err(connection_error)?;

    Ok(TcpTransport {
        reader: BufReader::new(stream),
        writer,
        timeout,
        peer,
    })
}

impl Transport for TcpTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), RobolinkError> {
        self.writer
            .write_all(bytes)
            .and_then(|()| self.writer.flush())
            .map_err(|err| map_send_error(err, self.timeout))
    }

    fn recv_exact(&mut self, buf: &mut [u8]) -> Result<(), RobolinkError> {
        self.reader
            .read_exact(buf)
            .map_err(|err| map_receive_error(err, self.timeout))
    }

    fn recv_line(&mut self, limit: usize) -> Result<Vec<u8>, RobolinkError> {
        let mut line = Vec::new();
        let read = (&mut self.reader)
            .take(limit as u64)
            .read_until(b'\n', &mut line)
            .map_err(|err| map_receive_error(err, self.timeout))?;

        if read == 0 {
            return Err(RobolinkError::Disconnected);
        }
        if line.last() != Some(&b'\n') {
            if read >= limit {
                return Err(CodecError::LineTooLong { max: limit }.into());
            }
            return Err(RobolinkError::Disconnected);
        }

        Ok(line)
    }

    fn wait_readable(&mut self) -> Result<bool, RobolinkError> {
        match self.reader.fill_buf() {
            Ok([]) => Err(RobolinkError::Disconnected),
            Ok(_) => Ok(true),
            Err(err) if is_timeout(&err) => Ok(false),
            Err(err) => Err(map_receive_error(err, self.timeout)),
        }
    }

    fn has_pending(&self) -> bool {
        !self.reader.buffer().is_empty()
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), RobolinkError> {
        if timeout.is_zero() {
            return Err(RobolinkError::Config {
                reason: "timeout must be greater than zero".to_string(),
            });
        }

        self.reader
            .get_ref()
            .set_read_timeout(Some(timeout))
            .map_err(|err| RobolinkError::TransportReceive {
                reason: err.to_string(),
            })?;
        self.timeout = timeout;
        Ok(())
    }

    fn read_timeout(&self) -> Duration {
        self.timeout
    }

    fn shutdown(&mut self) {
        let _ = self.writer.shutdown(Shutdown::Both);
    }
}

fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

fn is_disconnect(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
    )
}

fn map_send_error(error: io::Error, timeout: Duration) -> RobolinkError {
    if is_timeout(&error) {
        return RobolinkError::Timeout { timeout };
    }
    if is_disconnect(&error) {
        return RobolinkError::Disconnected;
    }

    RobolinkError::TransportSend {
        reason: error.to_string(),
    }
}

fn map_receive_error(error: io::Error, timeout: Duration) -> RobolinkError {
    if is_timeout(&error) {
        return RobolinkError::Timeout { timeout };
    }
    if is_disconnect(&error) {
        return RobolinkError::Disconnected;
    }

    RobolinkError::TransportReceive {
        reason: error.to_string(),
    }
}

/// Pulls exactly one value of `kind` off the transport.
///
/// Fixed-size and counted values are read in as many exact chunks as the
/// decoder asks for, so nothing past the value is ever consumed. A header
/// that asks for more than [`MAX_VALUE_BYTES`] is a framing error.
pub(crate) fn read_value<T: Transport + ?Sized>(
    transport: &mut T,
    kind: WireKind,
) -> Result<WireValue, RobolinkError> {
    if kind == WireKind::Line {
        let line = transport.recv_line(MAX_LINE_BYTES)?;
        let (value, _) = codec::decode(kind, &line)?;
        return Ok(value);
    }

    let mut buf = Vec::new();
    loop {
        match codec::decode(kind, &buf) {
            Ok((value, _)) => return Ok(value),
            Err(CodecError::Incomplete { needed, available }) => {
                if needed > MAX_VALUE_BYTES {
                    return Err(RobolinkError::Framing {
                        reason: format!("{kind} needs {needed} bytes, limit is {MAX_VALUE_BYTES}"),
                    });
                }
                buf.resize(needed, 0);
                transport.recv_exact(&mut buf[available..])?;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

pub(crate) fn read_int<T: Transport + ?Sized>(transport: &mut T) -> Result<i32, RobolinkError> {
    let mut raw = [0u8; 4];
    transport.recv_exact(&mut raw)?;
    Ok(i32::from_be_bytes(raw))
}

pub(crate) fn read_line<T: Transport + ?Sized>(transport: &mut T) -> Result<String, RobolinkError> {
    let line = transport.recv_line(MAX_LINE_BYTES)?;
    let (text, _) = codec::decode_line(&line)?;
    Ok(text)
}


#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    use super::testing::{reply, ScriptedTransport, Step};
    use super::{read_value, TcpTransport, Transport};
    use crate::codec::{WireKind, WireValue};
    use crate::error::RobolinkError;
    use crate::model::JointVector;

    #[test]
    fn read_value_consumes_exactly_one_value() {
        let joints = JointVector::new(vec![10.0, 20.0, 30.0]);
        let mut transport = ScriptedTransport::new(vec![reply(
            0,
            None,
            &[WireValue::JointVector(joints.clone()), WireValue::Int32(7)],
        )]);

        assert_eq!(
            read_value(&mut transport, WireKind::Int32).expect("status"),
            WireValue::Int32(0)
        );
        assert_eq!(
            read_value(&mut transport, WireKind::JointVector).expect("joints"),
            WireValue::JointVector(joints)
        );
        assert!(transport.has_pending());
        assert_eq!(
            read_value(&mut transport, WireKind::Int32).expect("trailing int"),
            WireValue::Int32(7)
        );
        assert!(!transport.has_pending());
    }

    #[test]
    fn oversized_count_is_a_framing_error() {
        let mut transport = ScriptedTransport::new(vec![Step::Reply(99i32.to_be_bytes().to_vec())]);
        let err = read_value(&mut transport, WireKind::JointVector).expect_err("count rejected");
        assert!(matches!(err, RobolinkError::Framing { .. }));
    }

    #[test]
    fn huge_matrix_header_is_a_framing_error() {
        let mut header = Vec::new();
        header.extend_from_slice(&(1i32 << 20).to_be_bytes());
        header.extend_from_slice(&(1i32 << 20).to_be_bytes());
        let mut transport = ScriptedTransport::new(vec![Step::Reply(header)]);

        let err = read_value(&mut transport, WireKind::Matrix2D).expect_err("shape rejected");
        assert!(matches!(err, RobolinkError::Framing { .. }));
        assert!(err.is_session_fatal());
    }

    #[test]
    fn tcp_read_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let address = listener.local_addr().expect("local addr").to_string();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut buf = [0u8; 1];
            let _ = stream.read(&mut buf);
        });

        let mut transport =
            TcpTransport::connect(&address, Duration::from_millis(100)).expect("connect");
        let err = super::read_int(&mut transport).expect_err("nothing arrives");
        assert!(matches!(err, RobolinkError::Timeout { .. }));

        transport.send(b"x").expect("send wakes server");
        server.join().expect("server thread");
    }

    #[test]
    fn tcp_eof_is_a_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let address = listener.local_addr().expect("local addr").to_string();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            stream.write_all(b"partial").expect("write");
        });

        let mut transport =
            TcpTransport::connect(&address, Duration::from_millis(500)).expect("connect");
        server.join().expect("server thread");

        let err = super::read_line(&mut transport).expect_err("line never terminates");
        assert!(matches!(err, RobolinkError::Disconnected));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = TcpTransport::connect("127.0.0.1:1", Duration::ZERO).expect_err("zero timeout");
        assert!(matches!(err, RobolinkError::Config { .. }));
    }
}
