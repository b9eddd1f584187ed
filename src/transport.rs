//! Byte-stream transport used for the control and data channels
//!
//! The FTP engine never touches sockets directly. It asks a `Connector` for a
//! `Transport` and only reads, writes and closes through it, which keeps the
//! protocol code independent of how the bytes actually travel.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

/// A blocking, bidirectional byte stream
pub trait Transport: Read + Write + Send {
    /// Writes the whole buffer, failing with `TimedOut` once `timeout` elapses
    fn write_all_timeout(&mut self, buf: &[u8], timeout: Duration) -> io::Result<()>;

    /// Closes both directions; further I/O fails
    fn close(&mut self);
}

/// Opens transports by host and port
pub trait Connector: Send {
    type Stream: Transport;

    fn connect(&self, host: &str, port: u16) -> io::Result<Self::Stream>;
}

/// TCP connector with a connect timeout and a read timeout for every stream
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    pub connect_timeout: Duration,
    pub read_timeout: Option<Duration>,
}

impl Default for TcpConnector {
    fn default() -> Self {
        TcpConnector {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl Connector for TcpConnector {
    type Stream = TcpTransport;

    fn connect(&self, host: &str, port: u16) -> io::Result<TcpTransport> {
        // Resolve host to all possible addresses
        let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();

        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("No addresses found for {}:{}", host, port),
            ));
        }

        // Try each address until one succeeds
        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(self.read_timeout)?;
                    stream.set_nodelay(true)?;
                    return Ok(TcpTransport {
                        stream,
                        closed: false,
                    });
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "No addresses available")
        }))
    }
}

/// `Transport` over a plain TCP socket
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    closed: bool,
}

impl TcpTransport {
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }
}

impl Read for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Transport for TcpTransport {
    fn write_all_timeout(&mut self, buf: &[u8], timeout: Duration) -> io::Result<()> {
        let deadline = Instant::now() + timeout;
        let mut written = 0;

        while written < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("wrote {} of {} bytes before timeout", written, buf.len()),
                ));
            }
            self.stream.set_write_timeout(Some(remaining))?;

            match self.stream.write(&buf[written..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                // Socket write timeouts surface as WouldBlock on unix
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, e));
                }
                Err(e) => return Err(e),
            }
        }

        self.stream.set_write_timeout(None)
    }

    fn close(&mut self) {
        if !self.closed {
            let _ = self.stream.shutdown(Shutdown::Both);
            self.closed = true;
        }
    }
}
