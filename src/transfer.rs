//! RETR/STOR streaming between the data channel and local storage

use crate::error::{FsError, Result};
use crate::logging::log_debug;
use crate::session::Session;
use crate::transport::{Connector, Transport};
use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::path::Path;

/// Bytes moved per read/write on the data channel
pub const CHUNK_SIZE: usize = 8192;

impl<C: Connector> Session<C> {
    /// Downloads remote `name` into `sink`, returning the byte count
    ///
    /// The data channel is released whatever happens. A failure after the
    /// server started sending still consumes its completion reply so the
    /// control channel stays in step.
    pub fn download<W: Write>(&mut self, name: &str, sink: &mut W) -> Result<u64> {
        self.enter_passive()?;

        if let Err(e) = self.control.execute(&format!("RETR {}", name)) {
            self.close_data();
            return Err(e);
        }

        let copied = self.receive_into(sink);
        self.close_data();
        self.finish_transfer(copied, "RETR", name)
    }

    /// Uploads everything `source` yields to remote `name`
    ///
    /// Every chunk must reach the data channel within the session's data
    /// timeout. A chunk that misses it fails the upload and closes both
    /// channels; the session is unusable afterwards.
    pub fn upload<R: Read>(&mut self, source: &mut R, name: &str) -> Result<u64> {
        self.enter_passive()?;

        if let Err(e) = self.control.execute(&format!("STOR {}", name)) {
            self.close_data();
            return Err(e);
        }

        let copied = self.send_from(source);
        // Closing the data channel is what tells the server the file ended
        self.close_data();
        self.finish_transfer(copied, "STOR", name)
    }

    /// Uploads local file `local`; a missing source fails before any command is sent
    pub fn upload_file(&mut self, local: &Path, name: &str) -> Result<u64> {
        let mut source = File::open(local)?;
        self.upload(&mut source, name)
    }

    fn receive_into<W: Write>(&mut self, sink: &mut W) -> Result<u64, CopyError> {
        let data = self.data_stream().map_err(CopyError::Local)?;
        let mut buf = [0u8; CHUNK_SIZE];
        let mut total = 0u64;
        loop {
            let n = match data.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(CopyError::Channel(e)),
            };
            sink.write_all(&buf[..n])
                .map_err(|e| CopyError::Local(FsError::Io(e)))?;
            total += n as u64;
        }
        sink.flush().map_err(|e| CopyError::Local(FsError::Io(e)))?;
        Ok(total)
    }

    fn send_from<R: Read>(&mut self, source: &mut R) -> Result<u64, CopyError> {
        let timeout = self.data_timeout;
        let data = self.data_stream().map_err(CopyError::Local)?;
        let mut buf = [0u8; CHUNK_SIZE];
        let mut total = 0u64;
        loop {
            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(CopyError::Local(FsError::Io(e))),
            };
            data.write_all_timeout(&buf[..n], timeout)
                .map_err(CopyError::Channel)?;
            total += n as u64;
        }
        Ok(total)
    }

    fn finish_transfer(
        &mut self,
        copied: Result<u64, CopyError>,
        verb: &str,
        name: &str,
    ) -> Result<u64> {
        match copied {
            Ok(total) => {
                self.control.expect_completion()?;
                let _ = log_debug(&format!("{} {}: {} bytes", verb, name, total));
                Ok(total)
            }
            // A stalled peer will not send a completion reply either
            Err(CopyError::Channel(e)) if is_timeout(&e) => {
                let _ = log_debug(&format!("{} {}: data channel stalled, closing session", verb, name));
                self.control.close();
                Err(FsError::Io(e))
            }
            Err(CopyError::Channel(e)) => {
                let _ = self.control.expect_completion();
                Err(FsError::Io(e))
            }
            Err(CopyError::Local(e)) => {
                let _ = self.control.expect_completion();
                Err(e)
            }
        }
    }
}

/// Where a copy between the data channel and local storage broke off
enum CopyError {
    /// Local sink or source, or no data channel at all
    Local(FsError),
    Channel(io::Error),
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeFtpServer, FakeServerOptions};
    use std::io::{self, Cursor};
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    /// Sink refusing every write
    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_download_into_memory() {
        let server = FakeFtpServer::start(FakeServerOptions::vsftpd());
        let data = payload(3 * CHUNK_SIZE + 17);
        server.put_file("/big.bin", &data);
        let dir = tempdir().unwrap();
        let mut session = Session::connect(&server.session_config(dir.path())).unwrap();

        let mut sink = Vec::new();
        let total = session.download("/big.bin", &mut sink).unwrap();
        assert_eq!(total, data.len() as u64);
        assert_eq!(sink, data);
        assert!(session.data.is_none());
    }

    #[test]
    fn test_upload_from_reader() {
        let server = FakeFtpServer::start(FakeServerOptions::vsftpd());
        let data = payload(CHUNK_SIZE + 1);
        let dir = tempdir().unwrap();
        let mut session = Session::connect(&server.session_config(dir.path())).unwrap();

        let total = session.upload(&mut Cursor::new(data.clone()), "/up.bin").unwrap();
        assert_eq!(total, data.len() as u64);
        assert_eq!(server.file("/up.bin").unwrap(), data);
        assert!(session.data.is_none());
    }

    #[test]
    fn test_download_missing_file_releases_data_channel() {
        let server = FakeFtpServer::start(FakeServerOptions::vsftpd());
        let dir = tempdir().unwrap();
        let mut session = Session::connect(&server.session_config(dir.path())).unwrap();

        let err = session.download("/missing", &mut Vec::new()).unwrap_err();
        assert_eq!(err.reply_code(), Some(550));
        assert!(session.data.is_none());

        // Control channel still usable
        assert_eq!(session.pwd().unwrap(), "/");
    }

    #[test]
    fn test_failing_sink_keeps_control_channel_in_step() {
        let server = FakeFtpServer::start(FakeServerOptions::vsftpd());
        server.put_file("/a.txt", b"some bytes");
        let dir = tempdir().unwrap();
        let mut session = Session::connect(&server.session_config(dir.path())).unwrap();

        assert!(matches!(
            session.download("/a.txt", &mut BrokenSink),
            Err(FsError::Io(_))
        ));
        assert!(session.data.is_none());
        assert_eq!(session.size("/a.txt").unwrap(), 10);
    }

    #[test]
    fn test_upload_file_missing_source_sends_nothing() {
        let server = FakeFtpServer::start(FakeServerOptions::vsftpd());
        let dir = tempdir().unwrap();
        let mut session = Session::connect(&server.session_config(dir.path())).unwrap();
        server.clear_commands();

        let missing = dir.path().join("nope.bin");
        assert!(matches!(
            session.upload_file(&missing, "/nope.bin"),
            Err(FsError::Io(_))
        ));
        assert!(server.commands().is_empty());
    }

    #[test]
    fn test_rejected_stor_is_protocol_error() {
        let server = FakeFtpServer::start(FakeServerOptions::vsftpd());
        server.set_reject_stor(true);
        let dir = tempdir().unwrap();
        let mut session = Session::connect(&server.session_config(dir.path())).unwrap();

        let err = session
            .upload(&mut Cursor::new(b"x".to_vec()), "/x")
            .unwrap_err();
        assert_eq!(err.reply_code(), Some(553));
        assert!(session.data.is_none());
        assert!(server.file("/x").is_none());
    }

    #[test]
    fn test_stalled_upload_times_out_and_closes_both_channels() {
        let server = FakeFtpServer::start(FakeServerOptions::vsftpd());
        server.set_stall_stor(true);
        let dir = tempdir().unwrap();
        let mut config = server.session_config(dir.path());
        config.data_timeout_secs = 1;
        config.connect_timeout_secs = 10;
        let mut session = Session::connect(&config).unwrap();

        // Far more than the loopback socket buffers can hold
        let mut source = io::repeat(0xA5).take(256 << 20);
        let started = Instant::now();
        let err = session.upload(&mut source, "/stalled.bin").unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(&err, FsError::Io(e) if e.kind() == ErrorKind::TimedOut));
        // Bounded by the data timeout, not the 10 s control read timeout
        assert!(elapsed < Duration::from_secs(5), "took {:?}", elapsed);
        assert!(session.data.is_none());
        assert!(session.is_broken());
        assert!(matches!(session.pwd(), Err(FsError::Closed)));
        assert!(server.file("/stalled.bin").is_none());
    }
}
