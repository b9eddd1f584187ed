//! Passive-mode data channel negotiation

use crate::error::{FsError, Result};
use crate::logging::log_debug;
use crate::reply;
use crate::session::Session;
use crate::transport::Connector;

impl<C: Connector> Session<C> {
    /// Issues PASV and connects the data channel to the advertised endpoint
    ///
    /// Any data channel left open by a previous operation is closed first,
    /// so at most one is alive at a time.
    pub(crate) fn enter_passive(&mut self) -> Result<()> {
        self.close_data();

        let reply = self.control.execute("PASV")?;
        let endpoint = reply::parse_pasv(reply.data())?;
        self.data_port = endpoint.port();

        let _ = log_debug(&format!("data channel {}", endpoint));
        let stream = self
            .connector
            .connect(&endpoint.ip().to_string(), endpoint.port())?;
        self.data = Some(stream);
        Ok(())
    }

    /// Data channel opened by the last `enter_passive`
    pub(crate) fn data_stream(&mut self) -> Result<&mut C::Stream> {
        self.data
            .as_mut()
            .ok_or_else(|| FsError::Io(std::io::Error::from(std::io::ErrorKind::NotConnected)))
    }
}
