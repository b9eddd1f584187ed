//! Error type shared by the FTP engine and the filesystem backends.

use std::io;
use std::path::PathBuf;

/// Errors returned by filesystem operations
///
/// The variants follow the failure classes of an FTP-backed filesystem:
/// transport failures, negative server replies, replies that could not be
/// understood, and local staging problems.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// Connect failure, short read/write, timeout
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    /// The server answered with a reply code outside `[100, 400)`
    #[error("server replied {code}: {message}")]
    Protocol { code: u32, message: String },

    /// The server replied successfully but the payload could not be parsed
    #[error("malformed server response: {0}")]
    Malformed(String),

    /// Local staging file could not be created, opened or locked
    #[error("staging file {}: {source}", path.display())]
    Resource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("operation not implemented: {0}")]
    NotImplemented(&'static str),

    /// The control connection failed earlier and the session must be recreated
    #[error("session is closed")]
    Closed,

    #[error("configuration error: {0}")]
    Config(String),
}

impl FsError {
    /// Reply code for protocol failures, `None` for every other class
    pub fn reply_code(&self) -> Option<u32> {
        match self {
            FsError::Protocol { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub(crate) fn malformed<S: Into<String>>(what: S) -> Self {
        FsError::Malformed(what.into())
    }

    pub(crate) fn resource<P: Into<PathBuf>>(path: P, source: io::Error) -> Self {
        FsError::Resource {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = FsError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_code_only_for_protocol_errors() {
        let err = FsError::Protocol {
            code: 550,
            message: "550 No such file".to_string(),
        };
        assert_eq!(err.reply_code(), Some(550));
        assert_eq!(FsError::Closed.reply_code(), None);
        assert_eq!(FsError::malformed("bad tuple").reply_code(), None);
    }

    #[test]
    fn test_io_error_conversion() {
        let err: FsError = io::Error::new(io::ErrorKind::TimedOut, "stalled").into();
        assert!(matches!(err, FsError::Io(ref e) if e.kind() == io::ErrorKind::TimedOut));
        assert!(err.to_string().contains("stalled"));
    }

    #[test]
    fn test_resource_error_mentions_path() {
        let err = FsError::resource(
            "/tmp/host_0_a.txt",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/tmp/host_0_a.txt"));
    }
}
