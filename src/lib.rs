//! FTP filesystem library
//!
//! Presents a remote FTP server as a filesystem: a control-channel engine
//! with passive data transfers, server dialect detection for STAT/XSTAT,
//! and a write-back file handle that stages remote files locally.
//! Two drivers sit on top of it: a JSON-lines script runner and a parallel
//! uploader.

pub mod cli;
pub mod config;
pub mod control;
pub mod dialect;
pub mod error;
pub mod ftp_fs;
pub mod listing;
pub mod logging;
pub mod native;
pub mod passive;
pub mod reply;
pub mod script;
pub mod session;
pub mod shutdown;
pub mod transfer;
pub mod transport;
pub mod upload;
pub mod vfs;

#[cfg(test)]
mod testing;

pub use config::{parse_upload_jobs, SessionConfig, UploadJob};
pub use control::LastError;
pub use dialect::Dialect;
pub use error::{FsError, Result};
pub use ftp_fs::{FtpFile, FtpFs, WriteBack};
pub use logging::{log, log_with_thread, set_log_file};
pub use native::NativeFs;
pub use script::{parse_script, run_script, ScriptSummary, Step};
pub use session::Session;
pub use shutdown::{is_shutdown_requested, request_shutdown};
pub use transport::{Connector, TcpConnector, Transport};
pub use upload::run_uploads;
pub use vfs::{DirEntry, DiskInfo, EntryKind, FileSystem, FsDir, FsFile, OpenMode, StatInfo};

/// Name of the program, used in usage and version output
pub const PROGRAM_NAME: &str = "ftpfs";

/// Current version of the program (from Cargo.toml)
pub const PROGRAM_VERSION: &str = env!("CARGO_PKG_VERSION");
