//! The FTP backend of `FileSystem`
//!
//! `FtpFs` shares one `Session` between itself and every handle it opens;
//! the mutex around the session lets only one operation talk to the server
//! at a time. Files are mirrored through a local staging copy: opening
//! downloads the remote file, reads and writes hit the copy, and sync/close
//! upload it again when it changed.

use crate::config::SessionConfig;
use crate::control::LastError;
use crate::error::{FsError, Result};
use crate::logging::{log, log_debug};
use crate::native::{stat_from_metadata, NativeFs};
use crate::session::Session;
use crate::transport::{Connector, TcpConnector};
use crate::vfs::{DirSnapshot, DiskInfo, FileSystem, FsFile, OpenMode, StatInfo};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

type SharedSession<C> = Arc<Mutex<Session<C>>>;

fn lock<C: Connector>(session: &SharedSession<C>) -> Result<MutexGuard<'_, Session<C>>> {
    // A panic while holding the gate leaves the wire state unknown
    session.lock().map_err(|_| FsError::Closed)
}

/// Remote filesystem reached over one FTP session
pub struct FtpFs<C: Connector = TcpConnector> {
    session: SharedSession<C>,
    native: NativeFs,
}

impl FtpFs<TcpConnector> {
    /// Connects, logs in and wraps the session
    pub fn connect(config: &SessionConfig) -> Result<Self> {
        Ok(FtpFs::with_session(Session::connect(config)?))
    }
}

impl<C: Connector> FtpFs<C> {
    pub fn with_session(session: Session<C>) -> Self {
        FtpFs {
            session: Arc::new(Mutex::new(session)),
            native: NativeFs,
        }
    }

    /// Last negative reply of the session, cleared by the next success
    pub fn last_error(&self) -> LastError {
        match self.session.lock() {
            Ok(session) => session.last_error().clone(),
            Err(poisoned) => poisoned.into_inner().last_error().clone(),
        }
    }

    /// Sends QUIT and closes the session
    ///
    /// Handles that are still open keep the session alive; it is closed
    /// when the last of them goes away.
    pub fn destroy(self) -> Result<()> {
        match Arc::try_unwrap(self.session) {
            Ok(mutex) => mutex.into_inner().map_err(|_| FsError::Closed)?.quit(),
            Err(_) => Ok(()),
        }
    }

    fn with<T>(&self, op: impl FnOnce(&mut Session<C>) -> Result<T>) -> Result<T> {
        let mut session = lock(&self.session)?;
        op(&mut session)
    }
}

/// Local staging file for remote `name`
///
/// Path separators in the name are flattened so every remote file maps to
/// one file directly inside `dir`.
pub fn staging_path(dir: &Path, host: &str, data_port: u16, name: &str) -> PathBuf {
    let file_name = format!("{}_{}_{}", host, data_port, name).replace(['/', '\\'], "_");
    dir.join(file_name)
}

/// Write-back state of an `FtpFile`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteBack {
    /// Staging copy is being filled from the server
    Hydrating,
    /// Staging copy matches the remote file
    Clean,
    /// Staging copy has changes the server has not seen
    Dirty,
}

/// Remote file mirrored through a locked local staging file
pub struct FtpFile<C: Connector = TcpConnector> {
    session: SharedSession<C>,
    remote: String,
    staging: PathBuf,
    /// `None` once the handle is closed
    file: Option<File>,
    mode: OpenMode,
    state: WriteBack,
}

impl<C: Connector> FtpFile<C> {
    fn open(session: &SharedSession<C>, name: &str, mode: OpenMode) -> Result<Self> {
        let mut guard = lock(session)?;
        let staging = staging_path(guard.staging_dir(), guard.host(), guard.data_port(), name);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&staging)
            .map_err(|e| FsError::resource(&staging, e))?;
        if let Err(e) = file.try_lock_exclusive() {
            return Err(FsError::resource(&staging, e));
        }

        let mut handle = FtpFile {
            session: Arc::clone(session),
            remote: name.to_string(),
            staging,
            file: None,
            mode,
            state: WriteBack::Hydrating,
        };

        let hydrated = file
            .set_len(0)
            .map_err(|e| FsError::resource(&handle.staging, e))
            .and_then(|_| guard.download(name, &mut file));
        drop(guard);

        if let Err(e) = hydrated {
            if !mode.creates() {
                drop(file);
                handle.discard_staging();
                return Err(e);
            }
            let _ = log_debug(&format!("{} not hydrated ({}), starting empty", name, e));
        }

        // From here on a failure drops the handle, which discards the staging file
        handle.file = Some(file);
        if mode.truncate {
            handle.file()?.set_len(0)?;
            handle.state = WriteBack::Dirty;
        } else {
            handle.state = WriteBack::Clean;
        }

        let start = if mode.append {
            SeekFrom::End(0)
        } else {
            SeekFrom::Start(0)
        };
        handle.file()?.seek(start)?;
        Ok(handle)
    }

    pub fn remote_name(&self) -> &str {
        &self.remote
    }

    pub fn staging_path(&self) -> &Path {
        &self.staging
    }

    pub fn state(&self) -> WriteBack {
        self.state
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(ErrorKind::Other, "file handle is closed"))
    }

    fn push(&mut self) -> Result<()> {
        let session = Arc::clone(&self.session);
        let remote = self.remote.clone();
        let file = self.file()?;
        file.flush()?;
        file.sync_data()?;

        let position = file.stream_position()?;
        file.seek(SeekFrom::Start(0))?;
        let uploaded = lock(&session).and_then(|mut s| s.upload(&mut *file, &remote));
        file.seek(SeekFrom::Start(position))?;

        uploaded.map(|_| ())
    }

    /// Uploads, releases the lock and removes the staging file
    fn finish(&mut self) -> Result<()> {
        if self.file.is_none() {
            return Ok(());
        }

        let result = self.sync();
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
        self.discard_staging();
        result
    }

    fn discard_staging(&self) {
        if let Err(e) = fs::remove_file(&self.staging) {
            if e.kind() != ErrorKind::NotFound {
                let _ = log(&format!(
                    "Warning: could not remove staging file {}: {}",
                    self.staging.display(),
                    e
                ));
            }
        }
    }
}

impl<C: Connector> Read for FtpFile<C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.mode.read {
            return Err(io::Error::new(
                ErrorKind::PermissionDenied,
                "file not opened for reading",
            ));
        }
        self.file()?.read(buf)
    }
}

impl<C: Connector> Write for FtpFile<C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.mode.write {
            return Err(io::Error::new(
                ErrorKind::PermissionDenied,
                "file not opened for writing",
            ));
        }
        let append = self.mode.append;
        let file = self.file()?;
        if append {
            file.seek(SeekFrom::End(0))?;
        }
        let n = file.write(buf)?;
        if n > 0 {
            self.state = WriteBack::Dirty;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file()?.flush()
    }
}

impl<C: Connector> Seek for FtpFile<C> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file()?.seek(pos)
    }
}

impl<C: Connector> FsFile for FtpFile<C> {
    fn size(&mut self) -> Result<u64> {
        Ok(self.file()?.metadata()?.len())
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        if !self.mode.write {
            return Err(FsError::Io(io::Error::new(
                ErrorKind::PermissionDenied,
                "file not opened for writing",
            )));
        }
        self.file()?.set_len(size)?;
        self.state = WriteBack::Dirty;
        Ok(())
    }

    fn stat(&mut self) -> Result<StatInfo> {
        Ok(stat_from_metadata(&self.file()?.metadata()?))
    }

    /// Uploads the staging copy if it changed
    ///
    /// A failed upload leaves the handle dirty so a later sync or close
    /// tries again.
    fn sync(&mut self) -> Result<()> {
        if self.state != WriteBack::Dirty {
            self.file()?.flush()?;
            return Ok(());
        }
        self.push()?;
        self.state = WriteBack::Clean;
        Ok(())
    }

    fn close(mut self) -> Result<()> {
        self.finish()
    }
}

impl<C: Connector> Drop for FtpFile<C> {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            let _ = log(&format!(
                "Error: {} lost changes on drop: {}",
                self.remote, e
            ));
        }
    }
}

impl<C: Connector> FileSystem for FtpFs<C> {
    type File = FtpFile<C>;
    type Dir = DirSnapshot;

    fn open_file(&self, name: &str, mode: &str) -> Result<FtpFile<C>> {
        let mode = OpenMode::parse(mode)?;
        FtpFile::open(&self.session, name, mode)
    }

    fn remove_file(&self, name: &str) -> Result<()> {
        self.with(|s| s.dele(name))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.stat(name).map(|info| info.is_reg_file).unwrap_or(false)
    }

    fn rename_file(&self, name: &str, new_name: &str) -> Result<()> {
        self.with(|s| s.rename(name, new_name))
    }

    fn open_dir(&self, name: &str) -> Result<DirSnapshot> {
        self.with(|s| s.list(name)).map(DirSnapshot::new)
    }

    fn create_dir(&self, name: &str) -> Result<()> {
        self.with(|s| s.mkd(name))
    }

    fn remove_dir(&self, name: &str) -> Result<()> {
        self.with(|s| s.rmd(name))
    }

    fn change_dir(&self, name: &str) -> Result<()> {
        self.with(|s| s.cwd(name))
    }

    fn dir_exists(&self, name: &str) -> bool {
        self.stat(name).map(|info| info.is_dir).unwrap_or(false)
    }

    fn rename_dir(&self, name: &str, new_name: &str) -> Result<()> {
        self.with(|s| s.rename(name, new_name))
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        self.with(|s| s.size(name))
    }

    fn disk_info(&self, _volume: &str) -> Result<DiskInfo> {
        Err(FsError::NotImplemented("disk_info"))
    }

    fn stat(&self, name: &str) -> Result<StatInfo> {
        self.with(|s| s.stat(name))
    }

    fn cwd(&self) -> Result<String> {
        self.with(|s| s.pwd())
    }

    fn exe_path(&self) -> Result<PathBuf> {
        self.native.exe_path()
    }

    fn temp_path(&self) -> Result<PathBuf> {
        self.native.temp_path()
    }

    fn user_storage_path(&self) -> Result<PathBuf> {
        self.native.user_storage_path()
    }
}
