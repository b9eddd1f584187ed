//! Local filesystem backend over `std::fs`

use crate::error::{FsError, Result};
use crate::vfs::{
    DirEntry, DirSnapshot, DiskInfo, EntryKind, FileSystem, FsFile, OpenMode, StatInfo,
};
use std::fs::{self, File, Metadata};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

#[derive(Debug, Clone, Copy, Default)]
pub struct NativeFs;

/// A local file opened through `NativeFs`
#[derive(Debug)]
pub struct NativeFile {
    file: File,
}

impl Read for NativeFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for NativeFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for NativeFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl FsFile for NativeFile {
    fn size(&mut self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        Ok(self.file.set_len(size)?)
    }

    fn stat(&mut self) -> Result<StatInfo> {
        Ok(stat_from_metadata(&self.file.metadata()?))
    }

    fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(self.file.sync_all()?)
    }

    fn close(mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

/// Builds a `StatInfo` from local metadata
pub fn stat_from_metadata(meta: &Metadata) -> StatInfo {
    let mut info = StatInfo {
        size: meta.len(),
        is_dir: meta.is_dir(),
        is_link: meta.file_type().is_symlink(),
        is_reg_file: meta.is_file(),
        ..Default::default()
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        info.mtime = meta.mtime();
        info.ctime = meta.ctime();
        info.atime = meta.atime();
        info.uid = meta.uid();
        info.gid = meta.gid();
    }

    #[cfg(not(unix))]
    {
        let secs = |t: io::Result<std::time::SystemTime>| {
            t.ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |d| d.as_secs() as i64)
        };
        info.mtime = secs(meta.modified());
        info.ctime = secs(meta.created());
        info.atime = secs(meta.accessed());
    }

    info
}

fn entry_from_dir_entry(entry: &fs::DirEntry) -> Option<DirEntry> {
    let name = entry.file_name().to_string_lossy().into_owned();
    let file_type = entry.file_type().ok()?;
    let kind = if file_type.is_dir() {
        EntryKind::Dir
    } else if file_type.is_file() {
        EntryKind::File
    } else {
        EntryKind::Link
    };

    let meta = entry.metadata().ok();
    Some(DirEntry {
        name,
        kind,
        size: meta.as_ref().filter(|m| m.is_file()).map(|m| m.len()),
        modified: meta
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .and_then(|d| chrono::DateTime::from_timestamp(d.as_secs() as i64, 0))
            .map(|dt| dt.naive_utc()),
    })
}

impl FileSystem for NativeFs {
    type File = NativeFile;
    type Dir = DirSnapshot;

    fn open_file(&self, name: &str, mode: &str) -> Result<NativeFile> {
        let file = OpenMode::parse(mode)?.to_open_options().open(name)?;
        Ok(NativeFile { file })
    }

    fn remove_file(&self, name: &str) -> Result<()> {
        Ok(fs::remove_file(name)?)
    }

    fn file_exists(&self, name: &str) -> bool {
        fs::metadata(name).map(|m| m.is_file()).unwrap_or(false)
    }

    fn rename_file(&self, name: &str, new_name: &str) -> Result<()> {
        Ok(fs::rename(name, new_name)?)
    }

    fn open_dir(&self, name: &str) -> Result<DirSnapshot> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(name)? {
            if let Some(entry) = entry.ok().as_ref().and_then(entry_from_dir_entry) {
                entries.push(entry);
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(DirSnapshot::new(entries))
    }

    fn create_dir(&self, name: &str) -> Result<()> {
        Ok(fs::create_dir(name)?)
    }

    fn remove_dir(&self, name: &str) -> Result<()> {
        Ok(fs::remove_dir(name)?)
    }

    fn change_dir(&self, name: &str) -> Result<()> {
        Ok(std::env::set_current_dir(name)?)
    }

    fn dir_exists(&self, name: &str) -> bool {
        fs::metadata(name).map(|m| m.is_dir()).unwrap_or(false)
    }

    fn rename_dir(&self, name: &str, new_name: &str) -> Result<()> {
        Ok(fs::rename(name, new_name)?)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        Ok(fs::metadata(name)?.len())
    }

    fn disk_info(&self, _volume: &str) -> Result<DiskInfo> {
        Err(FsError::NotImplemented("disk_info"))
    }

    fn stat(&self, name: &str) -> Result<StatInfo> {
        let mut info = stat_from_metadata(&fs::metadata(name)?);
        info.is_link = fs::symlink_metadata(name)?.file_type().is_symlink();
        Ok(info)
    }

    fn cwd(&self) -> Result<String> {
        Ok(std::env::current_dir()?.to_string_lossy().into_owned())
    }

    fn exe_path(&self) -> Result<PathBuf> {
        Ok(std::env::current_exe()?)
    }

    fn temp_path(&self) -> Result<PathBuf> {
        Ok(std::env::temp_dir())
    }

    fn user_storage_path(&self) -> Result<PathBuf> {
        match std::env::var_os("HOME") {
            Some(home) if !home.is_empty() => Ok(PathBuf::from(home)),
            _ => Ok(std::env::temp_dir()),
        }
    }
}
