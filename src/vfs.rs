//! Virtual filesystem capability set
//!
//! `FileSystem` is the interface every backend implements. The FTP backend
//! (`FtpFs`) and the local one (`NativeFs`) are interchangeable wherever a
//! caller is generic over it.

use crate::error::{FsError, Result};
use chrono::NaiveDateTime;
use std::fs::OpenOptions;
use std::io::{Read, Seek, Write};
use std::path::PathBuf;

/// Metadata of a file or directory
///
/// Fields a backend cannot supply stay at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatInfo {
    pub size: u64,
    /// Seconds since the Unix epoch
    pub mtime: i64,
    pub ctime: i64,
    pub atime: i64,
    pub is_dir: bool,
    pub is_link: bool,
    pub is_reg_file: bool,
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Link,
}

/// One record of a directory snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    /// Size when the server reports it
    pub size: Option<u64>,
    /// Modification time when the server reports it
    pub modified: Option<NaiveDateTime>,
}

impl DirEntry {
    pub fn new(name: &str, kind: EntryKind) -> Self {
        DirEntry {
            name: name.to_string(),
            kind,
            size: None,
            modified: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_link(&self) -> bool {
        self.kind == EntryKind::Link
    }
}

/// Free and total space of a volume in KiB
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskInfo {
    pub free_kb: u64,
    pub total_kb: u64,
}

/// Access mode parsed from a C-style mode string (`r`, `rb`, `w+`, `ab`...)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenMode {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub truncate: bool,
    pub create: bool,
}

impl OpenMode {
    pub fn parse(mode: &str) -> Result<OpenMode> {
        let mut chars = mode.chars();
        let mut open_mode = match chars.next() {
            Some('r') => OpenMode {
                read: true,
                ..Default::default()
            },
            Some('w') => OpenMode {
                write: true,
                truncate: true,
                create: true,
                ..Default::default()
            },
            Some('a') => OpenMode {
                write: true,
                append: true,
                create: true,
                ..Default::default()
            },
            _ => return Err(FsError::Config(format!("invalid open mode {:?}", mode))),
        };

        for c in chars {
            match c {
                '+' => {
                    open_mode.read = true;
                    open_mode.write = true;
                }
                'b' | 't' => {}
                _ => return Err(FsError::Config(format!("invalid open mode {:?}", mode))),
            }
        }

        Ok(open_mode)
    }

    /// Write/create modes accept a missing remote file
    pub fn creates(&self) -> bool {
        self.create
    }

    pub fn to_open_options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options
            .read(self.read)
            .write(self.write && !self.append)
            .append(self.append)
            .truncate(self.truncate)
            .create(self.create);
        options
    }
}

/// An open file of some backend
pub trait FsFile: Read + Write + Seek {
    fn tell(&mut self) -> Result<u64> {
        Ok(self.stream_position()?)
    }

    fn size(&mut self) -> Result<u64>;

    fn truncate(&mut self, size: u64) -> Result<()>;

    fn stat(&mut self) -> Result<StatInfo>;

    /// Pushes buffered changes to their final destination
    fn sync(&mut self) -> Result<()>;

    fn eof(&mut self) -> Result<bool> {
        Ok(self.tell()? >= self.size()?)
    }

    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// An open directory snapshot
pub trait FsDir: Iterator<Item = DirEntry> {
    /// Restarts iteration from the first entry
    fn rewind(&mut self);
}

/// Directory entries captured when the directory was opened
#[derive(Debug, Clone, Default)]
pub struct DirSnapshot {
    entries: Vec<DirEntry>,
    cursor: usize,
}

impl DirSnapshot {
    pub fn new(entries: Vec<DirEntry>) -> Self {
        DirSnapshot { entries, cursor: 0 }
    }

    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }
}

impl Iterator for DirSnapshot {
    type Item = DirEntry;

    fn next(&mut self) -> Option<DirEntry> {
        let entry = self.entries.get(self.cursor).cloned();
        if entry.is_some() {
            self.cursor += 1;
        }
        entry
    }
}

impl FsDir for DirSnapshot {
    fn rewind(&mut self) {
        self.cursor = 0;
    }
}

/// Filesystem capability set
pub trait FileSystem {
    type File: FsFile;
    type Dir: FsDir;

    fn open_file(&self, name: &str, mode: &str) -> Result<Self::File>;
    fn remove_file(&self, name: &str) -> Result<()>;
    fn file_exists(&self, name: &str) -> bool;
    fn rename_file(&self, name: &str, new_name: &str) -> Result<()>;

    fn open_dir(&self, name: &str) -> Result<Self::Dir>;
    fn create_dir(&self, name: &str) -> Result<()>;
    fn remove_dir(&self, name: &str) -> Result<()>;
    fn change_dir(&self, name: &str) -> Result<()>;
    fn dir_exists(&self, name: &str) -> bool;
    fn rename_dir(&self, name: &str, new_name: &str) -> Result<()>;

    fn file_size(&self, name: &str) -> Result<u64>;
    fn disk_info(&self, volume: &str) -> Result<DiskInfo>;
    fn stat(&self, name: &str) -> Result<StatInfo>;
    fn cwd(&self) -> Result<String>;

    fn exe_path(&self) -> Result<PathBuf>;
    fn temp_path(&self) -> Result<PathBuf>;
    fn user_storage_path(&self) -> Result<PathBuf>;
}
