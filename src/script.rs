//! Scripted filesystem sessions
//!
//! A script is a JSONL file, one step per line, tagged by `op`:
//!
//! ```text
//! {"op":"create","host":"localhost","port":2121,"user":"admin","password":"admin"}
//! {"op":"create_dir","name":"/incoming"}
//! {"op":"upload","local":"README.md","remote":"/incoming/readme.md"}
//! {"op":"get_file_size","name":"/incoming/readme.md","size":1024}
//! {"op":"dir_list","name":"/incoming","items":"{file:readme.md};"}
//! {"op":"close"}
//! ```
//!
//! Steps that carry an expectation (`size`, `exist`, `result`, `items`,
//! `cwd`) are checked against what the server did; every outcome is logged
//! as `<op>: ...` or `<op> failed: ...`.

use crate::config::{parse_jsonl, SessionConfig};
use crate::error::Result;
use crate::ftp_fs::FtpFs;
use crate::logging::log;
use crate::native::NativeFs;
use crate::shutdown::is_shutdown_requested;
use crate::vfs::{FileSystem, FsFile};
use serde::Deserialize;
use std::io::{self, Error, ErrorKind};
use std::thread;
use std::time::Duration;

fn yes() -> bool {
    true
}

fn default_sleep_ms() -> u64 {
    1000
}

/// One script step
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Connects; ignored while a session is already open
    Create(SessionConfig),
    GetFileSize {
        name: String,
        size: Option<u64>,
    },
    GetCwd {
        cwd: Option<String>,
    },
    FileExists {
        name: String,
        #[serde(default = "yes")]
        exist: bool,
    },
    RemoveFile {
        name: String,
        #[serde(default = "yes")]
        result: bool,
    },
    RenameFile {
        from: String,
        to: String,
        #[serde(default = "yes")]
        result: bool,
    },
    CreateDir {
        name: String,
        #[serde(default = "yes")]
        result: bool,
    },
    RemoveDir {
        name: String,
        #[serde(default = "yes")]
        result: bool,
    },
    RenameDir {
        from: String,
        to: String,
        #[serde(default = "yes")]
        result: bool,
    },
    ChangeDir {
        name: String,
        #[serde(default = "yes")]
        result: bool,
    },
    DirExists {
        name: String,
        #[serde(default = "yes")]
        exist: bool,
    },
    /// `items` is the expected listing rendered as `{dir:b};{file:a.txt};`
    DirList {
        name: String,
        items: Option<String>,
    },
    RemoveLocalFile {
        name: String,
    },
    Download {
        remote: String,
        local: String,
        size: Option<u64>,
    },
    Upload {
        local: String,
        remote: String,
    },
    Stat {
        name: String,
        size: Option<u64>,
    },
    Sleep {
        #[serde(default = "default_sleep_ms")]
        time: u64,
    },
    Close,
}

impl Step {
    pub fn op(&self) -> &'static str {
        match self {
            Step::Create(_) => "create",
            Step::GetFileSize { .. } => "get_file_size",
            Step::GetCwd { .. } => "get_cwd",
            Step::FileExists { .. } => "file_exists",
            Step::RemoveFile { .. } => "remove_file",
            Step::RenameFile { .. } => "rename_file",
            Step::CreateDir { .. } => "create_dir",
            Step::RemoveDir { .. } => "remove_dir",
            Step::RenameDir { .. } => "rename_dir",
            Step::ChangeDir { .. } => "change_dir",
            Step::DirExists { .. } => "dir_exists",
            Step::DirList { .. } => "dir_list",
            Step::RemoveLocalFile { .. } => "remove_local_file",
            Step::Download { .. } => "download",
            Step::Upload { .. } => "upload",
            Step::Stat { .. } => "stat",
            Step::Sleep { .. } => "sleep",
            Step::Close => "close",
        }
    }
}

/// Loads a script file
///
/// # Errors
/// - File not found or unreadable
/// - A line that is not a valid step (the error names the line)
pub fn parse_script(filename: &str) -> io::Result<Vec<Step>> {
    let steps: Vec<Step> = parse_jsonl::<Step>(filename)?
        .into_iter()
        .map(|(_, step)| step)
        .collect();
    if steps.is_empty() {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            format!("no steps in {}", filename),
        ));
    }
    Ok(steps)
}

/// Outcome of `run_script`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptSummary {
    pub steps_run: usize,
    /// Steps that failed or did not meet their expectation
    pub failures: usize,
    /// Stopped early because shutdown was requested
    pub interrupted: bool,
}

/// Runs `steps` `times` times in a row
///
/// The session opened by `create` lives across rounds and is closed at the
/// end if the script did not close it.
pub fn run_script(steps: &[Step], times: u32) -> ScriptSummary {
    let mut runner = Runner { fs: None };
    let mut summary = ScriptSummary::default();
    let times = times.max(1);

    'rounds: for round in 1..=times {
        for step in steps {
            if is_shutdown_requested() {
                let _ = log("Shutdown requested, stopping script");
                summary.interrupted = true;
                break 'rounds;
            }
            summary.steps_run += 1;
            if !runner.run(step) {
                summary.failures += 1;
            }
        }
        let _ = log(&format!("============= round {}/{} =============", round, times));
    }

    if let Some(fs) = runner.fs.take() {
        if let Err(e) = fs.destroy() {
            let _ = log(&format!("close failed: {}", e));
        }
    }
    summary
}

struct Runner {
    fs: Option<FtpFs>,
}

/// Logs an outcome and passes `ok` through
fn report(op: &str, ok: bool, detail: &str) -> bool {
    if ok {
        let _ = log(&format!("{}: {}", op, detail));
    } else {
        let _ = log(&format!("{} failed: {}", op, detail));
    }
    ok
}

/// Compares an operation's success with the expected `result`
fn expect_result(op: &str, outcome: Result<()>, expected: bool, what: &str) -> bool {
    match outcome {
        Ok(()) => report(op, expected, &format!("{} ok", what)),
        Err(e) => report(op, !expected, &format!("{}: {}", what, e)),
    }
}

/// Renders a listing the way `dir_list` expectations spell it
pub fn render_listing<I: IntoIterator<Item = crate::vfs::DirEntry>>(entries: I) -> String {
    entries
        .into_iter()
        .map(|e| format!("{{{}:{}}};", if e.is_dir() { "dir" } else { "file" }, e.name))
        .collect()
}

fn download(fs: &FtpFs, remote: &str, local: &str) -> Result<u64> {
    let mut from = fs.open_file(remote, "rb")?;
    let mut to = NativeFs.open_file(local, "wb+")?;
    let copied = io::copy(&mut from, &mut to)?;
    to.close()?;
    from.close()?;
    Ok(copied)
}

fn upload(fs: &FtpFs, local: &str, remote: &str) -> Result<u64> {
    let mut from = NativeFs.open_file(local, "rb")?;
    let mut to = fs.open_file(remote, "wb+")?;
    let copied = io::copy(&mut from, &mut to)?;
    from.close()?;
    to.close()?;
    Ok(copied)
}

impl Runner {
    fn run(&mut self, step: &Step) -> bool {
        let op = step.op();

        match step {
            Step::Create(config) => {
                if self.fs.is_some() {
                    return report(op, true, "already connected");
                }
                return match FtpFs::connect(config) {
                    Ok(fs) => {
                        self.fs = Some(fs);
                        report(op, true, &format!("{}:{} {}", config.host, config.port, config.user))
                    }
                    Err(e) => report(op, false, &format!("{}:{}: {}", config.host, config.port, e)),
                };
            }
            Step::Close => {
                return match self.fs.take() {
                    Some(fs) => match fs.destroy() {
                        Ok(()) => report(op, true, "session closed"),
                        Err(e) => report(op, false, &e.to_string()),
                    },
                    None => report(op, true, "no session"),
                };
            }
            Step::Sleep { time } => {
                thread::sleep(Duration::from_millis(*time));
                return report(op, true, &format!("{} ms", time));
            }
            Step::RemoveLocalFile { name } => {
                return match NativeFs.remove_file(name) {
                    Ok(()) => report(op, true, name),
                    Err(e) => report(op, false, &format!("{}: {}", name, e)),
                };
            }
            _ => {}
        }

        let Some(fs) = self.fs.as_ref() else {
            return report(op, false, "not connected");
        };

        match step {
            Step::GetFileSize { name, size } => match fs.file_size(name) {
                Ok(actual) => report(
                    op,
                    size.map_or(true, |s| s == actual),
                    &format!("{} {}", name, actual),
                ),
                Err(e) => report(op, false, &format!("{}: {}", name, e)),
            },
            Step::GetCwd { cwd } => match fs.cwd() {
                Ok(actual) => report(
                    op,
                    cwd.as_deref().map_or(true, |c| c == actual),
                    &actual,
                ),
                Err(e) => report(op, false, &e.to_string()),
            },
            Step::FileExists { name, exist } => {
                let actual = fs.file_exists(name);
                report(op, actual == *exist, &format!("{} {}", name, actual))
            }
            Step::DirExists { name, exist } => {
                let actual = fs.dir_exists(name);
                report(op, actual == *exist, &format!("{} {}", name, actual))
            }
            Step::RemoveFile { name, result } => expect_result(op, fs.remove_file(name), *result, name),
            Step::RenameFile { from, to, result } => expect_result(
                op,
                fs.rename_file(from, to),
                *result,
                &format!("{} -> {}", from, to),
            ),
            Step::CreateDir { name, result } => expect_result(op, fs.create_dir(name), *result, name),
            Step::RemoveDir { name, result } => expect_result(op, fs.remove_dir(name), *result, name),
            Step::RenameDir { from, to, result } => expect_result(
                op,
                fs.rename_dir(from, to),
                *result,
                &format!("{} -> {}", from, to),
            ),
            Step::ChangeDir { name, result } => expect_result(op, fs.change_dir(name), *result, name),
            Step::DirList { name, items } => match fs.open_dir(name) {
                Ok(dir) => {
                    let actual = render_listing(dir);
                    report(
                        op,
                        items.as_deref().map_or(true, |i| i == actual),
                        &format!("{} {}", name, actual),
                    )
                }
                Err(e) => report(op, false, &format!("{}: {}", name, e)),
            },
            Step::Download { remote, local, size } => match download(fs, remote, local) {
                Ok(copied) => report(
                    op,
                    size.map_or(true, |s| s == copied),
                    &format!("{} => {} ({} bytes)", remote, local, copied),
                ),
                Err(e) => report(op, false, &format!("{}: {}", remote, e)),
            },
            Step::Upload { local, remote } => match upload(fs, local, remote) {
                Ok(copied) => report(op, true, &format!("{} => {} ({} bytes)", local, remote, copied)),
                Err(e) => report(op, false, &format!("{}: {}", local, e)),
            },
            Step::Stat { name, size } => match fs.stat(name) {
                Ok(info) => report(
                    op,
                    size.map_or(true, |s| s == info.size),
                    &format!("{} {}", name, info.size),
                ),
                Err(e) => report(op, false, &format!("{}: {}", name, e)),
            },
            Step::Create(_)
            | Step::Close
            | Step::Sleep { .. }
            | Step::RemoveLocalFile { .. } => true,
        }
    }
}
