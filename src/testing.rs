//! Test doubles: a scripted transport and a loopback FTP server
//!
//! The fake server speaks just enough FTP for the client: login, passive
//! data connections, MLSD, SIZE, both stat dialects, RETR/STOR and the
//! directory commands. It keeps its tree in memory and records every
//! command it receives so tests can assert on the exact wire sequence.

use crate::config::SessionConfig;
use crate::transport::Transport;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Transport replaying canned server bytes and capturing what is written
pub struct ScriptedTransport {
    chunks: VecDeque<Vec<u8>>,
    written: Vec<u8>,
}

impl ScriptedTransport {
    pub fn new(chunks: &[&str]) -> Self {
        ScriptedTransport {
            chunks: chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
            written: Vec::new(),
        }
    }

    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.written).into_owned()
    }
}

impl Read for ScriptedTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let chunk = match self.chunks.front_mut() {
            Some(chunk) => chunk,
            None => return Ok(0),
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        chunk.drain(..n);
        if chunk.is_empty() {
            self.chunks.pop_front();
        }
        Ok(n)
    }
}

impl Write for ScriptedTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for ScriptedTransport {
    fn write_all_timeout(&mut self, buf: &[u8], _timeout: Duration) -> io::Result<()> {
        self.write_all(buf)
    }

    fn close(&mut self) {}
}

pub const FAKE_USER: &str = "admin";
pub const FAKE_PASSWORD: &str = "admin";

/// Fixed timestamps reported by XSTAT
pub const FAKE_MTIME: i64 = 1698239520;
pub const FAKE_CTIME: i64 = 1698239000;
pub const FAKE_ATIME: i64 = 1698239999;

/// Server behaviour knobs
#[derive(Debug, Clone)]
pub struct FakeServerOptions {
    /// Text after `220 ` in the welcome banner
    pub banner: String,
    /// Whether XSTAT is understood; otherwise it is answered with 500
    pub xstat: bool,
}

impl FakeServerOptions {
    pub fn pyftpdlib() -> Self {
        FakeServerOptions {
            banner: "pyftpdlib 1.5.7 ready.".to_string(),
            xstat: true,
        }
    }

    pub fn vsftpd() -> Self {
        FakeServerOptions {
            banner: "(vsFTPd 3.0.3)".to_string(),
            xstat: false,
        }
    }

    /// Unrecognized banner, extended stat not supported
    pub fn anonymous_posix() -> Self {
        FakeServerOptions {
            banner: "FTP server ready.".to_string(),
            xstat: false,
        }
    }

    /// Unrecognized banner, extended stat supported
    pub fn anonymous_extended() -> Self {
        FakeServerOptions {
            banner: "FTP server ready.".to_string(),
            xstat: true,
        }
    }
}

#[derive(Default)]
struct Tree {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
}

impl Tree {
    fn parent(path: &str) -> &str {
        match path.rfind('/') {
            Some(0) => "/",
            Some(pos) => &path[..pos],
            None => "/",
        }
    }

    fn base(path: &str) -> &str {
        path.rsplit('/').next().unwrap_or(path)
    }

    fn children(&self, dir: &str) -> Vec<(String, Option<usize>)> {
        let mut out = Vec::new();
        for d in &self.dirs {
            if d != "/" && Self::parent(d) == dir {
                out.push((Self::base(d).to_string(), None));
            }
        }
        for (f, data) in &self.files {
            if Self::parent(f) == dir {
                out.push((Self::base(f).to_string(), Some(data.len())));
            }
        }
        out
    }
}

struct Shared {
    options: FakeServerOptions,
    tree: Mutex<Tree>,
    commands: Mutex<Vec<String>>,
    reject_stor: AtomicBool,
    stall_stor: AtomicBool,
    pasv_reply: Mutex<Option<String>>,
}

/// In-process FTP server listening on 127.0.0.1
pub struct FakeFtpServer {
    port: u16,
    shared: Arc<Shared>,
}

impl FakeFtpServer {
    pub fn start(options: FakeServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake server");
        let port = listener.local_addr().expect("local addr").port();
        let mut tree = Tree::default();
        tree.dirs.insert("/".to_string());

        let shared = Arc::new(Shared {
            options,
            tree: Mutex::new(tree),
            commands: Mutex::new(Vec::new()),
            reject_stor: AtomicBool::new(false),
            stall_stor: AtomicBool::new(false),
            pasv_reply: Mutex::new(None),
        });

        let accept_shared = Arc::clone(&shared);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let conn_shared = Arc::clone(&accept_shared);
                thread::spawn(move || {
                    let _ = handle_connection(stream, conn_shared);
                });
            }
        });

        FakeFtpServer { port, shared }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn session_config(&self, staging_dir: &Path) -> SessionConfig {
        let mut config = SessionConfig::new("127.0.0.1", self.port, FAKE_USER, FAKE_PASSWORD);
        config.connect_timeout_secs = 5;
        config.staging_dir = Some(staging_dir.to_path_buf());
        config
    }

    pub fn put_file(&self, path: &str, data: &[u8]) {
        self.shared
            .tree
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), data.to_vec());
    }

    pub fn put_dir(&self, path: &str) {
        self.shared.tree.lock().unwrap().dirs.insert(path.to_string());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.shared.tree.lock().unwrap().files.get(path).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.shared.tree.lock().unwrap().dirs.contains(path)
    }

    /// Every command line received so far, across all connections
    pub fn commands(&self) -> Vec<String> {
        self.shared.commands.lock().unwrap().clone()
    }

    /// Number of received commands whose verb equals `verb`
    pub fn count(&self, verb: &str) -> usize {
        self.commands()
            .iter()
            .filter(|c| c.split(' ').next() == Some(verb))
            .count()
    }

    pub fn clear_commands(&self) {
        self.shared.commands.lock().unwrap().clear();
    }

    /// Makes STOR fail with 553 until switched back
    pub fn set_reject_stor(&self, reject: bool) {
        self.shared.reject_stor.store(reject, Ordering::SeqCst);
    }

    /// Makes STOR accept the data connection, then never read it nor reply
    pub fn set_stall_stor(&self, stall: bool) {
        self.shared.stall_stor.store(stall, Ordering::SeqCst);
    }

    /// Answers PASV with `text` instead of opening a data listener
    pub fn set_pasv_reply(&self, text: Option<&str>) {
        *self.shared.pasv_reply.lock().unwrap() = text.map(str::to_string);
    }
}

fn resolve(cwd: &str, name: &str) -> String {
    let joined = if name.starts_with('/') {
        name.to_string()
    } else {
        format!("{}/{}", cwd, name)
    };
    let mut parts: Vec<&str> = Vec::new();
    for part in joined.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    format!("/{}", parts.join("/"))
}

fn reply(stream: &mut TcpStream, text: &str) -> io::Result<()> {
    stream.write_all(text.as_bytes())
}

fn handle_connection(stream: TcpStream, shared: Arc<Shared>) -> io::Result<()> {
    let mut out = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    let mut cwd = "/".to_string();
    let mut data_listener: Option<TcpListener> = None;
    let mut rename_from: Option<String> = None;
    let mut user_ok = false;

    reply(&mut out, &format!("220 {}\r\n", shared.options.banner))?;

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let line = line.trim_end().to_string();
        shared.commands.lock().unwrap().push(line.clone());

        let (verb, arg) = match line.find(' ') {
            Some(pos) => (line[..pos].to_ascii_uppercase(), line[pos + 1..].to_string()),
            None => (line.to_ascii_uppercase(), String::new()),
        };
        let path = resolve(&cwd, &arg);

        match verb.as_str() {
            "USER" => {
                user_ok = arg == FAKE_USER;
                reply(&mut out, "331 Username ok, send password.\r\n")?;
            }
            "PASS" => {
                if user_ok && arg == FAKE_PASSWORD {
                    reply(&mut out, "230 Login successful.\r\n")?;
                } else {
                    reply(&mut out, "530 Authentication failed.\r\n")?;
                }
            }
            "TYPE" => reply(&mut out, "200 Type set to: Binary.\r\n")?,
            "PASV" => {
                let canned = shared.pasv_reply.lock().unwrap().clone();
                if let Some(text) = canned {
                    data_listener = None;
                    reply(&mut out, &format!("{}\r\n", text))?;
                    continue;
                }
                let listener = TcpListener::bind("127.0.0.1:0")?;
                let port = listener.local_addr()?.port();
                data_listener = Some(listener);
                reply(
                    &mut out,
                    &format!(
                        "227 Entering passive mode (127,0,0,1,{},{}).\r\n",
                        port / 256,
                        port % 256
                    ),
                )?;
            }
            "PWD" => reply(&mut out, &format!("257 \"{}\" is the current directory.\r\n", cwd))?,
            "CWD" => {
                if shared.tree.lock().unwrap().dirs.contains(&path) {
                    cwd = path;
                    reply(&mut out, &format!("250 \"{}\" is the current directory.\r\n", cwd))?;
                } else {
                    reply(&mut out, "550 No such file or directory.\r\n")?;
                }
            }
            "MKD" => {
                let mut tree = shared.tree.lock().unwrap();
                if tree.dirs.contains(&path) || tree.files.contains_key(&path) {
                    reply(&mut out, "550 File exists.\r\n")?;
                } else {
                    tree.dirs.insert(path.clone());
                    reply(&mut out, &format!("257 \"{}\" directory created.\r\n", path))?;
                }
            }
            "RMD" => {
                let mut tree = shared.tree.lock().unwrap();
                if !tree.dirs.contains(&path) || !tree.children(&path).is_empty() {
                    reply(&mut out, "550 Directory not empty or missing.\r\n")?;
                } else {
                    tree.dirs.remove(&path);
                    reply(&mut out, "250 Directory removed.\r\n")?;
                }
            }
            "DELE" => {
                if shared.tree.lock().unwrap().files.remove(&path).is_some() {
                    reply(&mut out, "250 File removed.\r\n")?;
                } else {
                    reply(&mut out, "550 No such file or directory.\r\n")?;
                }
            }
            "RNFR" => {
                let tree = shared.tree.lock().unwrap();
                if tree.files.contains_key(&path) || tree.dirs.contains(&path) {
                    rename_from = Some(path);
                    reply(&mut out, "350 Ready for destination name.\r\n")?;
                } else {
                    reply(&mut out, "550 No such file or directory.\r\n")?;
                }
            }
            "RNTO" => match rename_from.take() {
                Some(from) => {
                    let mut tree = shared.tree.lock().unwrap();
                    if let Some(data) = tree.files.remove(&from) {
                        tree.files.insert(path, data);
                    } else {
                        tree.dirs.remove(&from);
                        let moved: Vec<(String, Vec<u8>)> = tree
                            .files
                            .iter()
                            .filter(|(k, _)| k.starts_with(&format!("{}/", from)))
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect();
                        for (k, v) in moved {
                            tree.files.remove(&k);
                            tree.files.insert(format!("{}{}", path, &k[from.len()..]), v);
                        }
                        tree.dirs.insert(path);
                    }
                    reply(&mut out, "250 Renaming ok.\r\n")?;
                }
                None => reply(&mut out, "503 Bad sequence of commands.\r\n")?,
            },
            "SIZE" => {
                let size = shared.tree.lock().unwrap().files.get(&path).map(|d| d.len());
                match size {
                    Some(size) => reply(&mut out, &format!("213 {}\r\n", size))?,
                    None => reply(&mut out, "550 Could not get file size.\r\n")?,
                }
            }
            "XSTAT" if shared.options.xstat => {
                let tree = shared.tree.lock().unwrap();
                if let Some(data) = tree.files.get(&path) {
                    reply(
                        &mut out,
                        &format!(
                            "213 {} {} {} {} 0 0 1 1000 1000\r\n",
                            data.len(),
                            FAKE_MTIME,
                            FAKE_CTIME,
                            FAKE_ATIME
                        ),
                    )?;
                } else if tree.dirs.contains(&path) {
                    reply(
                        &mut out,
                        &format!(
                            "213 4096 {} {} {} 1 0 0 1000 1000\r\n",
                            FAKE_MTIME, FAKE_CTIME, FAKE_ATIME
                        ),
                    )?;
                } else {
                    reply(&mut out, "550 No such file or directory.\r\n")?;
                }
            }
            "STAT" if !arg.is_empty() => {
                let tree = shared.tree.lock().unwrap();
                let header = format!("213-Status of \"{}\":\r\n", path);
                if let Some(data) = tree.files.get(&path) {
                    reply(
                        &mut out,
                        &format!(
                            "{}-rw-r--r--   1 1000     1000     {:>8} Oct 25 13:12 {}\r\n213 End of status.\r\n",
                            header,
                            data.len(),
                            Tree::base(&path)
                        ),
                    )?;
                } else if tree.dirs.contains(&path) {
                    let mut text = header;
                    if !tree.children(&path).is_empty() {
                        text.push_str("drwxr-xr-x   2 1000     1000         4096 Oct 25 13:12 .\r\n");
                    }
                    text.push_str("213 End of status.\r\n");
                    reply(&mut out, &text)?;
                } else {
                    reply(&mut out, "550 No such file or directory.\r\n")?;
                }
            }
            "MLSD" => {
                let dir = if arg.is_empty() { cwd.clone() } else { path };
                let entries = {
                    let tree = shared.tree.lock().unwrap();
                    if !tree.dirs.contains(&dir) {
                        None
                    } else {
                        Some(tree.children(&dir))
                    }
                };
                match (entries, data_listener.take()) {
                    (Some(entries), Some(listener)) => {
                        reply(&mut out, "150 File status okay. About to open data connection.\r\n")?;
                        let (mut data, _) = listener.accept()?;
                        for (name, size) in entries {
                            let line = match size {
                                Some(size) => format!("type=file;size={};modify=20231025131200; {}\r\n", size, name),
                                None => format!("type=dir;modify=20231025131200; {}\r\n", name),
                            };
                            data.write_all(line.as_bytes())?;
                        }
                        drop(data);
                        reply(&mut out, "226 Transfer complete.\r\n")?;
                    }
                    (None, _) => reply(&mut out, "550 No such file or directory.\r\n")?,
                    (_, None) => reply(&mut out, "425 Use PASV first.\r\n")?,
                }
            }
            "RETR" => {
                let content = shared.tree.lock().unwrap().files.get(&path).cloned();
                match (content, data_listener.take()) {
                    (Some(content), Some(listener)) => {
                        reply(&mut out, "150 File status okay. About to open data connection.\r\n")?;
                        let (mut data, _) = listener.accept()?;
                        data.write_all(&content)?;
                        drop(data);
                        reply(&mut out, "226 Transfer complete.\r\n")?;
                    }
                    (None, _) => reply(&mut out, "550 No such file or directory.\r\n")?,
                    (_, None) => reply(&mut out, "425 Use PASV first.\r\n")?,
                }
            }
            "STOR" => {
                if shared.reject_stor.load(Ordering::SeqCst) {
                    data_listener = None;
                    reply(&mut out, "553 Could not create file.\r\n")?;
                    continue;
                }
                match data_listener.take() {
                    Some(listener) => {
                        reply(&mut out, "150 File status okay. About to open data connection.\r\n")?;
                        let (mut data, _) = listener.accept()?;
                        if shared.stall_stor.load(Ordering::SeqCst) {
                            // Hold the data connection unread until the client hangs up
                            let mut rest = String::new();
                            while reader.read_line(&mut rest)? != 0 {
                                rest.clear();
                            }
                            drop(data);
                            return Ok(());
                        }
                        let mut content = Vec::new();
                        data.read_to_end(&mut content)?;
                        shared.tree.lock().unwrap().files.insert(path, content);
                        reply(&mut out, "226 Transfer complete.\r\n")?;
                    }
                    None => reply(&mut out, "425 Use PASV first.\r\n")?,
                }
            }
            "QUIT" => {
                reply(&mut out, "221 Goodbye.\r\n")?;
                return Ok(());
            }
            _ => reply(&mut out, "500 Command not understood.\r\n")?,
        }
    }
}
