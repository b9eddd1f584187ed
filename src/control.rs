//! Command/reply exchange over the control channel
//!
//! One command is written, one logical reply is read back. Bytes that arrive
//! after the end of a reply stay buffered for the next read, so a late
//! completion reply that shares a segment with the preliminary one is not
//! lost.

use crate::error::{FsError, Result};
use crate::logging::log_debug;
use crate::reply::{self, Reply};
use crate::transport::Transport;
use std::io::{self, ErrorKind};
use std::time::Duration;
use zeroize::Zeroize;

const READ_CHUNK: usize = 1024;

/// Upper bound for one logical reply
const MAX_REPLY_LEN: usize = 1 << 20;

/// Last error messages are cut to this many bytes
pub const LAST_ERROR_MESSAGE_MAX: usize = 256;

/// Most recent negative reply seen on a session
///
/// `code == 0` means the last command succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LastError {
    pub code: u32,
    pub message: String,
}

impl LastError {
    pub fn is_set(&self) -> bool {
        self.code != 0
    }
}

/// Control connection of one FTP session
pub struct ControlChannel<T: Transport> {
    transport: T,
    pending: Vec<u8>,
    write_timeout: Duration,
    last_error: LastError,
    broken: bool,
}

impl<T: Transport> ControlChannel<T> {
    pub fn new(transport: T, write_timeout: Duration) -> Self {
        ControlChannel {
            transport,
            pending: Vec::new(),
            write_timeout,
            last_error: LastError::default(),
            broken: false,
        }
    }

    pub fn last_error(&self) -> &LastError {
        &self.last_error
    }

    /// True once a transport failure made the channel unusable
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Sends `command` (without line terminator) and reads its reply
    ///
    /// Replies outside `[100, 400)` are returned as `FsError::Protocol` and
    /// recorded as the last error; a successful reply clears it.
    pub fn execute(&mut self, command: &str) -> Result<Reply> {
        self.send(command)?;
        let reply = self.read_reply()?;
        self.record(&reply)?;
        Ok(reply)
    }

    /// Reads the completion reply that follows a data transfer
    ///
    /// Only 2xx codes count as completion.
    pub fn expect_completion(&mut self) -> Result<Reply> {
        let reply = self.read_reply()?;
        self.record(&reply)?;
        if (200..300).contains(&reply.code) {
            Ok(reply)
        } else {
            Err(FsError::Protocol {
                code: reply.code,
                message: reply.text,
            })
        }
    }

    /// Reads one logical reply without classifying it
    pub fn read_reply(&mut self) -> Result<Reply> {
        if self.broken {
            return Err(FsError::Closed);
        }

        loop {
            if let Some(len) = reply::reply_len(&self.pending) {
                let raw: Vec<u8> = self.pending.drain(..len).collect();
                let text = String::from_utf8_lossy(&raw).into_owned();
                let reply = Reply::parse(&text)?;
                let _ = log_debug(&format!("< {}", reply.first_line()));
                return Ok(reply);
            }

            if self.pending.len() > MAX_REPLY_LEN {
                self.broken = true;
                return Err(FsError::malformed("reply exceeds maximum length"));
            }

            let mut chunk = [0u8; READ_CHUNK];
            match self.transport.read(&mut chunk) {
                Ok(0) => {
                    // Peer closed; a final unterminated reply is still usable
                    self.broken = true;
                    if reply::parse_code(&String::from_utf8_lossy(&self.pending)).is_some() {
                        let text = String::from_utf8_lossy(&self.pending).into_owned();
                        self.pending.clear();
                        return Reply::parse(&text);
                    }
                    return Err(FsError::Io(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "control connection closed by server",
                    )));
                }
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.broken = true;
                    return Err(FsError::Io(e));
                }
            }
        }
    }

    /// Closes the underlying transport
    pub fn close(&mut self) {
        self.transport.close();
        self.broken = true;
    }

    fn send(&mut self, command: &str) -> Result<()> {
        if self.broken {
            return Err(FsError::Closed);
        }

        let _ = log_debug(&format!("> {}", mask_command(command)));
        let mut line = format!("{}\r\n", command);
        let result = self
            .transport
            .write_all_timeout(line.as_bytes(), self.write_timeout);
        line.zeroize();

        result.map_err(|e| {
            self.broken = true;
            FsError::Io(e)
        })
    }

    fn record(&mut self, reply: &Reply) -> Result<()> {
        if reply.is_success() {
            self.last_error = LastError::default();
            Ok(())
        } else {
            self.last_error = LastError {
                code: reply.code,
                message: truncate_message(&reply.text),
            };
            Err(FsError::Protocol {
                code: reply.code,
                message: reply.text.clone(),
            })
        }
    }
}

/// Hides credentials in traced commands
fn mask_command(command: &str) -> String {
    let is_pass = command
        .get(..4)
        .map_or(false, |verb| verb.eq_ignore_ascii_case("PASS"));
    if is_pass {
        "PASS ****".to_string()
    } else {
        command.to_string()
    }
}

fn truncate_message(text: &str) -> String {
    if text.len() <= LAST_ERROR_MESSAGE_MAX {
        return text.to_string();
    }
    let mut end = LAST_ERROR_MESSAGE_MAX;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
