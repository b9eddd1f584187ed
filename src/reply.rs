//! Parsing of raw server replies
//!
//! Everything here is stateless: the functions take the bytes the server sent
//! and pull out reply codes, reply payloads, the passive endpoint tuple and
//! the quoted working directory.

use crate::error::{FsError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::net::{Ipv4Addr, SocketAddrV4};

/// Phrase closing a multi-line `213-Status` reply
pub const STATUS_END_PHRASE: &str = "End of status";

/// Marker opening a multi-line status reply
pub const STATUS_MARKER: &str = "213-Status";

/// `(h0,h1,h2,h3,pHi,pLo)` anywhere in a PASV reply
static PASV_TUPLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*\)")
        .expect("PASV tuple pattern is valid")
});

/// First quoted string of a PWD reply, `""` being an escaped quote
static QUOTED_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""((?:[^"]|"")*)""#).expect("quoted path pattern is valid"));

/// One logical server reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u32,
    /// Full reply text including the code and all continuation lines
    pub text: String,
}

impl Reply {
    /// Parses a complete reply buffer
    pub fn parse(text: &str) -> Result<Reply> {
        let code = parse_code(text)
            .ok_or_else(|| FsError::malformed(format!("no reply code in {:?}", text.trim_end())))?;
        Ok(Reply {
            code,
            text: text.to_string(),
        })
    }

    pub fn is_success(&self) -> bool {
        is_success(self.code)
    }

    /// Text following the first space of the first line
    ///
    /// For `213 1650` this is `1650`; for `227 Entering Passive Mode (...)`
    /// it is everything after the code. Continuation lines of multi-line
    /// replies are only reachable through `text`.
    pub fn data(&self) -> &str {
        let line = self.first_line();
        match line.find(' ') {
            Some(pos) => &line[pos + 1..],
            None => "",
        }
    }

    pub fn first_line(&self) -> &str {
        self.text.lines().next().unwrap_or("").trim_end_matches('\r')
    }
}

/// Reply codes in `[100, 400)` are success, everything else is a failure
pub fn is_success(code: u32) -> bool {
    (100..400).contains(&code)
}

/// Leading numeric token of a reply
pub fn parse_code(text: &str) -> Option<u32> {
    let digits: &str = {
        let end = text
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit())
            .map(|(i, _)| i)
            .unwrap_or(text.len());
        &text[..end]
    };
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

/// Length of the first complete reply in `buf`, or `None` if more bytes are needed
///
/// A single-line reply ends at its first line terminator. A multi-line reply
/// (`ddd-text`) ends at the line starting with `ddd `; a `213-Status` reply
/// also ends at the line carrying `End of status`.
pub fn reply_len(buf: &[u8]) -> Option<usize> {
    let first_end = line_end(buf, 0)?;
    let first_line = String::from_utf8_lossy(&buf[..first_end]);
    let first_line = first_line.trim_end();

    let code = match parse_code(first_line) {
        Some(code) if first_line.as_bytes().get(3) == Some(&b'-') => code,
        _ => return Some(first_end),
    };

    let status_reply = code == 213 && first_line.starts_with(STATUS_MARKER);
    let terminator = format!("{} ", code);
    let mut offset = first_end;

    while let Some(end) = line_end(buf, offset) {
        let line = String::from_utf8_lossy(&buf[offset..end]);
        let line = line.trim_end();
        if line.starts_with(&terminator) || line == terminator.trim_end() {
            return Some(end);
        }
        if status_reply && line.contains(STATUS_END_PHRASE) {
            return Some(end);
        }
        offset = end;
    }

    None
}

fn line_end(buf: &[u8], from: usize) -> Option<usize> {
    buf[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|pos| from + pos + 1)
}

/// Address advertised in a PASV reply
pub fn parse_pasv(text: &str) -> Result<SocketAddrV4> {
    let caps = PASV_TUPLE_RE
        .captures(text)
        .ok_or_else(|| FsError::malformed(format!("no passive tuple in {:?}", text.trim_end())))?;

    let mut fields = [0u8; 6];
    for (i, field) in fields.iter_mut().enumerate() {
        let raw = &caps[i + 1];
        *field = raw.parse().map_err(|_| {
            FsError::malformed(format!("passive tuple field {} out of range: {}", i, raw))
        })?;
    }

    let ip = Ipv4Addr::new(fields[0], fields[1], fields[2], fields[3]);
    let port = u16::from(fields[4]) * 256 + u16::from(fields[5]);
    Ok(SocketAddrV4::new(ip, port))
}

/// Directory name quoted in a PWD reply
pub fn parse_quoted_path(text: &str) -> Option<String> {
    QUOTED_PATH_RE
        .captures(text)
        .map(|caps| caps[1].replace("\"\"", "\""))
}

/// Numeric payload of a SIZE reply
pub fn parse_size(data: &str) -> Result<u64> {
    let token = data.split_whitespace().next().unwrap_or("");
    token
        .parse()
        .map_err(|_| FsError::malformed(format!("invalid size {:?}", data.trim_end())))
}
