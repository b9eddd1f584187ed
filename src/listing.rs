//! MLSD directory listings

use crate::error::Result;
use crate::session::Session;
use crate::transport::Connector;
use crate::vfs::{DirEntry, EntryKind};
use chrono::NaiveDateTime;
use std::io::Read;

impl<C: Connector> Session<C> {
    /// Lists `path` with MLSD
    ///
    /// The data channel is drained to EOF and closed before the completion
    /// reply is read. Entries come back in server order.
    pub fn list(&mut self, path: &str) -> Result<Vec<DirEntry>> {
        self.cwd(path)?;
        self.enter_passive()?;

        let drained = self.control.execute(&format!("MLSD {}", path)).and_then(|_| {
            let mut raw = Vec::new();
            self.data_stream()?.read_to_end(&mut raw)?;
            Ok(raw)
        });
        self.close_data();
        let raw = drained?;

        self.control.expect_completion()?;
        Ok(parse_listing(&String::from_utf8_lossy(&raw)))
    }
}

/// Parses every record of an MLSD payload, skipping unusable lines
pub fn parse_listing(payload: &str) -> Vec<DirEntry> {
    payload
        .split(['\r', '\n'])
        .filter_map(parse_mlsd_line)
        .collect()
}

/// `type=file;size=10;modify=20231025131200; a.txt`
///
/// Facts run up to the first space, the name is everything after it, so
/// names containing `;` or spaces survive. `type` values containing `dir`
/// (also `cdir`/`pdir`) are directories, values containing `file` are
/// regular files, anything else is a link.
pub fn parse_mlsd_line(line: &str) -> Option<DirEntry> {
    let (facts, name) = line.split_once(' ')?;
    if name.is_empty() {
        return None;
    }

    let mut kind = EntryKind::Link;
    let mut size = None;
    let mut modified = None;

    for fact in facts.split(';') {
        let Some((key, value)) = fact.split_once('=') else {
            continue;
        };
        if key.eq_ignore_ascii_case("type") {
            let value = value.to_ascii_lowercase();
            kind = if value.contains("dir") {
                EntryKind::Dir
            } else if value.contains("file") {
                EntryKind::File
            } else {
                EntryKind::Link
            };
        } else if key.eq_ignore_ascii_case("size") {
            size = value.parse().ok();
        } else if key.eq_ignore_ascii_case("modify") {
            modified = parse_modify(value);
        }
    }

    Some(DirEntry {
        name: name.to_string(),
        kind,
        size,
        modified,
    })
}

/// `YYYYMMDDHHMMSS` with optional fractional seconds
fn parse_modify(value: &str) -> Option<NaiveDateTime> {
    let whole = value.split('.').next()?;
    NaiveDateTime::parse_from_str(whole, "%Y%m%d%H%M%S").ok()
}
