use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Error, ErrorKind};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the staging directory
pub const STAGING_DIR_ENV: &str = "FTPFS_STAGING_DIR";

/// Connection parameters of one FTP session
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    /// FTP server IP/hostname
    pub host: String,
    /// FTP server port (JSON field: port, default 21)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login name (default: anonymous)
    #[serde(default = "default_user")]
    pub user: String,
    /// Login password, never printed by Debug
    #[serde(default = "default_password")]
    pub password: SecretString,
    /// TCP connect and control reply timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Deadline for every data-channel chunk write in seconds
    #[serde(default = "default_data_timeout")]
    pub data_timeout_secs: u64,
    /// Directory for staging files (default: $FTPFS_STAGING_DIR, then the system temp dir)
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
}

fn default_port() -> u16 {
    21
}

fn default_user() -> String {
    "anonymous".to_string()
}

fn default_password() -> SecretString {
    SecretString::new("anonymous@".to_string())
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_data_timeout() -> u64 {
    2
}

impl SessionConfig {
    pub fn new(host: &str, port: u16, user: &str, password: &str) -> Self {
        SessionConfig {
            host: host.to_string(),
            port,
            user: user.to_string(),
            password: SecretString::new(password.to_string()),
            connect_timeout_secs: default_connect_timeout(),
            data_timeout_secs: default_data_timeout(),
            staging_dir: None,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn data_timeout(&self) -> Duration {
        Duration::from_secs(self.data_timeout_secs.max(1))
    }

    /// Directory holding staging files for this session
    pub fn staging_dir(&self) -> PathBuf {
        if let Some(dir) = &self.staging_dir {
            return dir.clone();
        }
        match std::env::var_os(STAGING_DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => std::env::temp_dir(),
        }
    }

    /// Checks fields serde cannot validate on its own
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("host must not be empty".to_string());
        }
        if self.port == 0 {
            return Err("port must be between 1 and 65535".to_string());
        }
        Ok(())
    }
}

/// One file to upload: a session plus the local and remote names
#[derive(Debug, Deserialize)]
pub struct UploadJob {
    #[serde(flatten)]
    pub session: SessionConfig,
    /// Local file to read
    pub local: PathBuf,
    /// Remote name to store as
    pub remote: String,
}

/// Reads a JSONL file into a vector of records
///
/// Empty lines and lines starting with `#` are skipped. Errors carry the
/// 1-based line number of the offending record.
///
/// # Errors
/// - File not found or unreadable
/// - Invalid JSON format or missing required fields
pub fn parse_jsonl<T: DeserializeOwned>(filename: &str) -> Result<Vec<(usize, T)>, Error> {
    let file = File::open(filename)?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let record: T = serde_json::from_str(line).map_err(|e| {
            Error::new(
                ErrorKind::InvalidInput,
                format!("invalid JSON on line {}: {}", line_num + 1, e),
            )
        })?;
        records.push((line_num + 1, record));
    }

    Ok(records)
}

/// Parses an upload job file into a vector of UploadJob structs
///
/// # File Format
/// JSONL format - one JSON object per line with fields:
/// host, port, user, password, connect_timeout_secs, data_timeout_secs,
/// staging_dir, local, remote
///
/// # Example
/// ```text
/// // let jobs = parse_upload_jobs("uploads.jsonl")?;
/// ```
pub fn parse_upload_jobs(filename: &str) -> Result<Vec<UploadJob>, Error> {
    let mut jobs = Vec::new();
    for (line_num, job) in parse_jsonl::<UploadJob>(filename)? {
        job.session.validate().map_err(|e| {
            Error::new(
                ErrorKind::InvalidInput,
                format!("invalid session on line {}: {}", line_num, e),
            )
        })?;
        if job.remote.trim().is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("empty remote name on line {}", line_num),
            ));
        }
        jobs.push(job);
    }
    Ok(jobs)
}
