//! One authenticated FTP session
//!
//! A `Session` owns the control channel, the data channel of the operation
//! in progress (if any), the credentials, the detected stat dialect and the
//! last error. The data-phase operations live in `passive`, `listing`,
//! `transfer` and `dialect`; this module handles the lifecycle and the
//! single-command operations.

use crate::config::SessionConfig;
use crate::control::{ControlChannel, LastError};
use crate::dialect::Dialect;
use crate::error::{FsError, Result};
use crate::logging::{log, log_debug};
use crate::reply::{self, Reply};
use crate::transport::{Connector, TcpConnector, Transport};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::Zeroize;

pub struct Session<C: Connector = TcpConnector> {
    pub(crate) host: String,
    pub(crate) user: String,
    pub(crate) password: SecretString,
    pub(crate) connector: C,
    pub(crate) control: ControlChannel<C::Stream>,
    /// Data channel of the operation in progress
    pub(crate) data: Option<C::Stream>,
    /// Port of the most recent passive endpoint
    pub(crate) data_port: u16,
    pub(crate) dialect: Dialect,
    pub(crate) data_timeout: Duration,
    pub(crate) staging_dir: PathBuf,
}

impl Session<TcpConnector> {
    /// Connects over TCP and logs in
    ///
    /// # Example
    /// ```no_run
    /// use ftpfs::{Session, SessionConfig};
    ///
    /// let config = SessionConfig::new("localhost", 2121, "admin", "admin");
    /// let mut session = Session::connect(&config).unwrap();
    /// println!("{}", session.pwd().unwrap());
    /// ```
    pub fn connect(config: &SessionConfig) -> Result<Self> {
        let connector = TcpConnector {
            connect_timeout: config.connect_timeout(),
            read_timeout: Some(config.connect_timeout()),
        };
        Session::connect_with(connector, config)
    }
}

impl<C: Connector> Session<C> {
    /// Connects through `connector`, reads the banner, picks the stat
    /// dialect, authenticates and switches to binary mode
    pub fn connect_with(connector: C, config: &SessionConfig) -> Result<Self> {
        config.validate().map_err(FsError::Config)?;

        let transport = connector.connect(&config.host, config.port)?;
        let mut control = ControlChannel::new(transport, config.connect_timeout());

        let banner = control.read_reply()?;
        if !banner.is_success() {
            control.close();
            return Err(FsError::Protocol {
                code: banner.code,
                message: banner.text,
            });
        }
        let dialect = Dialect::from_banner(&banner.text);
        let _ = log_debug(&format!(
            "{}:{} banner {:?}, stat dialect {:?}",
            config.host,
            config.port,
            banner.first_line(),
            dialect
        ));

        let mut session = Session {
            host: config.host.clone(),
            user: config.user.clone(),
            password: SecretString::new(config.password.expose_secret().clone()),
            connector,
            control,
            data: None,
            data_port: 0,
            dialect,
            data_timeout: config.data_timeout(),
            staging_dir: config.staging_dir(),
        };
        session.login()?;
        Ok(session)
    }

    fn login(&mut self) -> Result<()> {
        let user_reply = self.control.execute(&format!("USER {}", self.user))?;

        // 230 right after USER means no password is needed
        if user_reply.code != 230 {
            let mut command = format!("PASS {}", self.password.expose_secret());
            let result = self.control.execute(&command);
            command.zeroize();
            result?;
        }

        if let Err(e) = self.control.execute("TYPE I") {
            let _ = log(&format!(
                "Warning: {} did not switch to binary mode: {}",
                self.host, e
            ));
        }
        Ok(())
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn data_port(&self) -> u16 {
        self.data_port
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn last_error(&self) -> &LastError {
        self.control.last_error()
    }

    pub fn is_broken(&self) -> bool {
        self.control.is_broken()
    }

    /// Sends an arbitrary command and returns its reply
    pub fn command(&mut self, command: &str) -> Result<Reply> {
        self.close_data();
        self.control.execute(command)
    }

    pub fn cwd(&mut self, name: &str) -> Result<()> {
        self.command(&format!("CWD {}", name)).map(|_| ())
    }

    pub fn mkd(&mut self, name: &str) -> Result<()> {
        self.command(&format!("MKD {}", name)).map(|_| ())
    }

    pub fn rmd(&mut self, name: &str) -> Result<()> {
        self.command(&format!("RMD {}", name)).map(|_| ())
    }

    pub fn dele(&mut self, name: &str) -> Result<()> {
        self.command(&format!("DELE {}", name)).map(|_| ())
    }

    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        self.command(&format!("RNFR {}", from))?;
        self.command(&format!("RNTO {}", to)).map(|_| ())
    }

    pub fn size(&mut self, name: &str) -> Result<u64> {
        let reply = self.command(&format!("SIZE {}", name))?;
        reply::parse_size(reply.data())
    }

    /// Current remote working directory
    pub fn pwd(&mut self) -> Result<String> {
        let reply = self.command("PWD")?;
        reply::parse_quoted_path(reply.data()).ok_or_else(|| {
            FsError::malformed(format!("no quoted path in {:?}", reply.first_line()))
        })
    }

    /// Sends QUIT and releases both channels
    pub fn quit(mut self) -> Result<()> {
        self.shutdown()
    }

    pub(crate) fn close_data(&mut self) {
        if let Some(mut data) = self.data.take() {
            data.close();
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        self.close_data();
        if self.control.is_broken() {
            return Ok(());
        }
        let result = self.control.execute("QUIT").map(|_| ());
        self.control.close();
        result
    }
}

impl<C: Connector> Drop for Session<C> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            let _ = log_debug(&format!("QUIT to {} failed: {}", self.host, e));
        }
    }
}
