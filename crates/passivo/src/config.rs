//! Server configuration from the environment and command line.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Where the ledger and record snapshots live. `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    /// If true, ignore SIGTERM and wait for explicit /shutdown or SIGINT.
    pub await_explicit_shutdown: bool,
    pub deployment: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            data_dir: None,
            await_explicit_shutdown: false,
            deployment: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{flag} requires a value")]
    MissingValue { flag: String },
    #[error("invalid port '{0}'")]
    InvalidPort(String),
    #[error("unknown flag: {0}")]
    UnknownFlag(String),
    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),
    #[error("help requested")]
    Help,
}

fn parse_port(value: &str) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidPort(value.to_string()))
}

/// Step past the flag at `args[*i]` and return its value.
fn flag_value(args: &[String], i: &mut usize) -> Result<String, ConfigError> {
    let flag = &args[*i];
    *i += 1;
    args.get(*i).cloned().ok_or_else(|| ConfigError::MissingValue {
        flag: flag.clone(),
    })
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim().to_string();
    (!value.is_empty()).then_some(value)
}

impl ServerConfig {
    /// Defaults overridden by `PASSIVO_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(host) = lookup("PASSIVO_HOST").and_then(non_empty) {
            config.host = host;
        }
        if let Some(port) = lookup("PASSIVO_PORT").and_then(non_empty) {
            config.port = parse_port(&port)?;
        }
        if let Some(dir) = lookup("PASSIVO_DATA_DIR").and_then(non_empty) {
            config.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(flag) = lookup("PASSIVO_AWAIT_EXPLICIT_SHUTDOWN") {
            config.await_explicit_shutdown = matches!(flag.trim(), "1" | "true" | "yes");
        }
        config.deployment = lookup("PASSIVO_DEPLOYMENT").and_then(non_empty);
        Ok(config)
    }

    /// Apply command-line flags on top of `self`. `args[0]` is the program name.
    pub fn with_args(mut self, args: &[String]) -> Result<Self, ConfigError> {
        let mut i = 1; // skip argv[0]
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--host" => self.host = flag_value(args, &mut i)?,
                "--port" => self.port = parse_port(&flag_value(args, &mut i)?)?,
                "--data-dir" => self.data_dir = Some(PathBuf::from(flag_value(args, &mut i)?)),
                "--deployment" => self.deployment = non_empty(flag_value(args, &mut i)?),
                "--await-explicit-shutdown" => self.await_explicit_shutdown = true,
                "--help" | "-h" => return Err(ConfigError::Help),
                arg if arg.starts_with('-') => return Err(ConfigError::UnknownFlag(arg.to_string())),
                arg => return Err(ConfigError::UnexpectedArgument(arg.to_string())),
            }
            i += 1;
        }
        Ok(self)
    }
}
