use std::path::PathBuf;
use std::time::Duration;

use crate::blocking::{DEFAULT_EXTENDED_TIMEOUT, DEFAULT_POLL_INTERVAL};
use crate::error::RobolinkError;
use crate::launcher::{LaunchConfig, DEFAULT_READY_TIMEOUT};
use crate::session::{Session, DEFAULT_TIMEOUT};

pub const ROBOLINK_HOST_ENV: &str = "ROBOLINK_HOST";
pub const ROBOLINK_PORT_ENV: &str = "ROBOLINK_PORT";
pub const ROBOLINK_LAUNCH_PATH_ENV: &str = "ROBOLINK_LAUNCH_PATH";
pub const ROBOLINK_LAUNCH_ARGS_ENV: &str = "ROBOLINK_LAUNCH_ARGS";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 20500;

/// Values set explicitly by the caller; anything left `None` falls back to
/// the environment and then to the built-in default.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub timeout: Option<Duration>,
    pub extended_timeout: Option<Duration>,
    pub launch_path: Option<PathBuf>,
    pub launch_args: Option<String>,
    pub launch_timeout: Option<Duration>,
    pub poll_interval: Option<Duration>,
}

/// Fully resolved connection settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    /// Read timeout while a blocking command or busy-wait is outstanding.
    pub extended_timeout: Duration,
    /// Process to start when nothing answers on the port.
    pub launch: Option<LaunchConfig>,
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            extended_timeout: DEFAULT_EXTENDED_TIMEOUT,
            launch: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, RobolinkError> {
        Self::resolve(&ConfigOverrides::default())
    }

    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self, RobolinkError> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    /// Resolves every setting as explicit value, then `env`, then default.
    pub fn resolve_with<F>(overrides: &ConfigOverrides, env: F) -> Result<Self, RobolinkError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|value| !value.trim().is_empty());

        let host = overrides
            .host
            .clone()
            .or_else(|| lookup(ROBOLINK_HOST_ENV))
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match overrides.port {
            Some(port) => port,
            None => match lookup(ROBOLINK_PORT_ENV) {
                Some(raw) => parse_port(&raw)?,
                None => DEFAULT_PORT,
            },
        };

        let launch = overrides
            .launch_path
            .clone()
            .or_else(|| lookup(ROBOLINK_LAUNCH_PATH_ENV).map(PathBuf::from))
            .map(|path| {
                let args = overrides
                    .launch_args
                    .clone()
                    .or_else(|| lookup(ROBOLINK_LAUNCH_ARGS_ENV))
                    .unwrap_or_default();
                LaunchConfig::new(path)
                    .args(args)
                    .ready_timeout(overrides.launch_timeout.unwrap_or(DEFAULT_READY_TIMEOUT))
            });

        let config = Self {
            host,
            port,
            timeout: overrides.timeout.unwrap_or(DEFAULT_TIMEOUT),
            extended_timeout: overrides
                .extended_timeout
                .unwrap_or(DEFAULT_EXTENDED_TIMEOUT),
            launch,
            poll_interval: overrides.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), RobolinkError> {
        if self.host.trim().is_empty() {
            return Err(config_error("host must not be empty"));
        }
        if self.port == 0 {
            return Err(config_error("port must not be zero"));
        }
        if self.timeout.is_zero() || self.extended_timeout.is_zero() {
            return Err(config_error("timeouts must be greater than zero"));
        }
        if self.poll_interval.is_zero() {
            return Err(config_error("poll interval must be greater than zero"));
        }
        if let Some(launch) = &self.launch {
            if launch.ready_timeout.is_zero() {
                return Err(config_error("launch ready timeout must be greater than zero"));
            }
        }
        Ok(())
    }

    /// Opens a handshaken session, launching the remote first if configured.
    pub fn connect_session(&self) -> Result<Session, RobolinkError> {
        self.validate()?;
        debug!(address = %self.address(), autostart = self.launch.is_some(), "opening session");
        match &self.launch {
            Some(launch) => Session::connect_or_launch(&self.host, self.port, self.timeout, launch),
            None => Session::connect(&self.host, self.port, self.timeout),
        }
    }
}

fn parse_port(raw: &str) -> Result<u16, RobolinkError> {
    raw.trim().parse::<u16>().map_err(|err| RobolinkError::Config {
        reason: format!("{ROBOLINK_PORT_ENV}=`{raw}` is not a port number: {err}"),
    })
}

fn config_error(reason: &str) -> RobolinkError {
    RobolinkError::Config {
        reason: reason.to_string(),
    }
}
