use std::{fmt, path::PathBuf};

use anyhow::{bail, Context};

use crate::{
    constants::{DEFAULT_HOST, DEFAULT_PORT},
    protocol::Qos,
    router::{AllowAnonymous, CredentialCheck, StaticCredentials},
};

pub const USERNAME_VAR: &str = "MQTT_BROKER_USERNAME";
pub const PASSWORD_VAR: &str = "MQTT_BROKER_PASSWORD";
pub const MAX_QOS_VAR: &str = "MQTT_BROKER_MAX_QOS";

const USAGE: &str = "usage: mqtt-stream-broker [<host> <port> | <port> | <unix socket path>]";

/// Where the broker listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindTarget {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl fmt::Display for BindTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "{host}:{port}"),
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub bind: BindTarget,

    /// Upper bound for the `QoS` granted to subscriptions.
    pub max_granted_qos: Qos,

    /// User name and password every CONNECT must carry. `None` accepts everyone.
    pub credentials: Option<(String, String)>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind: BindTarget::Tcp { host: DEFAULT_HOST.to_string(), port: DEFAULT_PORT },
            max_granted_qos: Qos::AtMostOnce,
            credentials: None,
        }
    }
}

impl BrokerConfig {
    /// Reads the process arguments and environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        Self::from_parts(&args, |name| std::env::var(name).ok())
    }

    /// Builds the configuration from positional arguments and an environment lookup.
    ///
    /// - no argument: default host and port
    /// - `<port>`: default host
    /// - `<path>`: Unix domain socket
    /// - `<host> <port>`
    pub fn from_parts<F>(args: &[String], env: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind = match args {
            [] => BindTarget::Tcp { host: DEFAULT_HOST.to_string(), port: DEFAULT_PORT },
            [single] => match single.parse::<u16>() {
                Ok(port) => BindTarget::Tcp { host: DEFAULT_HOST.to_string(), port },
                Err(_) => BindTarget::Unix(PathBuf::from(single)),
            },
            [host, port] => {
                let port = port.parse().with_context(|| format!("Invalid port: {port}"))?;
                BindTarget::Tcp { host: host.clone(), port }
            }
            _ => bail!("Too many arguments\n{USAGE}"),
        };

        let max_granted_qos = match env(MAX_QOS_VAR) {
            Some(value) => {
                let level: u8 = value
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid {MAX_QOS_VAR}: {value}"))?;
                Qos::from_u8(level)
                    .with_context(|| format!("{MAX_QOS_VAR} must be 0, 1 or 2, got {level}"))?
            }
            None => Qos::AtMostOnce,
        };

        let credentials = match (env(USERNAME_VAR), env(PASSWORD_VAR)) {
            (Some(user_name), password) => Some((user_name, password.unwrap_or_default())),
            (None, Some(_)) => bail!("{PASSWORD_VAR} is set without {USERNAME_VAR}"),
            (None, None) => None,
        };

        Ok(Self { bind, max_granted_qos, credentials })
    }

    pub fn credential_check(&self) -> Box<dyn CredentialCheck> {
        match &self.credentials {
            Some((user_name, password)) => {
                Box::new(StaticCredentials::new(user_name.clone(), password.clone()))
            }
            None => Box::new(AllowAnonymous),
        }
    }
}
