//! Run configuration read from the process environment.

use std::collections::HashMap;

use crate::cluster::ClusterAddress;

pub const CLUSTER_HOST_VAR: &str = "RAY_HEAD_SERVICE_HOST";
pub const CLUSTER_PORT_VAR: &str = "RAY_HEAD_SERVICE_PORT";
pub const USER_VAR: &str = "DOMINO_STARTING_USERNAME";

pub const NOTIFY_ENABLED_VAR: &str = "TRAINING_NOTIFY_ENABLED";
pub const API_KEY_VAR: &str = "DOMINO_USER_API_KEY";
pub const PROJECT_NAME_VAR: &str = "DOMINO_PROJECT_NAME";
pub const PROJECT_OWNER_VAR: &str = "DOMINO_PROJECT_OWNER";
pub const API_HOST_VAR: &str = "DOMINO_API_HOST";
pub const SMTP_RELAY_VAR: &str = "TRAINING_NOTIFY_SMTP_RELAY";
pub const MAIL_FROM_VAR: &str = "TRAINING_NOTIFY_FROM";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {name} is not set")]
    Missing { name: &'static str },
    #[error("environment variable {name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Source of configuration values.
pub trait Environment {
    fn var(&self, name: &str) -> Option<String>;

    fn require(&self, name: &'static str) -> Result<String, ConfigError> {
        self.var(name).ok_or(ConfigError::Missing { name })
    }
}

/// The environment of the running process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Head node of the cluster, from `RAY_HEAD_SERVICE_HOST`/`_PORT`.
pub fn cluster_address(env: &impl Environment) -> Result<ClusterAddress, ConfigError> {
    let host = env.require(CLUSTER_HOST_VAR)?;
    let port = env.require(CLUSTER_PORT_VAR)?;
    let port = port.trim().parse::<u16>().map_err(|_| ConfigError::Invalid {
        name: CLUSTER_PORT_VAR,
        value: port.clone(),
        reason: "expected a TCP port number",
    })?;
    Ok(ClusterAddress::new(host.trim(), port))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Names the report file.
    pub user: String,
    /// `None` unless notifications are switched on.
    pub notify: Option<NotifyConfig>,
}

impl RunConfig {
    pub fn from_env(env: &impl Environment) -> Result<Self, ConfigError> {
        let user = env.require(USER_VAR)?;
        let notify = if notify_enabled(env)? {
            Some(NotifyConfig::from_env(env)?)
        } else {
            None
        };
        Ok(Self { user, notify })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyConfig {
    pub api_key: String,
    pub project_owner: String,
    pub project_name: String,
    pub api_host: String,
    pub smtp_relay: String,
    pub from_address: String,
}

impl NotifyConfig {
    pub fn from_env(env: &impl Environment) -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: env.require(API_KEY_VAR)?,
            project_owner: env.require(PROJECT_OWNER_VAR)?,
            project_name: env.require(PROJECT_NAME_VAR)?,
            api_host: env.require(API_HOST_VAR)?,
            smtp_relay: env.require(SMTP_RELAY_VAR)?,
            from_address: env.require(MAIL_FROM_VAR)?,
        })
    }

    /// `owner/name`, the form the project API expects.
    pub fn project(&self) -> String {
        format!("{}/{}", self.project_owner, self.project_name)
    }
}

fn notify_enabled(env: &impl Environment) -> Result<bool, ConfigError> {
    let Some(value) = env.var(NOTIFY_ENABLED_VAR) else {
        return Ok(false);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Ok(false),
        "1" | "true" | "yes" | "on" => Ok(true),
        _ => Err(ConfigError::Invalid {
            name: NOTIFY_ENABLED_VAR,
            value,
            reason: "expected a boolean",
        }),
    }
}
