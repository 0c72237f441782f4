//! Client configuration and builder.

use std::time::Duration;

use mikmak_protocol::KnownServer;
use mikmak_transport::{ConnectionTarget, TcpConfig};
use serde::{Deserialize, Serialize};

use crate::{MikmakClient, SessionError};

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Everything the orchestrator needs to log in and stay connected.
///
/// Missing fields fall back to [`Default`] when deserialized, so a JSON
/// config only has to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub username: String,
    pub password: String,

    /// Join the first listed server whose name contains this text.
    /// `None` stops the session once the server list has arrived.
    pub server_to_join: Option<String>,

    /// Pause before each reconnection attempt.
    pub reconnection_delay: Duration,

    /// Reconnection attempts allowed per top-level `connect()`.
    pub max_retries: u32,

    /// Drop rooms nobody is in from room lists.
    pub clean_ingame: bool,

    /// Bootstrap (login server) address.
    pub starting_ip: String,
    pub port: u16,

    /// Liveness interval for socket reads; also bounds each dial.
    pub read_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            server_to_join: Some(KnownServer::Kiwi.name().to_string()),
            reconnection_delay: Duration::from_secs(5),
            max_retries: 2,
            clean_ingame: true,
            starting_ip: "213.8.147.198".to_string(),
            port: 443,
            read_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Checks the fields a connection can't do without.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.username.is_empty() {
            return Err(SessionError::InvalidConfig("username is empty".into()));
        }
        if self.starting_ip.trim().is_empty() {
            return Err(SessionError::InvalidConfig("starting_ip is empty".into()));
        }
        if self.port == 0 {
            return Err(SessionError::InvalidConfig("port is 0".into()));
        }
        if self.read_timeout.is_zero() {
            return Err(SessionError::InvalidConfig("read_timeout is 0".into()));
        }
        Ok(())
    }

    pub fn bootstrap_target(&self) -> ConnectionTarget {
        ConnectionTarget::new(self.starting_ip.clone(), self.port)
    }

    pub fn transport(&self) -> TcpConfig {
        TcpConfig {
            read_timeout: self.read_timeout,
            ..TcpConfig::default()
        }
    }
}

// ---------------------------------------------------------------------------
// ClientBuilder
// ---------------------------------------------------------------------------

/// Builder for a [`MikmakClient`].
///
/// # Example
///
/// ```rust,ignore
/// let mut client = MikmakClient::builder("user", "secret")
///     .server(KnownServer::Krembo)
///     .max_retries(5)
///     .build();
/// let end = client.connect().await?;
/// ```
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            config: ClientConfig {
                username: username.into(),
                password: password.into(),
                ..ClientConfig::default()
            },
        }
    }

    /// Starts from an existing config, e.g. one loaded from JSON.
    pub fn from_config(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Joins a known server.
    pub fn server(self, server: KnownServer) -> Self {
        self.server_to_join(server.name())
    }

    /// Joins the first server whose name contains `name`.
    pub fn server_to_join(mut self, name: impl Into<String>) -> Self {
        self.config.server_to_join = Some(name.into());
        self
    }

    /// Stops after the server list instead of joining a server.
    pub fn no_server(mut self) -> Self {
        self.config.server_to_join = None;
        self
    }

    pub fn reconnection_delay(mut self, delay: Duration) -> Self {
        self.config.reconnection_delay = delay;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn clean_ingame(mut self, clean: bool) -> Self {
        self.config.clean_ingame = clean;
        self
    }

    /// Sets the bootstrap address.
    pub fn bootstrap(mut self, ip: impl Into<String>, port: u16) -> Self {
        self.config.starting_ip = ip.into();
        self.config.port = port;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn build(self) -> MikmakClient {
        MikmakClient::new(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.server_to_join.as_deref(), Some("קיווי"));
        assert_eq!(config.reconnection_delay, Duration::from_secs(5));
        assert_eq!(config.max_retries, 2);
        assert!(config.clean_ingame);
        assert_eq!(config.bootstrap_target().to_string(), "213.8.147.198:443");
        assert_eq!(config.transport().read_timeout, Duration::from_secs(10));
        assert_eq!(config.transport().read_chunk, 8192);
    }

    #[test]
    fn test_builder_setters() {
        let builder = ClientBuilder::new("user", "pw")
            .server(KnownServer::Krembo)
            .max_retries(0)
            .clean_ingame(false)
            .bootstrap("127.0.0.1", 9339)
            .reconnection_delay(Duration::from_millis(10));

        let config = builder.config();
        assert_eq!(config.username, "user");
        assert_eq!(config.password, "pw");
        assert_eq!(config.server_to_join.as_deref(), Some("קרמבו"));
        assert_eq!(config.max_retries, 0);
        assert!(!config.clean_ingame);
        assert_eq!(config.bootstrap_target().to_string(), "127.0.0.1:9339");
        assert_eq!(config.reconnection_delay, Duration::from_millis(10));

        assert_eq!(builder.no_server().config().server_to_join, None);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"username":"u","password":"p","max_retries":7}"#).unwrap();
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.port, 443);
        assert_eq!(config.server_to_join.as_deref(), Some("קיווי"));
    }

    #[test]
    fn test_validate_rejects_unusable_config() {
        assert!(ClientConfig::default().validate().is_err());

        let ok = ClientBuilder::new("u", "p").config().clone();
        assert!(ok.validate().is_ok());

        let no_port = ClientConfig { port: 0, ..ok.clone() };
        let err = no_port.validate().unwrap_err();
        assert!(err.to_string().contains("port"));
    }
}
