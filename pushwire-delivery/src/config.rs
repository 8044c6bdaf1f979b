//! Configuration for the gateway connection and the delivery engine.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;

/// Everything needed to open one TLS connection to the gateway.
///
/// Consumed verbatim by [`GatewayConnector`](crate::GatewayConnector).
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,

    /// PEM client certificate chain. May also contain the private key.
    pub certificate: String,

    /// Passphrase for an encrypted PKCS#8 private key; empty when the key is
    /// stored in the clear.
    pub certificate_passphrase: String,

    /// PEM private key, when it is not bundled with `certificate`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,

    /// How long to wait for an error response after each write.
    ///
    /// Default: 100 milliseconds
    #[serde(default = "defaults::select_timeout_ms")]
    pub select_timeout_ms: u64,

    /// Default: 30 seconds
    #[serde(default = "defaults::connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Skip validation of the gateway's certificate.
    ///
    /// **SECURITY WARNING**: only for test gateways with self-signed
    /// certificates.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl ConnectionConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        certificate: impl Into<String>,
        certificate_passphrase: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            certificate: certificate.into(),
            certificate_passphrase: certificate_passphrase.into(),
            private_key: None,
            select_timeout_ms: defaults::select_timeout_ms(),
            connect_timeout_secs: defaults::connect_timeout_secs(),
            accept_invalid_certs: false,
        }
    }

    /// `host:port`, as dialled.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub const fn select_timeout(&self) -> Duration {
        Duration::from_millis(self.select_timeout_ms)
    }

    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// # Errors
    ///
    /// Returns [`DeliveryError::InvalidConfig`] if `connect_timeout_secs` is
    /// zero, which would time out every connect before it starts.
    pub fn validate(&self) -> Result<(), DeliveryError> {
        if self.connect_timeout_secs == 0 {
            return Err(DeliveryError::InvalidConfig(
                "connect_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("certificate", &"<pem>")
            .field("certificate_passphrase", &"<redacted>")
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("select_timeout_ms", &self.select_timeout_ms)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

/// When to give up on a message, and on the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FailurePolicy {
    /// Messages given up on in a row before the run stops.
    ///
    /// Default: 10
    #[serde(default = "defaults::consecutive_failure_limit")]
    pub consecutive_failure_limit: u32,

    /// Failed writes of one message before it is given up on.
    ///
    /// Default: 3
    #[serde(default = "defaults::exception_limit")]
    pub exception_limit: u32,

    /// Pause after a failed write. `0` disables the pause.
    ///
    /// Default: 1000 milliseconds
    #[serde(default = "defaults::sleep_on_exception_ms")]
    pub sleep_on_exception_ms: u64,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            consecutive_failure_limit: defaults::consecutive_failure_limit(),
            exception_limit: defaults::exception_limit(),
            sleep_on_exception_ms: defaults::sleep_on_exception_ms(),
        }
    }
}

impl FailurePolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn sleep_on_exception(&self) -> Duration {
        Duration::from_millis(self.sleep_on_exception_ms)
    }

    /// `true` once `exception_count` failed writes have been seen for the
    /// current message.
    pub const fn exception_limit_reached(&self, exception_count: u32) -> bool {
        exception_count >= self.exception_limit
    }

    /// `true` while the run may keep going.
    pub const fn should_continue(&self, consecutive_failure_count: u32) -> bool {
        consecutive_failure_count < self.consecutive_failure_limit
    }

    /// # Errors
    ///
    /// Returns [`DeliveryError::InvalidConfig`] if either limit is zero.
    pub fn validate(&self) -> Result<(), DeliveryError> {
        if self.consecutive_failure_limit == 0 {
            return Err(DeliveryError::InvalidConfig(
                "consecutive_failure_limit must be at least 1".to_string(),
            ));
        }
        if self.exception_limit == 0 {
            return Err(DeliveryError::InvalidConfig(
                "exception_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Complete configuration for one delivery run.
///
/// ```toml
/// [connection]
/// host = "gateway.push.apple.com"
/// port = 2195
/// certificate = """
/// -----BEGIN CERTIFICATE-----
/// ...
/// """
/// certificate_passphrase = ""
///
/// [policy]
/// exception_limit = 5
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeliveryConfig {
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub policy: FailurePolicy,
}

impl DeliveryConfig {
    pub fn new(connection: ConnectionConfig) -> Self {
        Self {
            connection,
            policy: FailurePolicy::default(),
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::InvalidConfig`] on unknown keys, missing
    /// required keys, or values rejected by [`DeliveryConfig::validate`].
    pub fn from_toml(content: &str) -> Result<Self, DeliveryError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`DeliveryError::InvalidConfig`] if the connection or the
    /// policy is invalid.
    pub fn validate(&self) -> Result<(), DeliveryError> {
        self.connection.validate()?;
        self.policy.validate()
    }
}

mod defaults {
    pub const fn select_timeout_ms() -> u64 {
        100
    }

    pub const fn connect_timeout_secs() -> u64 {
        30
    }

    pub const fn consecutive_failure_limit() -> u32 {
        10
    }

    pub const fn exception_limit() -> u32 {
        3
    }

    pub const fn sleep_on_exception_ms() -> u64 {
        1000
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const MINIMAL: &str = r#"
        [connection]
        host = "gateway.push.apple.com"
        port = 2195
        certificate = "pem"
        certificate_passphrase = ""
    "#;

    #[test]
    fn test_defaults() {
        let config = DeliveryConfig::from_toml(MINIMAL).unwrap();

        assert_eq!(config.policy, FailurePolicy::default());
        assert_eq!(config.policy.consecutive_failure_limit, 10);
        assert_eq!(config.policy.exception_limit, 3);
        assert_eq!(config.policy.sleep_on_exception(), Duration::from_secs(1));
        assert_eq!(config.connection.select_timeout(), Duration::from_millis(100));
        assert_eq!(config.connection.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.connection.address(), "gateway.push.apple.com:2195");
        assert!(!config.connection.accept_invalid_certs);
    }

    #[test]
    fn test_policy_overrides() {
        let config = DeliveryConfig::from_toml(&format!(
            "{MINIMAL}\n[policy]\nexception_limit = 5\nsleep_on_exception_ms = 0\n"
        ))
        .unwrap();

        assert_eq!(config.policy.exception_limit, 5);
        assert_eq!(config.policy.consecutive_failure_limit, 10);
        assert!(config.policy.sleep_on_exception().is_zero());
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let result = DeliveryConfig::from_toml(&MINIMAL.replace("port", "foobar = 1\nport"));

        assert!(matches!(
            result,
            Err(DeliveryError::InvalidConfig(reason)) if reason.contains("foobar")
        ));
    }

    #[test]
    fn test_missing_required_key_is_rejected() {
        let result = DeliveryConfig::from_toml(&MINIMAL.replace("host = \"gateway.push.apple.com\"", ""));

        assert!(matches!(
            result,
            Err(DeliveryError::InvalidConfig(reason)) if reason.contains("host")
        ));
    }

    #[test]
    fn test_missing_connection_is_rejected() {
        let result = DeliveryConfig::from_toml("[policy]\nexception_limit = 2\n");

        assert!(matches!(
            result,
            Err(DeliveryError::InvalidConfig(reason)) if reason.contains("connection")
        ));
    }

    #[test]
    fn test_zero_limits_are_rejected() {
        let policy = FailurePolicy {
            exception_limit: 0,
            ..FailurePolicy::default()
        };
        assert!(policy.validate().is_err());

        let policy = FailurePolicy {
            consecutive_failure_limit: 0,
            ..FailurePolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_zero_connect_timeout_is_rejected() {
        let result = DeliveryConfig::from_toml(&MINIMAL.replace(
            "certificate_passphrase = \"\"",
            "certificate_passphrase = \"\"\nconnect_timeout_secs = 0",
        ));

        assert!(matches!(
            result,
            Err(DeliveryError::InvalidConfig(reason)) if reason.contains("connect_timeout_secs")
        ));

        let mut connection = ConnectionConfig::new("localhost", 2195, "pem", "");
        assert!(connection.validate().is_ok());
        connection.connect_timeout_secs = 0;
        assert!(DeliveryConfig::new(connection).validate().is_err());
    }

    #[test]
    fn test_policy_predicates() {
        let policy = FailurePolicy::default();

        assert!(!policy.exception_limit_reached(2));
        assert!(policy.exception_limit_reached(3));
        assert!(policy.should_continue(9));
        assert!(!policy.should_continue(10));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = ConnectionConfig::new("localhost", 2195, "pem", "hunter2");
        config.private_key = Some("secret key".to_string());
        let debug = format!("{config:?}");

        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("secret key"));
        assert!(debug.contains("localhost"));
    }
}
