use core::fmt::{self, Debug, Formatter};
use std::time::Duration;

use serde::Deserialize;

mod defaults {
    pub const fn port() -> u16 {
        25
    }

    pub fn helo_name() -> String {
        String::from("localhost")
    }

    pub const fn timeout_secs() -> u64 {
        30
    }
}

/// Upper bound on the watchdog, one day.
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Where and how to submit mail.
///
/// A copy is taken when a transmission starts, so reconfiguring a client
/// never affects a send that is already running.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Server host name. Empty means "not configured".
    #[serde(default)]
    pub host: String,

    #[serde(default = "defaults::port")]
    pub port: u16,

    /// AUTH LOGIN user. Authentication is skipped when this is empty.
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Connect with TLS already active (implicit TLS, usually port 465).
    #[serde(default)]
    pub use_ssl: bool,

    /// Upgrade the plaintext session with STARTTLS after the first EHLO.
    /// Ignored when `use_ssl` is set.
    #[serde(default)]
    pub use_tls: bool,

    /// Name announced with EHLO.
    #[serde(default = "defaults::helo_name")]
    pub helo_name: String,

    /// Length of the watchdog covering the whole exchange. Clamped to
    /// `1..=MAX_TIMEOUT_SECS` when used.
    #[serde(default = "defaults::timeout_secs")]
    pub timeout_secs: u64,

    /// Skip certificate verification. Only meant for test servers.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: defaults::port(),
            username: String::new(),
            password: String::new(),
            use_ssl: false,
            use_tls: false,
            helo_name: defaults::helo_name(),
            timeout_secs: defaults::timeout_secs(),
            accept_invalid_certs: false,
        }
    }
}

impl ServerConfig {
    /// Creates a configuration for `host:port` with every other option at its
    /// default.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    #[must_use]
    pub const fn with_ssl(mut self, use_ssl: bool) -> Self {
        self.use_ssl = use_ssl;
        self
    }

    #[must_use]
    pub const fn with_starttls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    #[must_use]
    pub fn with_helo_name(mut self, helo_name: impl Into<String>) -> Self {
        self.helo_name = helo_name.into();
        self
    }

    /// Sets the watchdog, rounded up to whole seconds.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let partial = u64::from(timeout.subsec_nanos() > 0);
        self.timeout_secs = timeout.as_secs().saturating_add(partial);
        self
    }

    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Whether a server has been configured at all.
    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty()
    }

    /// Whether STARTTLS should be negotiated. Implicit TLS wins over STARTTLS.
    pub const fn wants_starttls(&self) -> bool {
        self.use_tls && !self.use_ssl
    }

    /// Whether AUTH LOGIN should be performed.
    pub fn wants_auth(&self) -> bool {
        !self.username.is_empty()
    }

    /// The watchdog length, never zero and never more than a day.
    pub fn watchdog(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.clamp(1, MAX_TIMEOUT_SECS))
    }

    /// `host:port`, for logging.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Debug for ServerConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("use_ssl", &self.use_ssl)
            .field("use_tls", &self.use_tls)
            .field("helo_name", &self.helo_name)
            .field("timeout_secs", &self.timeout_secs)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}
