//! Configuration for the softphone orchestration layer
//!
//! All configuration is an immutable input to component construction: the
//! orchestrator never mutates its config after `ClientManager::new`. Changing
//! credentials or the socket address requires a transport reinitialization
//! (`ClientManager::reconnect`), which discards the previous transport instance.
//!
//! # Examples
//!
//! ```rust
//! use softline_core::config::ClientConfig;
//!
//! let config = ClientConfig::new("wss://sip.example.com:7443", "alice", "secret")
//!     .with_realm("example.com")
//!     .with_max_concurrent_calls(2)
//!     .with_auto_register(false);
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.max_concurrent_calls, 2);
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ClientError, ClientResult};

/// Transport mode used to send DTMF tones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DtmfMode {
    /// In-band RTP telephone events (RFC 2833 / RFC 4733)
    Rfc2833,
    /// SIP INFO messages
    SipInfo,
}

impl Default for DtmfMode {
    fn default() -> Self {
        DtmfMode::Rfc2833
    }
}

/// Options for an unregister request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnregisterOptions {
    /// Remove all bindings for the address of record, not just this contact
    pub all: bool,
    /// Extra SIP headers appended to the REGISTER request
    pub extra_headers: Vec<String>,
}

/// Configuration for the SIP softphone client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Signaling socket address (WebSocket URL of the SIP proxy/registrar)
    pub socket_address: String,
    /// SIP user address of record
    pub sip_user: String,
    /// Authentication password
    pub password: String,
    /// Authentication realm (optional, derived from the user URI otherwise)
    pub realm: Option<String>,
    /// Display name presented to remote parties
    pub display_name: Option<String>,
    /// Register automatically as soon as the line connects
    pub auto_register: bool,
    /// ICE server URLs, read by the embedder when constructing its media engine
    pub ice_servers: Vec<String>,
    /// Maximum number of concurrent calls admitted
    pub max_concurrent_calls: usize,
    /// Extra SIP headers per method name (e.g. "INVITE", "REGISTER")
    pub extra_headers: HashMap<String, Vec<String>>,
    /// Session timer expiry in seconds
    pub session_timer_expiry: u32,
    /// DTMF transport mode
    pub dtmf_mode: DtmfMode,
    /// User agent string
    pub user_agent: String,
}

impl ClientConfig {
    /// Create a new configuration with defaults for everything but the
    /// connection essentials
    pub fn new(
        socket_address: impl Into<String>,
        sip_user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            socket_address: socket_address.into(),
            sip_user: sip_user.into(),
            password: password.into(),
            realm: None,
            display_name: None,
            auto_register: false,
            ice_servers: Vec::new(),
            max_concurrent_calls: 4,
            extra_headers: HashMap::new(),
            session_timer_expiry: 1800,
            dtmf_mode: DtmfMode::default(),
            user_agent: concat!("softline-core/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    /// Set the authentication realm
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Set the display name
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Enable or disable automatic registration on connect
    pub fn with_auto_register(mut self, auto_register: bool) -> Self {
        self.auto_register = auto_register;
        self
    }

    /// Set the ICE server list
    pub fn with_ice_servers(mut self, servers: Vec<String>) -> Self {
        self.ice_servers = servers;
        self
    }

    /// Set the maximum number of concurrent calls
    pub fn with_max_concurrent_calls(mut self, max: usize) -> Self {
        self.max_concurrent_calls = max;
        self
    }

    /// Append extra SIP headers for a given method
    pub fn with_extra_headers(mut self, method: impl Into<String>, headers: Vec<String>) -> Self {
        self.extra_headers.insert(method.into(), headers);
        self
    }

    /// Set the session timer expiry in seconds
    pub fn with_session_timer_expiry(mut self, seconds: u32) -> Self {
        self.session_timer_expiry = seconds;
        self
    }

    /// Set the DTMF transport mode
    pub fn with_dtmf_mode(mut self, mode: DtmfMode) -> Self {
        self.dtmf_mode = mode;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Extra headers configured for a given SIP method
    pub fn headers_for(&self, method: &str) -> &[String] {
        self.extra_headers.get(method).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Load a configuration from a JSON document
    pub fn from_json_str(json: &str) -> ClientResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ClientError::configuration(format!("invalid config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable
    ///
    /// Fails with a configuration error for missing credentials, a malformed
    /// socket address or a zero call capacity.
    pub fn validate(&self) -> ClientResult<()> {
        if self.sip_user.trim().is_empty() {
            return Err(ClientError::configuration("sip_user must not be empty"));
        }
        if self.password.is_empty() {
            return Err(ClientError::configuration("password must not be empty"));
        }
        let url = Url::parse(&self.socket_address)
            .map_err(|e| ClientError::configuration(format!("invalid socket_address: {e}")))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ClientError::configuration(format!(
                "socket_address must be a ws:// or wss:// URL, got {}",
                url.scheme()
            )));
        }
        if self.max_concurrent_calls == 0 {
            return Err(ClientError::configuration("max_concurrent_calls must be at least 1"));
        }
        Ok(())
    }
}
