//! Net endpoint configuration and its decoding from a loose configuration bag.

use std::time::Duration;

use rulego_core::Configuration;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol used when none is configured.
pub const DEFAULT_PROTOCOL: &str = "tcp";
/// Bind address used when none is configured.
pub const DEFAULT_SERVER: &str = ":6335";
/// Idle read timeout in seconds used when none is configured.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 60;
/// Longest frame, in bytes, accepted before the connection is dropped.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 64 * 1024;
/// Extra time the idle timer waits beyond the read timeout.
pub const IDLE_GRACE: Duration = Duration::from_secs(5);

/// Structured configuration for the net endpoint.
///
/// Keys in the configuration bag are the camelCase field names:
/// `protocol`, `server`, `readTimeout`, `maxFrameLength`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetConfig {
    /// Transport: `tcp`, `tcp4`, `tcp6` or `unix`.
    pub protocol: String,
    /// Bind address, `host:port` for TCP or a socket path for `unix`.
    /// An empty host binds all interfaces.
    pub server: String,
    /// Idle read timeout in seconds. 0 disables idle disconnection.
    pub read_timeout: u64,
    /// Frame size limit in bytes. 0 means unbounded.
    pub max_frame_length: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            protocol: DEFAULT_PROTOCOL.to_string(),
            server: DEFAULT_SERVER.to_string(),
            read_timeout: DEFAULT_READ_TIMEOUT_SECS,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

impl NetConfig {
    /// Overlays the recognised keys of `configuration` onto this config.
    ///
    /// Unrecognised keys are ignored. An empty protocol falls back to
    /// [`DEFAULT_PROTOCOL`].
    ///
    /// # Errors
    ///
    /// Returns an error if a recognised key holds a value of the wrong type,
    /// e.g. a string for `readTimeout` or a negative number.
    pub fn merge(&self, configuration: &Configuration) -> Result<Self, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(fields) = &mut value {
            for (key, v) in configuration {
                if let Some(slot) = fields.get_mut(key) {
                    *slot = v.clone();
                }
            }
        }

        let mut merged: Self = serde_json::from_value(value)?;
        if merged.protocol.is_empty() {
            merged.protocol = DEFAULT_PROTOCOL.to_string();
        }
        Ok(merged)
    }

    /// Read deadline per frame, or `None` when idle disconnection is off.
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.read_timeout > 0).then(|| Duration::from_secs(self.read_timeout))
    }

    /// Time without a successful frame after which the connection is closed.
    #[must_use]
    pub fn idle_deadline(&self) -> Duration {
        Duration::from_secs(self.read_timeout).saturating_add(IDLE_GRACE)
    }

    #[must_use]
    pub fn frame_limit(&self) -> usize {
        if self.max_frame_length == 0 {
            usize::MAX
        } else {
            self.max_frame_length
        }
    }

    /// Address handed to the OS, with an empty host expanded to the
    /// wildcard address of the protocol's family.
    #[must_use]
    pub fn bind_address(&self) -> String {
        if !self.server.starts_with(':') {
            return self.server.clone();
        }
        match self.protocol.as_str() {
            "tcp6" => format!("[::]{}", self.server),
            _ => format!("0.0.0.0{}", self.server),
        }
    }
}
