use std::collections::HashMap;

use async_trait::async_trait;

use crate::types::RuleMsg;

/// Multi-valued, header-like key/value view over a message envelope.
///
/// Keys are stored verbatim; no canonicalisation is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: HashMap<String, Vec<String>>,
}

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all values of `key` with a single `value`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), vec![value.into()]);
    }

    /// Appends `value` to the values of `key`.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.entry(key.into()).or_default().push(value.into());
    }

    /// Returns the first value of `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    #[must_use]
    pub fn values(&self, key: &str) -> &[String] {
        self.entries.get(key).map_or(&[], Vec::as_slice)
    }

    pub fn del(&mut self, key: &str) {
        self.entries.remove(key);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One direction of an exchange: the inbound request or the outbound response.
///
/// Transports implement this over their native connection type. Methods that
/// have no meaning for a transport (status codes on a raw stream, path
/// parameters) are no-ops there.
#[async_trait]
pub trait Message: Send + Sync {
    fn body(&self) -> &[u8];

    /// Replaces the body. Response implementations also write it to the peer.
    async fn set_body(&mut self, body: Vec<u8>);

    fn headers(&mut self) -> &mut Headers;

    /// Address of the remote peer, or an empty string when unknown.
    fn from(&self) -> String;

    fn get_param(&self, key: &str) -> String;

    fn set_msg(&mut self, msg: RuleMsg);

    /// Returns the domain message, building it first where the transport
    /// supports lazy construction.
    fn get_msg(&mut self) -> Option<&mut RuleMsg>;

    fn set_status_code(&mut self, status_code: u16);

    fn set_error(&mut self, err: anyhow::Error);

    /// Last error recorded on this envelope.
    fn get_error(&self) -> Option<&anyhow::Error>;
}

/// Inbound and outbound envelopes for one dispatch.
///
/// Handed by reference to every matched route; processors must not keep it
/// past the call.
pub struct Exchange {
    pub in_msg: Box<dyn Message>,
    pub out_msg: Box<dyn Message>,
}

impl Exchange {
    #[must_use]
    pub fn new(in_msg: Box<dyn Message>, out_msg: Box<dyn Message>) -> Self {
        Self { in_msg, out_msg }
    }
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("from", &self.in_msg.from())
            .field("in_len", &self.in_msg.body().len())
            .finish_non_exhaustive()
    }
}
