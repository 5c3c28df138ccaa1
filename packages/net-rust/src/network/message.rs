//! Request and response envelopes bridging raw frames to the rule pipeline.

use std::fmt;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use rulego_core::{DataType, Headers, Message, Metadata, RuleMsg};

use super::connection::Connection;

/// Header and metadata key carrying the peer address.
pub const REMOTE_ADDR_KEY: &str = "remoteAddr";

/// Log callback a response uses to report on behalf of its endpoint.
pub type LogFn = Arc<dyn Fn(fmt::Arguments<'_>) + Send + Sync>;

/// Errors recorded on an envelope when writing to the peer fails.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("write err: connection is nil")]
    ConnectionNil,
    #[error("write err: connection is closed")]
    ConnectionClosed,
    #[error("write err: {0}")]
    Io(#[from] io::Error),
}

fn remote_headers<'a>(headers: &'a mut Option<Headers>, conn: Option<&Connection>) -> &'a mut Headers {
    let headers = headers.get_or_insert_with(Headers::new);
    if let Some(conn) = conn {
        headers.set(REMOTE_ADDR_KEY, conn.remote_addr());
    }
    headers
}

/// One inbound frame.
#[derive(Default)]
pub struct RequestMessage {
    headers: Option<Headers>,
    conn: Option<Arc<Connection>>,
    body: Vec<u8>,
    msg: Option<RuleMsg>,
    err: Option<anyhow::Error>,
}

impl RequestMessage {
    #[must_use]
    pub fn new(conn: Option<Arc<Connection>>, body: Vec<u8>) -> Self {
        Self {
            conn,
            body,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn conn(&self) -> Option<&Arc<Connection>> {
        self.conn.as_ref()
    }
}

#[async_trait]
impl Message for RequestMessage {
    fn body(&self) -> &[u8] {
        &self.body
    }

    async fn set_body(&mut self, body: Vec<u8>) {
        self.body = body;
    }

    fn headers(&mut self) -> &mut Headers {
        remote_headers(&mut self.headers, self.conn.as_deref())
    }

    fn from(&self) -> String {
        self.conn
            .as_ref()
            .map_or_else(String::new, |conn| conn.remote_addr().to_string())
    }

    fn get_param(&self, _key: &str) -> String {
        String::new()
    }

    fn set_msg(&mut self, msg: RuleMsg) {
        self.msg = Some(msg);
    }

    /// Builds a text message from the frame on first use, with the peer
    /// address as its type. Later calls return the same message.
    fn get_msg(&mut self) -> Option<&mut RuleMsg> {
        if self.msg.is_none() {
            let data = String::from_utf8_lossy(&self.body).into_owned();
            self.msg = Some(RuleMsg::new(
                0,
                self.from(),
                DataType::Text,
                Metadata::new(),
                data,
            ));
        }
        self.msg.as_mut()
    }

    fn set_status_code(&mut self, _status_code: u16) {}

    fn set_error(&mut self, err: anyhow::Error) {
        self.err = Some(err);
    }

    fn get_error(&self) -> Option<&anyhow::Error> {
        self.err.as_ref()
    }
}

/// Outbound side of an exchange. Setting the body writes it to the peer.
#[derive(Default)]
pub struct ResponseMessage {
    headers: Option<Headers>,
    conn: Option<Arc<Connection>>,
    log: Option<LogFn>,
    body: Vec<u8>,
    msg: Option<RuleMsg>,
    err: Option<anyhow::Error>,
}

impl ResponseMessage {
    #[must_use]
    pub fn new(conn: Option<Arc<Connection>>, log: Option<LogFn>) -> Self {
        Self {
            conn,
            log,
            ..Self::default()
        }
    }

    pub fn printf(&self, args: fmt::Arguments<'_>) {
        if let Some(log) = &self.log {
            log(args);
        }
    }
}

#[async_trait]
impl Message for ResponseMessage {
    fn body(&self) -> &[u8] {
        &self.body
    }

    async fn set_body(&mut self, body: Vec<u8>) {
        let written = match &self.conn {
            Some(conn) => conn.write(&body).await,
            None => Err(MessageError::ConnectionNil),
        };
        self.body = body;
        if let Err(err) = written {
            self.printf(format_args!("net endpoint response {err}"));
            self.set_error(err.into());
        }
    }

    fn headers(&mut self) -> &mut Headers {
        remote_headers(&mut self.headers, self.conn.as_deref())
    }

    fn from(&self) -> String {
        self.conn
            .as_ref()
            .map_or_else(String::new, |conn| conn.remote_addr().to_string())
    }

    fn get_param(&self, _key: &str) -> String {
        String::new()
    }

    fn set_msg(&mut self, msg: RuleMsg) {
        self.msg = Some(msg);
    }

    fn get_msg(&mut self) -> Option<&mut RuleMsg> {
        self.msg.as_mut()
    }

    fn set_status_code(&mut self, _status_code: u16) {}

    fn set_error(&mut self, err: anyhow::Error) {
        self.err = Some(err);
    }

    fn get_error(&self) -> Option<&anyhow::Error> {
        self.err.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use tokio::io::AsyncReadExt;

    use super::*;

    fn capture() -> (LogFn, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let log: LogFn = Arc::new(move |args: fmt::Arguments<'_>| sink.lock().push(args.to_string()));
        (log, lines)
    }

    #[test]
    fn request_without_connection() {
        let mut req = RequestMessage::new(None, b"abc".to_vec());
        assert_eq!(req.from(), "");
        assert!(req.headers().is_empty());
        assert!(req.conn().is_none());
        assert_eq!(req.get_param("id"), "");
    }

    #[tokio::test]
    async fn request_headers_carry_remote_addr() {
        let (server, _client) = tokio::io::duplex(64);
        let (conn, _reader) = Connection::new(server, "10.0.0.1:5000");
        let mut req = RequestMessage::new(Some(conn), b"abc".to_vec());

        req.headers().set(REMOTE_ADDR_KEY, "spoofed");
        req.headers().set("custom", "1");

        let headers = req.headers();
        assert_eq!(headers.get(REMOTE_ADDR_KEY), Some("10.0.0.1:5000"));
        assert_eq!(headers.get("custom"), Some("1"));
    }

    #[tokio::test]
    async fn request_builds_msg_once() {
        let (server, _client) = tokio::io::duplex(64);
        let (conn, _reader) = Connection::new(server, "10.0.0.1:5000");
        let mut req = RequestMessage::new(Some(conn), b"ERR disk full".to_vec());

        let msg = req.get_msg().unwrap();
        assert_eq!(msg.data, "ERR disk full");
        assert_eq!(msg.msg_type, "10.0.0.1:5000");
        assert_eq!(msg.data_type, DataType::Text);
        msg.metadata.put_value("seen", "1");
        let first_id = msg.id.clone();

        let again = req.get_msg().unwrap();
        assert_eq!(again.id, first_id);
        assert_eq!(again.metadata.get_value("seen"), "1");
    }

    #[test]
    fn request_keeps_explicit_msg() {
        let mut req = RequestMessage::new(None, b"frame".to_vec());
        req.set_msg(RuleMsg::new(1, "CUSTOM", DataType::Json, Metadata::new(), "{}"));
        assert_eq!(req.get_msg().unwrap().msg_type, "CUSTOM");
    }

    #[test]
    fn response_never_builds_msg() {
        let mut resp = ResponseMessage::new(None, None);
        assert!(resp.get_msg().is_none());
        resp.set_status_code(500);
        assert!(resp.get_error().is_none());
    }

    #[tokio::test]
    async fn response_set_body_writes_to_connection() {
        let (server, mut client) = tokio::io::duplex(64);
        let (conn, _reader) = Connection::new(server, "peer");
        let mut resp = ResponseMessage::new(Some(conn), None);

        resp.set_body(b"pong\n".to_vec()).await;

        assert!(resp.get_error().is_none());
        assert_eq!(resp.body(), b"pong\n");
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong\n");
    }

    #[tokio::test]
    async fn response_without_connection_records_error() {
        let (log, lines) = capture();
        let mut resp = ResponseMessage::new(None, Some(log));

        resp.set_body(b"lost".to_vec()).await;

        let err = resp.get_error().unwrap();
        assert_eq!(err.to_string(), "write err: connection is nil");
        assert_eq!(resp.body(), b"lost");
        assert_eq!(lines.lock().len(), 1);
    }

    #[tokio::test]
    async fn response_after_close_records_error() {
        let (server, _client) = tokio::io::duplex(64);
        let (conn, _reader) = Connection::new(server, "peer");
        conn.close().await;
        let mut resp = ResponseMessage::new(Some(conn), None);

        resp.set_body(b"late".to_vec()).await;

        let err = resp.get_error().unwrap();
        assert!(matches!(
            err.downcast_ref::<MessageError>(),
            Some(MessageError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn response_headers_and_from() {
        let (server, _client) = tokio::io::duplex(64);
        let (conn, _reader) = Connection::new(server, "[::1]:7000");
        let mut resp = ResponseMessage::new(Some(conn), None);
        assert_eq!(resp.from(), "[::1]:7000");
        assert_eq!(resp.headers().get(REMOTE_ADDR_KEY), Some("[::1]:7000"));
    }
}
