//! Addressed responses and notifications on the outbound queue.

use crate::error::RpcError;
use crate::queue::{OutboundMessage, OutboundSender};
use log::{debug, error};
use serde_json::Value;
use shared::{codec, rpc, ClientId, ErrorCode, JsonBuilder, Notification, RequestId};

/// Serializes envelopes and enqueues them for the transport.
///
/// Sending never fails from the caller's point of view. When the transport is
/// gone the message is dropped, like any other undeliverable frame.
#[derive(Debug, Clone)]
pub struct Outbox {
    sender: OutboundSender,
}

impl Outbox {
    pub fn new(sender: OutboundSender) -> Self {
        Self { sender }
    }

    pub fn send_text(&self, client_id: ClientId, text: String) {
        if self
            .sender
            .send(OutboundMessage { client_id, text })
            .is_err()
        {
            debug!("Outbound queue closed, dropping message for {}", client_id);
        }
    }

    pub fn send_document(&self, client_id: ClientId, document: &Value) {
        self.send_text(client_id, codec::to_text(document));
    }

    pub fn send_error(
        &self,
        client_id: ClientId,
        code: ErrorCode,
        data: Option<&str>,
        id: Option<RequestId>,
    ) {
        let mut builder = JsonBuilder::new();
        builder
            .begin_object()
            .named_value("jsonrpc", rpc::JSONRPC_VERSION)
            .begin_named_object("error")
            .named_value("code", code.code())
            .named_value("message", code.message());
        if let Some(data) = data {
            builder.named_value("data", data);
        }
        builder
            .end_object()
            .named_value("id", id.map_or(Value::Null, Value::from))
            .end_object();

        match builder.finish_text() {
            Ok(text) => self.send_text(client_id, text),
            Err(e) => error!("Dropping error response for {}: {}", client_id, e),
        }
    }

    pub fn send_rpc_error(&self, client_id: ClientId, error: &RpcError, id: Option<RequestId>) {
        self.send_error(client_id, error.code(), Some(&error.data()), id);
    }

    pub fn send_result(&self, client_id: ClientId, result: Value, id: Option<RequestId>) {
        self.send_document(client_id, &rpc::result(result, id));
    }

    pub fn send_notification(&self, client_id: ClientId, notification: &Notification) {
        self.send_text(client_id, notification.to_text());
    }
}
