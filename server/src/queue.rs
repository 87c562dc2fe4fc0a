//! Messages passed between the transport, the broker and the scheduler.
//!
//! All three workers only talk to each other through these small owned values
//! sent over unbounded tokio channels.

use serde_json::Value;
use shared::{ClientId, Tier};
use tokio::sync::mpsc;

/// What happened on a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Raw text frame received from the client.
    Text(String),
    /// The connection is gone. Always the last event of a client.
    Closed,
}

/// Connection event, queued in arrival order for the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub client_id: ClientId,
    pub event: InboundEvent,
}

impl InboundMessage {
    pub fn text(client_id: ClientId, text: impl Into<String>) -> Self {
        Self {
            client_id,
            event: InboundEvent::Text(text.into()),
        }
    }

    pub fn closed(client_id: ClientId) -> Self {
        Self {
            client_id,
            event: InboundEvent::Closed,
        }
    }
}

/// Text frame to be sent to one client.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub client_id: ClientId,
    pub text: String,
}

/// Successfully parsed inbound document.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    pub client_id: ClientId,
    pub document: Value,
}

/// Routing category of a domain method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandTag {
    Command,
    Tier(Tier),
}

/// A request that passed classification.
///
/// For subscriptions the `method` member of `document` has already been
/// rewritten without the tier suffix; the tier lives in `tag`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedCommand {
    pub client_id: ClientId,
    pub tag: CommandTag,
    pub document: Value,
}

impl ClassifiedCommand {
    pub fn method(&self) -> &str {
        shared::rpc::method_of(&self.document).unwrap_or_default()
    }

    pub fn id(&self) -> Option<shared::RequestId> {
        shared::rpc::id_of(&self.document)
    }
}

/// Work items consumed by the simulation scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum SimCommand {
    Execute(ClassifiedCommand),
    Disconnect { client_id: ClientId },
}

pub type InboundSender = mpsc::UnboundedSender<InboundMessage>;
pub type InboundReceiver = mpsc::UnboundedReceiver<InboundMessage>;
pub type OutboundSender = mpsc::UnboundedSender<OutboundMessage>;
pub type OutboundReceiver = mpsc::UnboundedReceiver<OutboundMessage>;
pub type SimSender = mpsc::UnboundedSender<SimCommand>;
pub type SimReceiver = mpsc::UnboundedReceiver<SimCommand>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classified_command_accessors() {
        let command = ClassifiedCommand {
            client_id: ClientId(3),
            tag: CommandTag::Tier(Tier::S1),
            document: json!({"jsonrpc": "2.0", "method": "sub_perf_stats", "id": 8}),
        };
        assert_eq!(command.method(), "sub_perf_stats");
        assert_eq!(command.id(), Some(8));
    }

    #[test]
    fn test_inbound_constructors() {
        let message = InboundMessage::text(ClientId(5), "frame");
        assert_eq!(message.event, InboundEvent::Text("frame".to_string()));
        assert_eq!(
            InboundMessage::closed(ClientId(5)),
            InboundMessage {
                client_id: ClientId(5),
                event: InboundEvent::Closed,
            }
        );
    }

    #[test]
    fn test_channel_communication() {
        let (tx, mut rx) = mpsc::unbounded_channel::<SimCommand>();

        assert!(tx
            .send(SimCommand::Disconnect {
                client_id: ClientId(42)
            })
            .is_ok());

        match rx.try_recv() {
            Ok(SimCommand::Disconnect { client_id }) => assert_eq!(client_id, ClientId(42)),
            other => panic!("Unexpected message {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }
}
