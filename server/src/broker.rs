//! JSON-RPC message broker.
//!
//! Runs on the caller's thread and turns every inbound text frame into
//! exactly one of three things:
//! - an error response (malformed JSON, bad request shape, unknown method),
//! - an inline call from the MAIN table (`cmd_shutdown`),
//! - a [`ClassifiedCommand`] forwarded to the simulation scheduler through
//!   the DOMAIN table.
//!
//! A closed connection arrives on the same queue as its frames and is passed
//! on to the scheduler as a disconnect, behind every command of that client.
//!
//! Classification also strips the frequency tier from subscription methods,
//! so `sub_perf_stats_s1` reaches the scheduler as `sub_perf_stats` tagged
//! with [`Tier::S1`].

use crate::error::{json_type_name, MissingField, ParamKind, RpcError};
use crate::outbox::Outbox;
use crate::queue::{
    ClassifiedCommand, CommandTag, InboundEvent, InboundMessage, OutboundSender, ParsedMessage,
    SimCommand, SimSender,
};
use log::{debug, info, warn};
use serde_json::Value;
use shared::{
    codec, methods, rpc, Channel, ClientId, Tier, PREFIX_COMMAND, PREFIX_SUBSCRIBE,
    PREFIX_UNSUBSCRIBE,
};
use std::collections::HashMap;
use std::time::Duration;

/// Something the broker can stop during `cmd_shutdown`.
pub trait Shutdown: Send {
    fn shutdown(&self);
}

/// Result of [`classify_method`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Runs inline in the broker.
    Main,
    /// Forwarded to the scheduler under the rewritten method name.
    Domain { tag: CommandTag, method: String },
}

/// Sorts a method name into MAIN or DOMAIN and strips the tier suffix.
pub fn classify_method(name: &str) -> Result<Classification, RpcError> {
    if name == methods::SHUTDOWN {
        return Ok(Classification::Main);
    }
    if name.starts_with(PREFIX_COMMAND) {
        return Ok(Classification::Domain {
            tag: CommandTag::Command,
            method: name.to_string(),
        });
    }
    if name.starts_with(PREFIX_SUBSCRIBE) || name.starts_with(PREFIX_UNSUBSCRIBE) {
        let tier = name
            .rsplit_once('_')
            .and_then(|(_, token)| Tier::from_token(token).map(|tier| (token, tier)));
        return match tier {
            Some((token, tier)) => Ok(Classification::Domain {
                tag: CommandTag::Tier(tier),
                method: name[..name.len() - token.len() - 1].to_string(),
            }),
            None => Err(RpcError::UnknownTier {
                method: name.to_string(),
            }),
        };
    }
    Err(RpcError::MethodNotFound {
        method: name.to_string(),
    })
}

/// Checks that a request carries both `method` and `id`.
pub fn validate(document: &Value) -> Result<(), RpcError> {
    let has_method = rpc::method_of(document).is_some();
    let has_id = rpc::has_id(document) && rpc::id_of(document).is_some();
    match (has_method, has_id) {
        (true, true) => Ok(()),
        (true, false) => Err(RpcError::RequestShape(MissingField::Id)),
        (false, true) => Err(RpcError::RequestShape(MissingField::Method)),
        (false, false) => Err(RpcError::RequestShape(MissingField::Both)),
    }
}

/// Positional parameters of a request. A missing `params` member or an
/// empty object count as no parameters.
pub fn positional_params(document: &Value) -> Result<&[Value], RpcError> {
    match rpc::params_of(document) {
        None => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(Value::Object(members)) if members.is_empty() => Ok(&[]),
        Some(other) => Err(RpcError::InvalidParamType {
            position: 0,
            expected: "array",
            received: json_type_name(other),
        }),
    }
}

/// Checks count and type of the positional parameters.
pub fn check_params<'a>(document: &'a Value, expected: &[ParamKind]) -> Result<&'a [Value], RpcError> {
    let params = positional_params(document)?;
    if params.len() != expected.len() {
        return Err(RpcError::InvalidParamCount {
            expected: expected.len().to_string(),
            received: params.len(),
        });
    }
    check_param_types(params, expected.iter().copied())?;
    Ok(params)
}

/// Checks a variable number of parameters that all share one type.
pub fn check_param_range<'a>(
    document: &'a Value,
    min: usize,
    max: usize,
    kind: ParamKind,
) -> Result<&'a [Value], RpcError> {
    let params = positional_params(document)?;
    if params.len() < min || params.len() > max {
        return Err(RpcError::InvalidParamCount {
            expected: format!("{} to {}", min, max),
            received: params.len(),
        });
    }
    check_param_types(params, std::iter::repeat(kind))?;
    Ok(params)
}

fn check_param_types(
    params: &[Value],
    kinds: impl Iterator<Item = ParamKind>,
) -> Result<(), RpcError> {
    for (position, (param, kind)) in params.iter().zip(kinds).enumerate() {
        if !kind.matches(param) {
            return Err(RpcError::InvalidParamType {
                position,
                expected: kind.name(),
                received: json_type_name(param),
            });
        }
    }
    Ok(())
}

pub type MainHandler = fn(&mut MessageBroker, &ParsedMessage) -> Result<Value, RpcError>;
pub type DomainHandler = fn(&MessageBroker, ClassifiedCommand);

pub struct MessageBroker {
    main_actions: HashMap<&'static str, MainHandler>,
    domains: HashMap<&'static str, DomainHandler>,
    outbox: Outbox,
    to_simulation: SimSender,
    simulation: Option<Box<dyn Shutdown>>,
    transport: Option<Box<dyn Shutdown>>,
    shutdown_grace: Duration,
    shut_down: bool,
}

impl MessageBroker {
    pub fn new(outbound: OutboundSender, to_simulation: SimSender) -> Self {
        let mut main_actions: HashMap<&'static str, MainHandler> = HashMap::new();
        main_actions.insert(methods::SHUTDOWN, shutdown_server);

        let mut domains: HashMap<&'static str, DomainHandler> = HashMap::new();
        domains.insert(methods::START_SIMULATION, forward_to_simulation);
        domains.insert(methods::STOP_SIMULATION, forward_to_simulation);
        domains.insert(methods::ACCELERATE_SIMULATION, forward_to_simulation);
        for channel in Channel::ALL {
            domains.insert(channel.subscribe_method(), forward_to_simulation);
            domains.insert(channel.unsubscribe_method(), forward_to_simulation);
        }

        Self {
            main_actions,
            domains,
            outbox: Outbox::new(outbound),
            to_simulation,
            simulation: None,
            transport: None,
            shutdown_grace: Duration::from_secs(2),
            shut_down: false,
        }
    }

    pub fn with_simulation(mut self, simulation: Box<dyn Shutdown>) -> Self {
        self.simulation = Some(simulation);
        self
    }

    pub fn with_transport(mut self, transport: Box<dyn Shutdown>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// True once `cmd_shutdown` has been executed.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Parses, validates and routes one inbound frame, or reports a closed connection.
    pub fn handle(&mut self, message: InboundMessage) {
        match message.event {
            InboundEvent::Text(text) => {
                if let Some(parsed) = self.parse(message.client_id, &text) {
                    self.process(parsed);
                }
            }
            InboundEvent::Closed => self.disconnect(message.client_id),
        }
    }

    /// Parses a frame. Malformed JSON is answered with a PARSE error.
    pub fn parse(&self, client_id: ClientId, text: &str) -> Option<ParsedMessage> {
        match codec::parse(text) {
            Ok(document) => Some(ParsedMessage {
                client_id,
                document,
            }),
            Err(e) => {
                warn!("Unparsable message from {}: {}", client_id, e);
                self.outbox
                    .send_rpc_error(client_id, &RpcError::from(e), None);
                None
            }
        }
    }

    /// Tells the scheduler to forget `client_id`.
    ///
    /// Sent on the simulation queue, so it follows every command the client
    /// issued before closing.
    pub fn disconnect(&self, client_id: ClientId) {
        debug!("{} disconnected", client_id);
        if self
            .to_simulation
            .send(SimCommand::Disconnect { client_id })
            .is_err()
        {
            debug!("Simulation queue closed, {} not reported", client_id);
        }
    }

    pub fn process(&mut self, parsed: ParsedMessage) {
        if let Err(e) = validate(&parsed.document) {
            warn!("Invalid JSON-RPC request from {}: {}", parsed.client_id, e);
            let id = rpc::id_of(&parsed.document);
            self.outbox.send_rpc_error(parsed.client_id, &e, id);
            return;
        }

        let id = rpc::id_of(&parsed.document);
        let method = rpc::method_of(&parsed.document).unwrap_or_default();
        match classify_method(method) {
            Ok(Classification::Main) => {
                debug!("Processing {} inline", method);
                let handler = self.main_actions.get(method).copied();
                match handler {
                    Some(handler) => match handler(self, &parsed) {
                        Ok(result) => self.outbox.send_result(parsed.client_id, result, id),
                        Err(e) => self.outbox.send_rpc_error(parsed.client_id, &e, id),
                    },
                    None => self.reject_unknown(&parsed, method.to_string()),
                }
            }
            Ok(Classification::Domain { tag, method }) => self.distribute(parsed, tag, method),
            Err(e) => {
                warn!("Rejected method from {}: {}", parsed.client_id, e);
                self.outbox.send_rpc_error(parsed.client_id, &e, id);
            }
        }
    }

    /// Rewrites the method name and hands the command to the DOMAIN table.
    fn distribute(&mut self, mut parsed: ParsedMessage, tag: CommandTag, method: String) {
        let Some(handler) = self.domains.get(method.as_str()).copied() else {
            self.reject_unknown(&parsed, method);
            return;
        };

        debug!("Distributing {} ({:?}) from {}", method, tag, parsed.client_id);
        if let Value::Object(members) = &mut parsed.document {
            members.insert("method".to_string(), Value::from(method));
        }
        handler(
            self,
            ClassifiedCommand {
                client_id: parsed.client_id,
                tag,
                document: parsed.document,
            },
        );
    }

    fn reject_unknown(&self, parsed: &ParsedMessage, method: String) {
        let error = RpcError::MethodNotFound { method };
        warn!("{} from {}", error, parsed.client_id);
        self.outbox
            .send_rpc_error(parsed.client_id, &error, rpc::id_of(&parsed.document));
    }

    fn enqueue(&self, command: ClassifiedCommand) {
        if self.to_simulation.send(SimCommand::Execute(command)).is_err() {
            warn!("Simulation queue closed, dropping command");
        }
    }
}

fn forward_to_simulation(broker: &MessageBroker, command: ClassifiedCommand) {
    info!("{} requested by {}", command.method(), command.client_id);
    debug!("Appending request to simulation queue");
    broker.enqueue(command);
}

/// Stops the simulation, waits the grace period, stops the transport.
///
/// Every step is best effort; a missing collaborator is skipped.
fn shutdown_server(broker: &mut MessageBroker, parsed: &ParsedMessage) -> Result<Value, RpcError> {
    check_params(&parsed.document, &[])?;
    info!("Server shutdown requested by {}", parsed.client_id);

    if let Some(simulation) = &broker.simulation {
        debug!("Shutting down simulation...");
        simulation.shutdown();
    }
    if !broker.shutdown_grace.is_zero() {
        std::thread::sleep(broker.shutdown_grace);
    }
    if let Some(transport) = &broker.transport {
        debug!("Shutting down network...");
        transport.shutdown();
    }
    broker.shut_down = true;
    Ok(rpc::success())
}
