//! # Galaxy Simulation Server Library
//!
//! This library provides the server side of the galaxy simulation: a gravity
//! simulation of star systems that clients control and observe through
//! JSON-RPC 2.0 requests over WebSocket.
//!
//! ## Core Responsibilities
//!
//! ### Request Brokering
//! Every inbound text frame is parsed, validated and classified by method
//! name. Malformed requests are answered with a JSON-RPC error right away.
//! `cmd_shutdown` runs inline; everything else is forwarded to the
//! simulation as a classified command.
//!
//! ### Authoritative Simulation
//! The scheduler owns the simulated galaxy and the simulation clock. It runs
//! a fixed-step loop that executes queued commands, integrates gravity and
//! publishes telemetry, in that order, once per tick.
//!
//! ### Subscriptions
//! Clients subscribe to telemetry channels at one of six frequency tiers.
//! Timed tiers push on shared timers, the event tier pushes once per
//! content change.
//!
//! ## Architecture Design
//!
//! ### Three Workers, Message Passing Only
//! The transport runs on a tokio runtime, the scheduler on a dedicated OS
//! thread and the broker on the caller's thread. They only exchange small
//! owned messages over unbounded channels (see [`queue`]); no simulated
//! state is shared.
//!
//! ### Best-Effort Delivery
//! Outbound frames for clients that are gone are dropped. There is no
//! backpressure and no retry.
//!
//! ## Module Organization
//!
//! ### Broker (`broker`)
//! Parsing, request validation, method classification and the MAIN and
//! DOMAIN dispatch tables.
//!
//! ### Scheduler (`scheduler`)
//! The fixed-step loop, the SIM dispatch table and tick statistics.
//!
//! ### Simulation State (`clock`, `galaxy`, `physics`, `subscriptions`)
//! Calendar clock with acceleration, the body and star system arena, the
//! gravity integrator and the tiered channel membership registry.
//!
//! ### Wire (`telemetry`, `outbox`, `error`)
//! Notification payloads, addressed response envelopes and the error
//! taxonomy with its JSON-RPC codes.
//!
//! ### Transport (`network`, `client_manager`)
//! WebSocket accept loop, per-connection reader and writer tasks, the
//! outbound dispatcher and the connection registry.

pub mod broker;
pub mod client_manager;
pub mod clock;
pub mod config;
pub mod error;
pub mod galaxy;
pub mod network;
pub mod outbox;
pub mod physics;
pub mod queue;
pub mod scheduler;
pub mod subscriptions;
pub mod telemetry;
pub mod utils;

pub use broker::{MessageBroker, Shutdown};
pub use config::ServerConfig;
pub use error::{RpcError, ServerError};
pub use network::{NetworkServer, TransportControl};
pub use scheduler::{SchedulerControl, SchedulerHandle, SimulationScheduler};
