//! Wire-level vocabulary shared by the galaxy server and its clients.
//!
//! Everything that appears on the JSON-RPC channel lives here: method and
//! notification names, the telemetry channels and frequency tiers, the
//! envelope builders and the text codec.

pub mod codec;
pub mod rpc;
pub mod tier;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use codec::{CodecError, JsonBuilder};
pub use rpc::{ErrorCode, Notification};
pub use tier::{Channel, Tier};

pub const DEFAULT_PORT: u16 = 9002;

pub const PREFIX_COMMAND: &str = "cmd_";
pub const PREFIX_SUBSCRIBE: &str = "sub_";
pub const PREFIX_UNSUBSCRIBE: &str = "uns_";

pub const ACCELERATION_MIN: f64 = 0.1;
pub const ACCELERATION_MAX: f64 = 1.0e6;

/// Upper bound for the star systems a client may select on the `system` channel.
pub const MAX_SELECTED_SYSTEMS: usize = 16;

/// Method names accepted by the server.
pub mod methods {
    pub const SHUTDOWN: &str = "cmd_shutdown";
    pub const START_SIMULATION: &str = "cmd_start_simulation";
    pub const STOP_SIMULATION: &str = "cmd_stop_simulation";
    pub const ACCELERATE_SIMULATION: &str = "cmd_accelerate_simulation";
}

/// Method names of server-originated notifications.
pub mod notifications {
    pub const DYNAMIC_DATA: &str = "bc_dynamic_data";
    pub const GALAXY_STARS: &str = "galaxy_data_stars";
    pub const GALAXY_SYSTEMS: &str = "galaxy_data_systems";
    pub const PERF_STATS: &str = "perf_stats";
    pub const SIM_STATS: &str = "sim_stats";
}

/// JSON-RPC request id as carried on the wire.
pub type RequestId = u32;

/// Identifies one connection for as long as it stays open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client {}", self.0)
    }
}

/// Issues request ids for outgoing requests.
///
/// Ids are unique for the lifetime of the counter only and wrap on overflow.
#[derive(Debug, Default, Clone)]
pub struct RequestCounter {
    last: RequestId,
}

impl RequestCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> RequestId {
        self.last = self.last.wrapping_add(1);
        self.last
    }
}

/// Builds the full method name for a subscription request.
pub fn subscription_method(subscribe: bool, channel: Channel, tier: Tier) -> String {
    let prefix = if subscribe {
        PREFIX_SUBSCRIBE
    } else {
        PREFIX_UNSUBSCRIBE
    };
    format!("{}{}_{}", prefix, channel.name(), tier.token())
}
