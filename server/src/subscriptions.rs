//! Frequency-tiered channel membership.
//!
//! Every client holds at most one tier per channel, stored in a fixed array
//! indexed by [`Channel::index`]. Timed tiers share one timer each; when a
//! timer elapses every membership at that tier is due in the same pass and
//! the timer starts over from zero. Event memberships are due exactly once
//! until their "sent" flag is cleared again.

use crate::error::RpcError;
use crate::galaxy::SystemId;
use log::debug;
use shared::{Channel, ClientId, Tier};
use std::collections::BTreeMap;
use std::time::Duration;

/// One channel membership of one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Membership {
    tier: Tier,
    /// Only meaningful for [`Tier::Event`].
    sent: bool,
}

#[derive(Debug, Clone, Default)]
struct ClientSubscriptions {
    slots: [Option<Membership>; Channel::COUNT],
    systems: Vec<SystemId>,
}

impl ClientSubscriptions {
    fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Added,
    /// Already subscribed at the same tier.
    Unchanged,
    /// Membership moved from another tier.
    Moved { from: Tier },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    Removed,
    NotSubscribed,
    WrongTier { held: Tier },
}

/// A channel push that is due for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub client_id: ClientId,
    pub channel: Channel,
    tier: Tier,
}

const TIMED_TIERS: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    clients: BTreeMap<ClientId, ClientSubscriptions>,
    timers: [Duration; TIMED_TIERS],
}

fn timer_slot(tier: Tier) -> Option<usize> {
    Tier::TIMED.iter().position(|timed| *timed == tier)
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `client_id` to `channel` at `tier`.
    ///
    /// Re-subscribing at the same tier changes nothing, including the event
    /// "sent" flag. Subscribing at another tier moves the membership.
    pub fn subscribe(
        &mut self,
        client_id: ClientId,
        channel: Channel,
        tier: Tier,
    ) -> Result<SubscribeOutcome, RpcError> {
        if !channel.allows(tier) {
            return Err(RpcError::InvalidSubscriptionTier { channel, tier });
        }

        let client = self.clients.entry(client_id).or_default();
        let slot = &mut client.slots[channel.index()];
        let outcome = match *slot {
            Some(membership) if membership.tier == tier => SubscribeOutcome::Unchanged,
            Some(membership) => SubscribeOutcome::Moved {
                from: membership.tier,
            },
            None => SubscribeOutcome::Added,
        };
        if outcome != SubscribeOutcome::Unchanged {
            *slot = Some(Membership { tier, sent: false });
        }

        debug!("{} subscribed to {} at {}: {:?}", client_id, channel, tier, outcome);
        Ok(outcome)
    }

    pub fn unsubscribe(
        &mut self,
        client_id: ClientId,
        channel: Channel,
        tier: Tier,
    ) -> Result<UnsubscribeOutcome, RpcError> {
        if !channel.allows(tier) {
            return Err(RpcError::InvalidSubscriptionTier { channel, tier });
        }

        let Some(client) = self.clients.get_mut(&client_id) else {
            return Ok(UnsubscribeOutcome::NotSubscribed);
        };
        let outcome = match client.slots[channel.index()] {
            None => UnsubscribeOutcome::NotSubscribed,
            Some(membership) if membership.tier != tier => UnsubscribeOutcome::WrongTier {
                held: membership.tier,
            },
            Some(_) => UnsubscribeOutcome::Removed,
        };
        if outcome == UnsubscribeOutcome::Removed {
            client.slots[channel.index()] = None;
            if channel == Channel::System {
                client.systems.clear();
            }
        }

        if client.is_empty() {
            self.clients.remove(&client_id);
        }
        Ok(outcome)
    }

    /// Drops every membership of a client. Returns false if it had none.
    pub fn remove_client(&mut self, client_id: ClientId) -> bool {
        self.clients.remove(&client_id).is_some()
    }

    /// Replaces the star systems a client follows on [`Channel::System`].
    pub fn select_systems(&mut self, client_id: ClientId, systems: Vec<SystemId>) {
        self.clients.entry(client_id).or_default().systems = systems;
    }

    pub fn selected_systems(&self, client_id: ClientId) -> &[SystemId] {
        self.clients
            .get(&client_id)
            .map(|client| client.systems.as_slice())
            .unwrap_or_default()
    }

    /// Forgets selected systems for which `keep` returns false.
    pub fn retain_systems(&mut self, mut keep: impl FnMut(SystemId) -> bool) {
        for client in self.clients.values_mut() {
            client.systems.retain(|id| keep(*id));
        }
    }

    /// Number of clients with at least one membership.
    pub fn client_count(&self) -> usize {
        self.clients
            .values()
            .filter(|client| !client.is_empty())
            .count()
    }

    /// Makes every event membership of `channel` due again.
    pub fn reset_event_flags(&mut self, channel: Channel) {
        for client in self.clients.values_mut() {
            if let Some(membership) = &mut client.slots[channel.index()] {
                membership.sent = false;
            }
        }
    }

    /// Advances the tier timers by `elapsed` and collects all due pushes.
    ///
    /// Deliveries come grouped by client in id order, then by channel.
    pub fn evaluate(&mut self, elapsed: Duration) -> Vec<Delivery> {
        let mut fired = [false; TIMED_TIERS];
        for (slot, tier) in Tier::TIMED.iter().enumerate() {
            self.timers[slot] += elapsed;
            if let Some(interval) = tier.interval() {
                if self.timers[slot] >= interval {
                    self.timers[slot] = Duration::ZERO;
                    fired[slot] = true;
                }
            }
        }

        let mut deliveries = Vec::new();
        for (client_id, client) in &mut self.clients {
            for channel in Channel::ALL {
                let Some(membership) = &mut client.slots[channel.index()] else {
                    continue;
                };
                let due = match timer_slot(membership.tier) {
                    Some(slot) => fired[slot],
                    None => !std::mem::replace(&mut membership.sent, true),
                };
                if due {
                    deliveries.push(Delivery {
                        client_id: *client_id,
                        channel,
                        tier: membership.tier,
                    });
                }
            }
        }
        deliveries
    }
}
