//! Telemetry channels and the frequency tiers they are pushed at.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Broadcast rate of a subscription.
///
/// `Event` pushes once per content change, the others push on a shared timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[serde(rename = "evt")]
    Event,
    /// 10 Hz
    S01,
    /// 2 Hz
    S05,
    /// 1 Hz
    S1,
    /// 0.2 Hz
    S5,
    /// 0.1 Hz
    S10,
}

impl Tier {
    pub const ALL: [Tier; 6] = [
        Tier::Event,
        Tier::S01,
        Tier::S05,
        Tier::S1,
        Tier::S5,
        Tier::S10,
    ];

    pub const TIMED: [Tier; 5] = [Tier::S01, Tier::S05, Tier::S1, Tier::S5, Tier::S10];

    /// Method-name suffix of this tier.
    pub fn token(self) -> &'static str {
        match self {
            Tier::Event => "evt",
            Tier::S01 => "s01",
            Tier::S05 => "s05",
            Tier::S1 => "s1",
            Tier::S5 => "s5",
            Tier::S10 => "s10",
        }
    }

    pub fn from_token(token: &str) -> Option<Tier> {
        Tier::ALL.into_iter().find(|tier| tier.token() == token)
    }

    /// Push interval of a timed tier, `None` for the event tier.
    pub fn interval(self) -> Option<Duration> {
        match self {
            Tier::Event => None,
            Tier::S01 => Some(Duration::from_millis(100)),
            Tier::S05 => Some(Duration::from_millis(500)),
            Tier::S1 => Some(Duration::from_secs(1)),
            Tier::S5 => Some(Duration::from_secs(5)),
            Tier::S10 => Some(Duration::from_secs(10)),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Named telemetry stream a client can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    DynamicData,
    GalaxyData,
    PerfStats,
    SimStats,
    System,
}

impl Channel {
    pub const COUNT: usize = 5;

    pub const ALL: [Channel; Channel::COUNT] = [
        Channel::DynamicData,
        Channel::GalaxyData,
        Channel::PerfStats,
        Channel::SimStats,
        Channel::System,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Channel::DynamicData => "dynamic_data",
            Channel::GalaxyData => "galaxy_data",
            Channel::PerfStats => "perf_stats",
            Channel::SimStats => "sim_stats",
            Channel::System => "system",
        }
    }

    /// Subscribe method with the tier suffix already stripped.
    pub fn subscribe_method(self) -> &'static str {
        match self {
            Channel::DynamicData => "sub_dynamic_data",
            Channel::GalaxyData => "sub_galaxy_data",
            Channel::PerfStats => "sub_perf_stats",
            Channel::SimStats => "sub_sim_stats",
            Channel::System => "sub_system",
        }
    }

    pub fn unsubscribe_method(self) -> &'static str {
        match self {
            Channel::DynamicData => "uns_dynamic_data",
            Channel::GalaxyData => "uns_galaxy_data",
            Channel::PerfStats => "uns_perf_stats",
            Channel::SimStats => "uns_sim_stats",
            Channel::System => "uns_system",
        }
    }

    /// Position of the channel in [`Channel::ALL`].
    pub fn index(self) -> usize {
        match self {
            Channel::DynamicData => 0,
            Channel::GalaxyData => 1,
            Channel::PerfStats => 2,
            Channel::SimStats => 3,
            Channel::System => 4,
        }
    }

    /// Tiers a client may subscribe this channel at.
    ///
    /// Galaxy content only changes on reseeding, so it is event driven.
    /// Everything else changes every tick and is sampled on a timer.
    pub fn allowed_tiers(self) -> &'static [Tier] {
        match self {
            Channel::GalaxyData => &[Tier::Event],
            Channel::DynamicData | Channel::PerfStats | Channel::SimStats | Channel::System => {
                &Tier::TIMED
            }
        }
    }

    pub fn allows(self, tier: Tier) -> bool {
        self.allowed_tiers().contains(&tier)
    }

    /// Comma separated list of allowed tier tokens, used in error messages.
    pub fn allowed_tier_list(self) -> String {
        self.allowed_tiers()
            .iter()
            .map(|tier| tier.token())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_tokens_roundtrip() {
        for tier in Tier::ALL {
            assert_eq!(Tier::from_token(tier.token()), Some(tier));
        }
        assert_eq!(Tier::from_token("s2"), None);
        assert_eq!(Tier::from_token(""), None);
        assert_eq!(Tier::from_token("S1"), None);
    }

    #[test]
    fn test_channel_method_names() {
        for channel in Channel::ALL {
            assert_eq!(channel.subscribe_method(), format!("sub_{}", channel.name()));
            assert_eq!(channel.unsubscribe_method(), format!("uns_{}", channel.name()));
        }
    }

    #[test]
    fn test_tier_intervals() {
        assert_eq!(Tier::Event.interval(), None);
        assert_eq!(Tier::S01.interval(), Some(Duration::from_millis(100)));
        assert_eq!(Tier::S05.interval(), Some(Duration::from_millis(500)));
        assert_eq!(Tier::S1.interval(), Some(Duration::from_secs(1)));
        assert_eq!(Tier::S5.interval(), Some(Duration::from_secs(5)));
        assert_eq!(Tier::S10.interval(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_tier_serde_uses_tokens() {
        assert_eq!(serde_json::to_string(&Tier::Event).unwrap(), "\"evt\"");
        assert_eq!(serde_json::to_string(&Tier::S05).unwrap(), "\"s05\"");
        let tier: Tier = serde_json::from_str("\"s10\"").unwrap();
        assert_eq!(tier, Tier::S10);
    }

    #[test]
    fn test_channel_names_roundtrip() {
        for channel in Channel::ALL {
            assert_eq!(Channel::from_name(channel.name()), Some(channel));
        }
        assert_eq!(Channel::from_name("tire_data"), None);
    }

    #[test]
    fn test_channel_indices_match_order() {
        for (i, channel) in Channel::ALL.iter().enumerate() {
            assert_eq!(channel.index(), i);
        }
    }

    #[test]
    fn test_channel_allowed_tiers() {
        assert!(Channel::GalaxyData.allows(Tier::Event));
        assert!(!Channel::GalaxyData.allows(Tier::S1));
        assert!(Channel::PerfStats.allows(Tier::S10));
        assert!(!Channel::PerfStats.allows(Tier::Event));
        assert_eq!(Channel::GalaxyData.allowed_tier_list(), "evt");
        assert_eq!(
            Channel::SimStats.allowed_tier_list(),
            "s01, s05, s1, s5, s10"
        );
    }
}
