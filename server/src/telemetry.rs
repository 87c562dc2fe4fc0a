//! Notification payloads pushed to subscribers.

use crate::clock::SimulationClock;
use crate::galaxy::{Body, Galaxy, StarData, StarSystem, SystemId};
use serde::Serialize;
use shared::{notifications, Channel, Notification};

/// Timing of the most recent tick plus running totals, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerfStats {
    pub queue_ms: f64,
    pub physics_ms: f64,
    pub telemetry_ms: f64,
    pub tick_ms: f64,
    pub step_ms: f64,
    pub substeps: u32,
    pub ticks: u64,
    pub overruns: u64,
    pub subscribers: usize,
}

/// Read-only view of everything a notification may report.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub galaxy: &'a Galaxy,
    pub clock: &'a SimulationClock,
    pub perf: &'a PerfStats,
}

pub fn dynamic_data(body: &Body, clock: &SimulationClock) -> Notification {
    let motion = &body.motion;
    Notification::new(notifications::DYNAMIC_DATA)
        .param("id", body.id.0)
        .param("sys", body.system.0)
        .param("ts", clock.to_stamp())
        .param("name", body.name.as_str())
        .param("m", motion.mass)
        .param("r", body.radius)
        .param("px", motion.position.x)
        .param("py", motion.position.y)
        .param("vx", motion.velocity.x)
        .param("vy", motion.velocity.y)
        .param("ax", motion.acceleration.x)
        .param("ay", motion.acceleration.y)
}

pub fn galaxy_star(body: &Body, star: &StarData) -> Notification {
    Notification::new(notifications::GALAXY_STARS)
        .param("id", body.id.0)
        .param("sys", body.system.0)
        .param("name", body.name.as_str())
        .param("m", body.motion.mass)
        .param("r", body.radius)
        .param("sc", star.spectral_class.letter().to_string())
        .param("t", star.temperature)
}

pub fn galaxy_system(system: &StarSystem) -> Notification {
    Notification::new(notifications::GALAXY_SYSTEMS)
        .param("id", system.id.0)
        .param("name", system.name.as_str())
        .param("px", system.position.x)
        .param("py", system.position.y)
        .param("bodies", system.len())
}

pub fn perf_stats(perf: &PerfStats) -> Notification {
    let params = serde_json::to_value(perf).unwrap_or_default();
    Notification::new(notifications::PERF_STATS).params_from(params)
}

pub fn sim_stats(clock: &SimulationClock, galaxy: &Galaxy) -> Notification {
    Notification::new(notifications::SIM_STATS)
        .param("running", clock.is_active())
        .param("acceleration", clock.acceleration())
        .param("stamp", clock.to_stamp())
        .param("years", clock.years())
        .param("days", clock.day_of_year())
        .param("hours", clock.hour_of_day())
        .param("minutes", clock.minute_of_hour())
        .param("seconds", clock.second_of_minute())
        .param("total_seconds", clock.total_seconds())
        .param("bodies", galaxy.bodies().len())
        .param("systems", galaxy.systems().len())
        .param("generation", galaxy.generation())
}

/// Builds every notification one push of `channel` consists of.
///
/// `selection` is only used by [`Channel::System`].
pub fn notifications_for(
    channel: Channel,
    selection: &[SystemId],
    snapshot: Snapshot<'_>,
) -> Vec<Notification> {
    let Snapshot {
        galaxy,
        clock,
        perf,
    } = snapshot;
    match channel {
        Channel::DynamicData => galaxy
            .bodies()
            .iter()
            .map(|body| dynamic_data(body, clock))
            .collect(),
        Channel::System => selection
            .iter()
            .flat_map(|id| galaxy.bodies_in(*id))
            .map(|body| dynamic_data(body, clock))
            .collect(),
        Channel::GalaxyData => galaxy
            .stars()
            .map(|(body, star)| galaxy_star(body, star))
            .chain(galaxy.systems().iter().map(galaxy_system))
            .collect(),
        Channel::PerfStats => vec![perf_stats(perf)],
        Channel::SimStats => vec![sim_stats(clock, galaxy)],
    }
}
