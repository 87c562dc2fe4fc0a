//! Fixed-step simulation scheduler.
//!
//! The scheduler owns all simulated state and runs on its own OS thread.
//! Each tick, in order:
//! 1. drains the command queue and executes every command synchronously,
//! 2. advances physics by measured wall time times the acceleration factor,
//!    if the clock is running,
//! 3. evaluates the subscription tiers and enqueues due telemetry.
//!
//! A tick that overruns its step budget is logged and the next one starts
//! without sleeping.

use crate::broker::{check_param_range, check_params, Shutdown};
use crate::clock::{Acceleration, SimulationClock};
use crate::config::ServerConfig;
use crate::error::{ParamKind, RpcError, ServerError};
use crate::galaxy::{Galaxy, SystemId};
use crate::outbox::Outbox;
use crate::queue::{ClassifiedCommand, CommandTag, OutboundSender, SimCommand, SimReceiver};
use crate::subscriptions::{SubscribeOutcome, SubscriptionRegistry, UnsubscribeOutcome};
use crate::telemetry::{self, PerfStats, Snapshot};
use crate::utils::millis;
use log::{debug, info, warn};
use serde_json::{json, Value};
use shared::{methods, rpc, Channel, Tier, MAX_SELECTED_SYSTEMS};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const CLAMP_NOTIFICATION: &str =
    "Out of bounds, valid interval is [0.1, 1.0e6]. Clamping value.";

/// Everything the scheduler mutates.
#[derive(Debug, Clone, Default)]
pub struct Simulation {
    pub clock: SimulationClock,
    pub galaxy: Galaxy,
    pub subscriptions: SubscriptionRegistry,
    pub perf: PerfStats,
}

pub type SimHandler = fn(&mut Simulation, &ClassifiedCommand) -> Result<Value, RpcError>;

fn sim_handlers() -> HashMap<&'static str, SimHandler> {
    let mut handlers: HashMap<&'static str, SimHandler> = HashMap::new();
    handlers.insert(methods::START_SIMULATION, start_simulation);
    handlers.insert(methods::STOP_SIMULATION, stop_simulation);
    handlers.insert(methods::ACCELERATE_SIMULATION, accelerate_simulation);

    handlers.insert(Channel::DynamicData.subscribe_method(), |sim, command| {
        subscribe(sim, command, Channel::DynamicData)
    });
    handlers.insert(Channel::GalaxyData.subscribe_method(), |sim, command| {
        subscribe(sim, command, Channel::GalaxyData)
    });
    handlers.insert(Channel::PerfStats.subscribe_method(), |sim, command| {
        subscribe(sim, command, Channel::PerfStats)
    });
    handlers.insert(Channel::SimStats.subscribe_method(), |sim, command| {
        subscribe(sim, command, Channel::SimStats)
    });
    handlers.insert(Channel::System.subscribe_method(), |sim, command| {
        subscribe(sim, command, Channel::System)
    });

    handlers.insert(Channel::DynamicData.unsubscribe_method(), |sim, command| {
        unsubscribe(sim, command, Channel::DynamicData)
    });
    handlers.insert(Channel::GalaxyData.unsubscribe_method(), |sim, command| {
        unsubscribe(sim, command, Channel::GalaxyData)
    });
    handlers.insert(Channel::PerfStats.unsubscribe_method(), |sim, command| {
        unsubscribe(sim, command, Channel::PerfStats)
    });
    handlers.insert(Channel::SimStats.unsubscribe_method(), |sim, command| {
        unsubscribe(sim, command, Channel::SimStats)
    });
    handlers.insert(Channel::System.unsubscribe_method(), |sim, command| {
        unsubscribe(sim, command, Channel::System)
    });
    handlers
}

fn start_simulation(sim: &mut Simulation, command: &ClassifiedCommand) -> Result<Value, RpcError> {
    check_params(&command.document, &[])?;
    if sim.clock.start() {
        info!("Simulation started");
    } else {
        debug!("Simulation already running");
    }
    Ok(rpc::success())
}

fn stop_simulation(sim: &mut Simulation, command: &ClassifiedCommand) -> Result<Value, RpcError> {
    check_params(&command.document, &[])?;
    if sim.clock.stop() {
        info!("Simulation stopped at {}", sim.clock);
    } else {
        debug!("Simulation already stopped");
    }
    Ok(rpc::success())
}

fn accelerate_simulation(
    sim: &mut Simulation,
    command: &ClassifiedCommand,
) -> Result<Value, RpcError> {
    let params = check_params(&command.document, &[ParamKind::Number])?;
    let requested = params[0].as_f64().unwrap_or_default();

    match sim.clock.set_acceleration(requested) {
        Acceleration::Accepted(factor) => {
            info!("Simulation acceleration set to {}", factor);
            Ok(rpc::success())
        }
        Acceleration::Clamped(factor) => {
            info!("Requested acceleration {} clamped to {}", requested, factor);
            Ok(json!({ "success": true, "notification": CLAMP_NOTIFICATION }))
        }
    }
}

fn command_tier(command: &ClassifiedCommand) -> Result<Tier, RpcError> {
    match command.tag {
        CommandTag::Tier(tier) => Ok(tier),
        CommandTag::Command => Err(RpcError::UnknownTier {
            method: command.method().to_string(),
        }),
    }
}

/// Parses the star system ids of a `sub_system` request.
fn selected_systems(galaxy: &Galaxy, command: &ClassifiedCommand) -> Result<Vec<SystemId>, RpcError> {
    let params = check_param_range(
        &command.document,
        1,
        MAX_SELECTED_SYSTEMS,
        ParamKind::Unsigned,
    )?;

    let mut systems = Vec::with_capacity(params.len());
    for param in params {
        let id = param
            .as_u64()
            .and_then(|id| u32::try_from(id).ok())
            .map(SystemId)
            .filter(|id| galaxy.contains_system(*id))
            .ok_or_else(|| RpcError::InvalidParamValue(format!("Unknown star system {}", param)))?;
        if !systems.contains(&id) {
            systems.push(id);
        }
    }
    Ok(systems)
}

fn subscribe(
    sim: &mut Simulation,
    command: &ClassifiedCommand,
    channel: Channel,
) -> Result<Value, RpcError> {
    let tier = command_tier(command)?;
    if !channel.allows(tier) {
        return Err(RpcError::InvalidSubscriptionTier { channel, tier });
    }

    let systems = if channel == Channel::System {
        selected_systems(&sim.galaxy, command)?
    } else {
        check_params(&command.document, &[])?;
        Vec::new()
    };

    let outcome = sim.subscriptions.subscribe(command.client_id, channel, tier)?;
    if channel == Channel::System {
        sim.subscriptions.select_systems(command.client_id, systems);
    }

    match outcome {
        SubscribeOutcome::Moved { from } => Ok(json!({
            "success": true,
            "notification": format!("Moved {} subscription from {} to {}", channel, from, tier),
        })),
        SubscribeOutcome::Added | SubscribeOutcome::Unchanged => Ok(rpc::success()),
    }
}

fn unsubscribe(
    sim: &mut Simulation,
    command: &ClassifiedCommand,
    channel: Channel,
) -> Result<Value, RpcError> {
    let tier = command_tier(command)?;
    check_params(&command.document, &[])?;

    match sim.subscriptions.unsubscribe(command.client_id, channel, tier)? {
        UnsubscribeOutcome::Removed => Ok(rpc::success()),
        UnsubscribeOutcome::NotSubscribed => Ok(json!({
            "success": false,
            "notification": format!("Not subscribed to {}", channel),
        })),
        UnsubscribeOutcome::WrongTier { held } => Ok(json!({
            "success": false,
            "notification": format!("Subscribed to {} at {}, not at {}", channel, held, tier),
        })),
    }
}

/// Lifecycle of the scheduler thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedulerState {
    NotStarted = 0,
    Looping = 1,
    ShuttingDown = 2,
}

impl SchedulerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SchedulerState::NotStarted,
            1 => SchedulerState::Looping,
            _ => SchedulerState::ShuttingDown,
        }
    }
}

/// Cloneable stop switch for a running scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerControl {
    running: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
}

impl SchedulerControl {
    fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            state: Arc::new(AtomicU8::new(SchedulerState::NotStarted as u8)),
        }
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn enter_loop(&self) {
        let _ = self.state.compare_exchange(
            SchedulerState::NotStarted as u8,
            SchedulerState::Looping as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Ends the loop after the current tick. Calling it again does nothing.
    pub fn stop(&self) {
        let previous = self
            .state
            .swap(SchedulerState::ShuttingDown as u8, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        if previous != SchedulerState::ShuttingDown as u8 {
            info!("Simulation scheduler shutting down");
        }
    }
}

impl Shutdown for SchedulerControl {
    fn shutdown(&self) {
        self.stop();
    }
}

pub struct SimulationScheduler {
    simulation: Simulation,
    handlers: HashMap<&'static str, SimHandler>,
    commands: SimReceiver,
    outbox: Outbox,
    step: Duration,
    control: SchedulerControl,
}

impl SimulationScheduler {
    pub fn new(commands: SimReceiver, outbound: OutboundSender, config: &ServerConfig) -> Self {
        Self {
            simulation: Simulation {
                galaxy: Galaxy::seeded(config.star_systems, config.seed),
                ..Simulation::default()
            },
            handlers: sim_handlers(),
            commands,
            outbox: Outbox::new(outbound),
            step: config.step(),
            control: SchedulerControl::new(),
        }
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn control(&self) -> SchedulerControl {
        self.control.clone()
    }

    /// Replaces the galaxy content.
    ///
    /// Event subscribers of `galaxy_data` get the new content once, and
    /// selected systems that no longer exist are forgotten.
    pub fn reseed(&mut self, star_systems: usize, seed: u64) {
        let Simulation {
            galaxy,
            subscriptions,
            ..
        } = &mut self.simulation;
        galaxy.reseed(star_systems, seed);
        subscriptions.reset_event_flags(Channel::GalaxyData);
        subscriptions.retain_systems(|id| galaxy.contains_system(id));
    }

    /// Runs one tick covering `wall_elapsed` of real time. Returns the time it took.
    pub fn tick(&mut self, wall_elapsed: Duration) -> Duration {
        let started = Instant::now();
        self.drain_commands();
        let queue_done = Instant::now();

        let mut substeps = 0;
        if self.simulation.clock.is_active() {
            let dt = wall_elapsed.as_secs_f64() * self.simulation.clock.acceleration();
            substeps = self.simulation.galaxy.step(dt);
            self.simulation.clock.advance(dt);
        }
        let physics_done = Instant::now();

        self.publish(wall_elapsed);
        let finished = Instant::now();

        let perf = &mut self.simulation.perf;
        perf.queue_ms = millis(queue_done - started);
        perf.physics_ms = millis(physics_done - queue_done);
        perf.telemetry_ms = millis(finished - physics_done);
        perf.tick_ms = millis(finished - started);
        perf.step_ms = millis(self.step);
        perf.substeps = substeps;
        perf.ticks += 1;
        perf.subscribers = self.simulation.subscriptions.client_count();

        finished - started
    }

    /// Sleep before the next tick. Zero, with a warning, when `spent` overran the budget.
    pub fn pace(&mut self, spent: Duration) -> Duration {
        if spent > self.step {
            self.simulation.perf.overruns += 1;
            warn!(
                "Tick took {:.3} ms, budget is {:.3} ms",
                millis(spent),
                millis(self.step)
            );
            Duration::ZERO
        } else {
            self.step - spent
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            self.execute(command);
        }
    }

    fn execute(&mut self, command: SimCommand) {
        match command {
            SimCommand::Execute(command) => {
                let id = command.id();
                let outcome = match self.handlers.get(command.method()).copied() {
                    Some(handler) => handler(&mut self.simulation, &command),
                    None => Err(RpcError::MethodNotFound {
                        method: command.method().to_string(),
                    }),
                };
                match outcome {
                    Ok(result) => self.outbox.send_result(command.client_id, result, id),
                    Err(e) => {
                        warn!("{} from {} failed: {}", command.method(), command.client_id, e);
                        self.outbox.send_rpc_error(command.client_id, &e, id);
                    }
                }
            }
            SimCommand::Disconnect { client_id } => {
                if self.simulation.subscriptions.remove_client(client_id) {
                    info!("Removed subscriptions of {}", client_id);
                }
            }
        }
    }

    fn publish(&mut self, elapsed: Duration) {
        let deliveries = self.simulation.subscriptions.evaluate(elapsed);
        let Simulation {
            clock,
            galaxy,
            subscriptions,
            perf,
        } = &self.simulation;
        let snapshot = Snapshot {
            galaxy,
            clock,
            perf,
        };

        for delivery in deliveries {
            let selection = subscriptions.selected_systems(delivery.client_id);
            for notification in telemetry::notifications_for(delivery.channel, selection, snapshot) {
                self.outbox
                    .send_notification(delivery.client_id, &notification);
            }
        }
    }

    /// Loops until [`SchedulerControl::stop`] is called.
    pub fn run(mut self) {
        self.control.enter_loop();
        info!(
            "Simulation scheduler running with a {} ms step",
            self.step.as_millis()
        );

        let mut last_tick = Instant::now();
        while self.control.is_running() {
            let now = Instant::now();
            let spent = self.tick(now - last_tick);
            last_tick = now;

            let sleep = self.pace(spent);
            if !sleep.is_zero() {
                thread::sleep(sleep);
            }
        }

        self.simulation.clock.stop();
        info!(
            "Simulation scheduler stopped after {} ticks",
            self.simulation.perf.ticks
        );
    }

    /// Moves the scheduler onto a dedicated thread.
    pub fn spawn(self) -> Result<SchedulerHandle, ServerError> {
        let control = self.control();
        let thread = thread::Builder::new()
            .name("simulation".to_string())
            .spawn(move || self.run())
            .map_err(|source| ServerError::Spawn {
                what: "simulation scheduler",
                source,
            })?;
        Ok(SchedulerHandle { control, thread })
    }
}

pub struct SchedulerHandle {
    control: SchedulerControl,
    thread: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn control(&self) -> SchedulerControl {
        self.control.clone()
    }

    pub fn join(self) -> Result<(), ServerError> {
        self.thread
            .join()
            .map_err(|_| ServerError::ThreadPanicked("simulation"))
    }
}
