//! SimWorld - The simulation harness container.
//!
//! One vehicle, three kinds of participant:
//!
//! ```text
//!   Controller --(reliable, upstream latency)--> Authority
//!        ^                                           |
//!        +--(state sync, downstream latency/loss)----+----> Observer x N
//! ```
//!
//! Every tick runs the roles in a fixed order against one virtual clock:
//! authority drains arrived samples, the net update replicates the newest
//! snapshot, the controller reconciles then predicts, observers smooth.

use crate::arena::Arena;
use crate::context::SimContext;
use crate::exporter::{PoseRecord, SimEvent, SimFrame};
use crate::network::{LinkConditions, LinkStats, SimBroadcast, SimReliableLink, SimStateLink};

use kart_core::{
    Authority, AuthoritativeSnapshot, ControlInput, Controller, InputSample, KinematicState,
    ConfigError, Observer, PresentationFrame, ReplicationMetrics, Transform, VehicleConstants,
};
use kart_env::{EnvError, KartContext, LocalStateSubscriber, ReliableReceiver, VehicleId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Tick rate in Hz
    pub tick_rate_hz: u32,

    /// Ticks between net updates on the state-sync links
    pub sync_interval_ticks: u32,

    /// Controller -> authority
    pub upstream: LinkConditions,

    /// Authority -> controller and observers
    pub downstream: LinkConditions,

    /// Number of observers watching the vehicle
    pub num_observers: usize,

    /// Simulation duration in seconds
    pub duration_secs: f64,

    /// Multiplier on the time step the controller claims (1.0 = honest)
    pub time_scale: f64,

    /// Drive the vehicle on the authority itself instead of a remote controller
    pub host_driven: bool,

    pub arena: Arena,
    pub vehicle: VehicleConstants,

    /// Where the vehicle starts, at rest
    pub spawn: Transform,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            tick_rate_hz: 60,
            sync_interval_ticks: 6,
            upstream: LinkConditions::with_latency_ms(50),
            downstream: LinkConditions::with_latency_ms(50),
            num_observers: 2,
            duration_secs: 10.0,
            time_scale: 1.0,
            host_driven: false,
            arena: Arena::default(),
            vehicle: VehicleConstants::default(),
            spawn: Transform::default(),
        }
    }
}

impl SimConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz.max(1);
        self
    }

    pub fn with_sync_interval(mut self, ticks: u32) -> Self {
        self.sync_interval_ticks = ticks.max(1);
        self
    }

    /// Sets the one-way latency in both directions.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.upstream.latency = Duration::from_millis(latency_ms);
        self.downstream.latency = Duration::from_millis(latency_ms);
        self
    }

    /// Sets the drop probability for replicated snapshots.
    pub fn with_snapshot_loss(mut self, loss_rate: f64) -> Self {
        self.downstream = self.downstream.with_loss(loss_rate);
        self
    }

    pub fn with_observers(mut self, count: usize) -> Self {
        self.num_observers = count;
        self
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn with_time_scale(mut self, scale: f64) -> Self {
        self.time_scale = scale;
        self
    }

    pub fn with_host_driven(mut self, host_driven: bool) -> Self {
        self.host_driven = host_driven;
        self
    }

    pub fn with_arena(mut self, arena: Arena) -> Self {
        self.arena = arena;
        self
    }

    pub fn with_vehicle(mut self, vehicle: VehicleConstants) -> Self {
        self.vehicle = vehicle;
        self
    }

    pub fn with_spawn(mut self, spawn: Transform) -> Self {
        self.spawn = spawn;
        self
    }

    /// Nominal seconds per tick.
    pub fn tick_interval(&self) -> f64 {
        1.0 / self.tick_rate_hz.max(1) as f64
    }

    /// Checks the vehicle constants and the time scale.
    ///
    /// [`SimWorld::new`] trusts its config; a zero mass, for instance,
    /// turns every state into NaN on the first tick.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.vehicle.validate()?;
        if !(self.time_scale.is_finite() && self.time_scale > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "time_scale must be positive, got {}",
                self.time_scale
            )));
        }
        Ok(())
    }

    /// Number of ticks covering `duration_secs`.
    pub fn total_ticks(&self) -> u64 {
        (self.duration_secs.max(0.0) * self.tick_rate_hz as f64).round() as u64
    }
}

/// The owning client: predictor plus its snapshot subscription.
struct ControllerHandle {
    controller: Controller<Arena>,
    subscription: LocalStateSubscriber<AuthoritativeSnapshot>,
}

/// A remote client smoothing the vehicle.
struct ObserverHandle {
    observer: Observer,
    subscription: LocalStateSubscriber<AuthoritativeSnapshot>,
}

/// The SimWorld - container for the entire simulation.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,

    authority: Authority<Arena>,
    controller: Option<ControllerHandle>,
    observers: Vec<ObserverHandle>,

    inputs: SimReliableLink<InputSample>,
    snapshots: SimBroadcast<AuthoritativeSnapshot>,

    /// Clock reading at the end of the previous tick
    last_tick_secs: f64,

    /// Fastest the authority has ever seen the vehicle move (m/s)
    max_authority_speed: f64,

    /// Events raised since the last frame was taken
    events: Vec<SimEvent>,

    /// Current tick count
    tick_count: u64,
}

impl SimWorld {
    /// Creates a new SimWorld with the given configuration.
    ///
    /// The config is taken as is; run [`SimConfig::validate`] first when it
    /// comes from outside.
    pub fn new(config: SimConfig) -> Self {
        // Derive separate seeds for different subsystems
        let context_seed = config.seed;
        let loss_seed = config.seed.wrapping_mul(0x9e3779b97f4a7c15);

        let context = SimContext::shared(context_seed);
        let vehicle = VehicleId::from_seed(config.seed);
        let initial = KinematicState::at_rest(config.spawn);

        let authority = Authority::new(
            vehicle,
            config.vehicle.clone(),
            config.arena,
            initial,
            context.now_secs(),
        );

        let inputs = SimReliableLink::new(context.clone(), config.upstream);
        let mut snapshots = SimBroadcast::new();

        let controller = if config.host_driven {
            None
        } else {
            let (link, subscription) =
                SimStateLink::new(context.clone(), config.downstream, loss_seed);
            snapshots.add_link(link);
            Some(ControllerHandle {
                controller: Controller::new(vehicle, config.vehicle.clone(), config.arena, initial),
                subscription,
            })
        };

        let observers = (0..config.num_observers)
            .map(|i| {
                let seed = loss_seed.wrapping_add(i as u64 + 1);
                let (link, subscription) = SimStateLink::new(context.clone(), config.downstream, seed);
                snapshots.add_link(link);
                ObserverHandle {
                    observer: Observer::new(vehicle, initial),
                    subscription,
                }
            })
            .collect();

        Self {
            last_tick_secs: context.now_secs(),
            config,
            context,
            authority,
            controller,
            observers,
            inputs,
            snapshots,
            max_authority_speed: 0.0,
            events: Vec::new(),
            tick_count: 0,
        }
    }

    /// Runs one fixed-rate tick with the given local controls.
    ///
    /// The controls drive the remote controller, or the authority itself
    /// when the world is host-driven.
    pub fn tick(&mut self, controls: ControlInput) -> Result<(), EnvError> {
        self.context
            .advance_time(Duration::from_secs_f64(self.config.tick_interval()));
        let now = self.context.now_secs();
        let dt = now - self.last_tick_secs;
        self.last_tick_secs = now;

        // Authority: apply every sample that has arrived
        let speed_before = self.authority.state().speed();
        let rejected_before = self.authority.metrics().rejected();
        while let Some((vehicle, sample)) = self.inputs.try_recv() {
            if vehicle != self.authority.vehicle() {
                warn!(%vehicle, "Sample for unknown vehicle dropped");
                continue;
            }
            self.authority.handle_sample(sample, now, &self.snapshots)?;
        }
        if self.config.host_driven {
            self.authority
                .drive_locally(controls, dt, now, &self.snapshots)?;
        }

        let rejected = self.authority.metrics().rejected() - rejected_before;
        if rejected > 0 {
            self.events
                .push(SimEvent::warn(format!("{} sample(s) rejected", rejected)));
        }
        let speed = self.authority.state().speed();
        if speed_before > 0.0 && speed == 0.0 {
            // Only a blocked move zeroes velocity outright
            let x = self.authority.state().position().x;
            let y = self.authority.state().position().y;
            self.events.push(SimEvent::info(format!(
                "Wall contact at ({:.2}, {:.2}) from {:.2} m/s",
                x, y, speed_before
            )));
        }
        self.max_authority_speed = self.max_authority_speed.max(speed);

        // Net update
        if self.tick_count % self.config.sync_interval_ticks.max(1) as u64 == 0 {
            self.snapshots.replicate();
        }
        self.snapshots.deliver_due();

        if let Some(handle) = self.controller.as_mut() {
            handle.controller.poll_snapshots(&mut handle.subscription);
            handle.controller.tick_and_send(
                controls,
                dt * self.config.time_scale,
                now,
                &self.inputs,
            )?;
        }

        for handle in &mut self.observers {
            handle.observer.poll_snapshots(&mut handle.subscription);
            handle.observer.advance(dt);
        }

        self.tick_count += 1;
        if self.tick_count % self.config.tick_rate_hz.max(1) as u64 == 0 {
            debug!(
                t = now,
                authority_x = self.authority.state().position().x,
                speed = self.authority.state().speed(),
                in_flight = self.inputs.in_flight(),
                "World tick"
            );
        }

        Ok(())
    }

    /// Runs the configured duration, asking `script` for controls each tick.
    ///
    /// The script receives the current simulation time in seconds.
    pub fn run<F>(&mut self, mut script: F) -> Result<u64, EnvError>
    where
        F: FnMut(f64) -> ControlInput,
    {
        for _ in 0..self.config.total_ticks() {
            let controls = script(self.time_secs());
            self.tick(controls)?;
        }
        Ok(self.tick_count)
    }

    /// Snapshot of what every role is showing right now.
    ///
    /// Drains the events raised since the previous frame.
    pub fn frame(&mut self) -> SimFrame {
        let authority = PoseRecord::from(&PresentationFrame::from(*self.authority.state()));

        SimFrame {
            time_sec: self.time_secs(),
            authority,
            controller: self
                .controller
                .as_ref()
                .map(|h| PoseRecord::from(&h.controller.presentation())),
            observers: self
                .observers
                .iter()
                .map(|h| PoseRecord::from(&h.observer.presentation()))
                .collect(),
            pending_samples: self
                .controller
                .as_ref()
                .map_or(0, |h| h.controller.pending().len()),
            events: std::mem::take(&mut self.events),
        }
    }

    /// Counters from every role, merged.
    pub fn metrics(&self) -> ReplicationMetrics {
        let mut metrics = self.authority.metrics().clone();
        if let Some(handle) = &self.controller {
            metrics.merge(handle.controller.metrics());
        }
        for handle in &self.observers {
            metrics.merge(handle.observer.metrics());
        }
        metrics
    }

    pub fn authority(&self) -> &Authority<Arena> {
        &self.authority
    }

    pub fn controller(&self) -> Option<&Controller<Arena>> {
        self.controller.as_ref().map(|h| &h.controller)
    }

    pub fn observers(&self) -> impl Iterator<Item = &Observer> {
        self.observers.iter().map(|h| &h.observer)
    }

    /// Traffic on the controller -> authority link.
    pub fn input_stats(&self) -> LinkStats {
        self.inputs.stats()
    }

    /// Traffic on every authority -> client link, summed.
    pub fn snapshot_stats(&self) -> LinkStats {
        self.snapshots.stats()
    }

    pub fn max_authority_speed(&self) -> f64 {
        self.max_authority_speed
    }

    /// Returns the current tick count.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Current virtual time in seconds.
    pub fn time_secs(&self) -> f64 {
        self.context.now_secs()
    }
}
