//! Scenario runner - executes replication scenarios and checks their outcomes.

use crate::arena::Arena;
use crate::exporter::SimExport;
use crate::network::LinkStats;
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld};

use kart_core::{ControlInput, ReplicationMetrics, VehicleConstants};
use tracing::{debug, info, warn};

/// Largest correction an honest controller may ever see (m).
///
/// Replay is bit-exact, so anything above rounding noise is a desync.
const CORRECTION_TOLERANCE: f64 = 1e-6;

/// Observer per-frame movement bound, as a multiple of top speed * dt.
const OBSERVER_STEP_FACTOR: f64 = 4.0;

/// Half extent of the small arena used by the wall impact scenario (m).
const WALL_ARENA_HALF_EXTENT: f64 = 30.0;

/// Steering oscillation rate of the slalom script (rad/s).
const SLALOM_RATE: f64 = 1.5;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Protocol counters from every role
    pub metrics: ReplicationMetrics,

    /// Controller -> authority traffic
    pub input_stats: LinkStats,

    /// Authority -> clients traffic, all links summed
    pub snapshot_stats: LinkStats,
}

/// Runs replication scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Tick rate in Hz
    tick_rate_hz: u32,

    /// Duration in seconds
    duration_secs: f64,

    /// One-way latency replacing each scenario's own
    latency_ms: Option<u64>,

    vehicle: VehicleConstants,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            tick_rate_hz: 60,
            duration_secs: 10.0,
            latency_ms: None,
            vehicle: VehicleConstants::default(),
        }
    }

    /// Sets the tick rate.
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz;
        self
    }

    /// Sets the duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = secs;
        self
    }

    /// Overrides the latency of every scenario.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn with_vehicle(mut self, vehicle: VehicleConstants) -> Self {
        self.vehicle = vehicle;
        self
    }

    /// World configuration for a scenario.
    pub fn config_for(&self, scenario: ScenarioId) -> SimConfig {
        let base = SimConfig::default()
            .with_seed(self.seed)
            .with_tick_rate(self.tick_rate_hz)
            .with_duration(self.duration_secs)
            .with_vehicle(self.vehicle.clone())
            .with_latency_ms(100);

        let config = match scenario {
            ScenarioId::Baseline => base,
            ScenarioId::HighLatency => base.with_latency_ms(300),
            ScenarioId::SnapshotLoss => base.with_snapshot_loss(0.3),
            ScenarioId::SpeedHack => base.with_time_scale(1.5),
            ScenarioId::WallImpact => base.with_arena(Arena::square(WALL_ARENA_HALF_EXTENT)),
            ScenarioId::HostDrive => base.with_host_driven(true).with_observers(3),
        };

        match self.latency_ms {
            Some(ms) => config.with_latency_ms(ms),
            None => config,
        }
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.execute(scenario, None)
    }

    /// Runs a scenario, recording a frame every `export_interval` ticks.
    pub fn run_recorded(&self, scenario: ScenarioId, export_interval: u64) -> (ScenarioResult, SimExport) {
        let mut export = SimExport::new(scenario.name(), self.seed);
        let result = self.execute(scenario, Some((&mut export, export_interval.max(1))));
        export.finalize(result.passed, Some(result.metrics.max_correction));
        (result, export)
    }

    fn execute(&self, scenario: ScenarioId, mut recorder: Option<(&mut SimExport, u64)>) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        if scenario.is_adversarial() {
            warn!("Adversarial controller in play");
        }

        let config = self.config_for(scenario);
        let mut failure = config
            .validate()
            .err()
            .map(|err| format!("Invalid configuration: {}", err));
        // An invalid world is built but never ticked
        let total_ticks = if failure.is_some() { 0 } else { config.total_ticks() };
        let mut world = SimWorld::new(config);

        for tick in 0..total_ticks {
            let controls = script(scenario, world.time_secs());
            if let Err(err) = world.tick(controls) {
                failure = Some(format!("Environment error at tick {}: {}", tick, err));
                break;
            }

            if let Some((export, interval)) = recorder.as_mut() {
                if tick % *interval == 0 {
                    export.add_frame(world.frame());
                }
            }

            if tick % world.config.tick_rate_hz.max(1) as u64 == 0 {
                let metrics = world.metrics();
                debug!(
                    "  t={:.1}s | accepted={} | rejected={} | max_correction={:.3e}",
                    world.time_secs(),
                    metrics.samples_accepted,
                    metrics.rejected(),
                    metrics.max_correction
                );
            }
        }

        let failure = failure.or_else(|| evaluate(scenario, &world).err());
        let metrics = world.metrics();

        info!(
            "  accepted={} rejected={} reconciliations={} mean_replay={:.1} max_step={:.3}m",
            metrics.samples_accepted,
            metrics.rejected(),
            metrics.reconciliations,
            metrics.mean_replay_depth(),
            metrics.max_presentation_step
        );

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: failure.is_none(),
            total_ticks: world.tick_count(),
            final_time_secs: world.time_secs(),
            failure_reason: failure,
            metrics,
            input_stats: world.input_stats(),
            snapshot_stats: world.snapshot_stats(),
        }
    }
}

/// Controls the local driver applies at time `t`.
fn script(scenario: ScenarioId, t: f64) -> ControlInput {
    match scenario {
        ScenarioId::WallImpact => ControlInput::new(1.0, 0.0),
        _ => ControlInput::new(1.0, 0.8 * (t * SLALOM_RATE).sin()),
    }
}

fn evaluate(scenario: ScenarioId, world: &SimWorld) -> Result<(), String> {
    let metrics = world.metrics();

    match scenario {
        ScenarioId::Baseline | ScenarioId::HighLatency | ScenarioId::SnapshotLoss => {
            check_honest(&metrics)?;
            check_smooth(world, &metrics)?;
        }
        ScenarioId::WallImpact => {
            check_honest(&metrics)?;
            check_smooth(world, &metrics)?;

            let x = world.authority().state().position().x;
            if x < WALL_ARENA_HALF_EXTENT - 1e-6 {
                return Err(format!("Vehicle never reached the wall (x={:.2})", x));
            }
        }
        ScenarioId::SpeedHack => {
            if metrics.temporal_violations == 0 {
                return Err("Forged time steps were never rejected".to_string());
            }
            if metrics.max_correction <= 0.0 {
                return Err("Cheating controller was never corrected".to_string());
            }
            if world.authority().simulated_time() > world.time_secs() {
                return Err(format!(
                    "Authority clock ran ahead: {:.3}s > {:.3}s",
                    world.authority().simulated_time(),
                    world.time_secs()
                ));
            }
        }
        ScenarioId::HostDrive => {
            if metrics.samples_sent > 0 {
                return Err("Host-driven vehicle sent samples".to_string());
            }
            if metrics.snapshots_published == 0 {
                return Err("Authority never published".to_string());
            }
            check_smooth(world, &metrics)?;
        }
    }

    if scenario == ScenarioId::HighLatency && metrics.mean_replay_depth() < 20.0 {
        return Err(format!(
            "Replay depth {:.1} too shallow for a 300ms link",
            metrics.mean_replay_depth()
        ));
    }
    if scenario == ScenarioId::SnapshotLoss && world.snapshot_stats().packets_dropped == 0 {
        return Err("No snapshots were dropped".to_string());
    }

    Ok(())
}

fn check_honest(metrics: &ReplicationMetrics) -> Result<(), String> {
    if metrics.rejected() > 0 {
        return Err(format!("{} honest samples rejected", metrics.rejected()));
    }
    if metrics.reconciliations == 0 {
        return Err("Controller never reconciled".to_string());
    }
    if metrics.max_correction > CORRECTION_TOLERANCE {
        return Err(format!(
            "Prediction desynced: correction {:.3e}m",
            metrics.max_correction
        ));
    }
    Ok(())
}

fn check_smooth(world: &SimWorld, metrics: &ReplicationMetrics) -> Result<(), String> {
    if metrics.smoother_rebases == 0 {
        return Err("Observers never received a snapshot".to_string());
    }

    let bound = OBSERVER_STEP_FACTOR * world.max_authority_speed() * world.config.tick_interval() + 1e-6;
    if metrics.max_presentation_step > bound {
        return Err(format!(
            "Observer teleported {:.3}m in one frame (bound {:.3}m)",
            metrics.max_presentation_step, bound
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn runner(seed: u64) -> ScenarioRunner {
        ScenarioRunner::new(seed).with_duration(4.0)
    }

    #[test]
    fn test_baseline_passes() {
        let result = runner(42).run(ScenarioId::Baseline);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.total_ticks, 240);
        assert!(result.metrics.samples_accepted > 200);
    }

    #[test]
    fn test_high_latency_replays_deeper() {
        let shallow = runner(42).run(ScenarioId::Baseline);
        let deep = runner(42).run(ScenarioId::HighLatency);

        assert!(deep.passed, "{:?}", deep.failure_reason);
        assert!(deep.metrics.mean_replay_depth() > shallow.metrics.mean_replay_depth());
    }

    #[test]
    fn test_snapshot_loss_passes() {
        let result = runner(7).run(ScenarioId::SnapshotLoss);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.snapshot_stats.packets_dropped > 0);
    }

    #[test]
    fn test_speed_hack_is_caught() {
        let result = runner(42).run(ScenarioId::SpeedHack);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.temporal_violations > 0);
        assert!(result.metrics.max_correction > 0.0);
    }

    #[test]
    fn test_wall_impact_passes() {
        let result = runner(42).run(ScenarioId::WallImpact);
        assert!(result.passed, "{:?}", result.failure_reason);
    }

    #[test]
    fn test_host_drive_passes() {
        let result = runner(42).run(ScenarioId::HostDrive);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.input_stats.packets_sent, 0);
    }

    #[test]
    fn test_invalid_vehicle_fails_without_ticking() {
        let massless = VehicleConstants {
            mass: 0.0,
            ..VehicleConstants::default()
        };
        let result = runner(42).with_vehicle(massless).run(ScenarioId::Baseline);

        assert!(!result.passed);
        assert_eq!(result.total_ticks, 0);
        let reason = result.failure_reason.unwrap();
        assert!(reason.starts_with("Invalid configuration"), "{}", reason);
        assert!(reason.contains("mass"), "{}", reason);
    }

    #[test]
    fn test_latency_override_applies() {
        let config = ScenarioRunner::new(1)
            .with_latency_ms(250)
            .config_for(ScenarioId::HighLatency);
        assert_eq!(config.upstream.latency.as_millis(), 250);
        assert_eq!(config.downstream.latency.as_millis(), 250);
    }

    #[test]
    fn test_recorded_run_exports_frames() {
        let (result, export) = runner(3).run_recorded(ScenarioId::Baseline, 10);

        assert_eq!(export.frames.len(), 24);
        assert_eq!(export.passed, result.passed);
        assert!(export.frames.iter().all(|f| f.controller.is_some()));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn prop_honest_driving_never_corrects(seed in any::<u64>(), latency_ms in 0u64..400) {
            let result = ScenarioRunner::new(seed)
                .with_duration(2.0)
                .with_latency_ms(latency_ms)
                .run(ScenarioId::SnapshotLoss);

            prop_assert_eq!(result.metrics.rejected(), 0);
            prop_assert!(result.metrics.max_correction <= CORRECTION_TOLERANCE);
        }
    }
}
