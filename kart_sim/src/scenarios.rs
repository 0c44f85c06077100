//! Replication scenarios for the simulator.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Steady slalom over a 100ms link
    Baseline,

    /// Same slalom over a 300ms link
    HighLatency,

    /// 30% of replicated snapshots dropped
    SnapshotLoss,

    /// Controller claims 1.5x the time that actually elapsed
    SpeedHack,

    /// Full throttle into the arena wall
    WallImpact,

    /// Vehicle driven on the authority, watched by observers only
    HostDrive,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Baseline,
            ScenarioId::HighLatency,
            ScenarioId::SnapshotLoss,
            ScenarioId::SpeedHack,
            ScenarioId::WallImpact,
            ScenarioId::HostDrive,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Baseline => "baseline",
            ScenarioId::HighLatency => "high_latency",
            ScenarioId::SnapshotLoss => "snapshot_loss",
            ScenarioId::SpeedHack => "speed_hack",
            ScenarioId::WallImpact => "wall_impact",
            ScenarioId::HostDrive => "host_drive",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Baseline => "Slalom at 100ms latency, prediction must never need correcting",
            ScenarioId::HighLatency => "Slalom at 300ms latency, deep replay on every reconcile",
            ScenarioId::SnapshotLoss => "30% snapshot loss, observers bridge the gaps without teleports",
            ScenarioId::SpeedHack => "Controller forges 1.5x time steps, authority rejects and corrects",
            ScenarioId::WallImpact => "Full throttle into a wall, prediction and authority stop together",
            ScenarioId::HostDrive => "Listen-server vehicle replicated to observers only",
        }
    }

    /// Returns true if the controller in this scenario is cheating.
    pub fn is_adversarial(&self) -> bool {
        matches!(self, ScenarioId::SpeedHack)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "baseline" => Ok(ScenarioId::Baseline),
            "high_latency" | "highlatency" => Ok(ScenarioId::HighLatency),
            "snapshot_loss" | "snapshotloss" => Ok(ScenarioId::SnapshotLoss),
            "speed_hack" | "speedhack" => Ok(ScenarioId::SpeedHack),
            "wall_impact" | "wallimpact" => Ok(ScenarioId::WallImpact),
            "host_drive" | "hostdrive" => Ok(ScenarioId::HostDrive),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
