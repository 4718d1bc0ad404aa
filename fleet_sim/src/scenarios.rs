//! Fleet simulation scenarios.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// FLT-001: steady 1x patrol, invariants checked every tick
    Patrol,

    /// FLT-002: 10x and random multipliers, no arrival oscillation
    TimeWarp,

    /// FLT-003: a drained vessel charges and returns to survey
    Depletion,

    /// FLT-004: bulk reset racing concurrent ticks
    ResetRace,

    /// FLT-005: persisted state survives a process restart
    Restart,
}

impl ScenarioId {
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Patrol,
            ScenarioId::TimeWarp,
            ScenarioId::Depletion,
            ScenarioId::ResetRace,
            ScenarioId::Restart,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Patrol => "patrol",
            ScenarioId::TimeWarp => "time_warp",
            ScenarioId::Depletion => "depletion",
            ScenarioId::ResetRace => "reset_race",
            ScenarioId::Restart => "restart",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Patrol => "Four vessels at 1x; every state invariant holds after every tick",
            ScenarioId::TimeWarp => "10x then seeded random multipliers; waypoints only ever advance",
            ScenarioId::Depletion => "Vessel forced to low energy charges on station, then resumes",
            ScenarioId::ResetRace => "Reset interleaved with ticks; no pre-reset snapshot is written back",
            ScenarioId::Restart => "Reopen the store mid-run; ticks resume from persisted rows",
        }
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
            "patrol" | "flt-001" => Ok(ScenarioId::Patrol),
            "time_warp" | "timewarp" | "flt-002" => Ok(ScenarioId::TimeWarp),
            "depletion" | "flt-003" => Ok(ScenarioId::Depletion),
            "reset_race" | "resetrace" | "flt-004" => Ok(ScenarioId::ResetRace),
            "restart" | "flt-005" => Ok(ScenarioId::Restart),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for id in ScenarioId::all() {
            assert_eq!(id.name().parse::<ScenarioId>(), Ok(id));
            assert!(!id.description().is_empty());
        }
        assert_eq!("FLT-004".parse::<ScenarioId>(), Ok(ScenarioId::ResetRace));
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }
}
