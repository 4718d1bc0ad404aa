//! JSON frame exporter for offline replay of a scenario.

use fleet_core::{VesselState, VesselStatus};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Virtual time in seconds
    pub time_sec: f64,

    pub tick: u64,

    /// Multiplier in effect for this tick
    pub multiplier: f64,

    pub vessels: Vec<VesselFrame>,

    /// Events (resets, status changes, restarts)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub events: Vec<SimEvent>,
}

/// One vessel's position and status in a frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VesselFrame {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub heading: f64,
    pub energy_level: f64,
    pub status: VesselStatus,
    pub waypoint_index: u32,
}

impl From<&VesselState> for VesselFrame {
    fn from(state: &VesselState) -> Self {
        Self {
            id: state.vessel_id.to_string(),
            latitude: state.latitude,
            longitude: state.longitude,
            heading: state.heading,
            energy_level: state.energy_level,
            status: state.status,
            waypoint_index: state.current_waypoint_index,
        }
    }
}

/// Simulation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
}

impl SimEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    pub scenario: String,
    pub seed: u64,
    pub duration_sec: f64,
    pub frames: Vec<SimFrame>,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    /// Writes to a JSON file.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

/// Collects frames every `every` ticks while a scenario runs.
#[derive(Debug, Default)]
pub struct FrameRecorder {
    every: Option<u64>,
    frames: Vec<SimFrame>,
    pending_events: Vec<SimEvent>,
}

impl FrameRecorder {
    /// A recorder that keeps nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn every(ticks: u64) -> Self {
        Self {
            every: Some(ticks.max(1)),
            ..Self::default()
        }
    }

    /// Queues an event for the next recorded frame.
    pub fn event(&mut self, message: impl Into<String>) {
        if self.every.is_some() {
            self.pending_events.push(SimEvent::info(message));
        }
    }

    pub fn record(&mut self, tick: u64, time_sec: f64, multiplier: f64, states: &[VesselState]) {
        let Some(every) = self.every else {
            return;
        };
        if tick % every != 0 {
            return;
        }
        self.frames.push(SimFrame {
            time_sec,
            tick,
            multiplier,
            vessels: states.iter().map(VesselFrame::from).collect(),
            events: std::mem::take(&mut self.pending_events),
        });
    }

    pub fn into_frames(self) -> Vec<SimFrame> {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::FleetSeed;

    fn states() -> Vec<VesselState> {
        FleetSeed::default_fleet()
            .vessels
            .iter()
            .map(|v| v.baseline.to_state(v.vessel.id.clone(), 0, 0))
            .collect()
    }

    #[test]
    fn test_recorder_samples_every_n_ticks() {
        let mut recorder = FrameRecorder::every(5);
        recorder.event("reset");
        for tick in 1..=12 {
            recorder.record(tick, tick as f64 * 60.0, 1.0, &states());
        }
        let frames = recorder.into_frames();
        assert_eq!(frames.iter().map(|f| f.tick).collect::<Vec<_>>(), vec![5, 10]);
        assert_eq!(frames[0].events.len(), 1);
        assert!(frames[1].events.is_empty());
        assert_eq!(frames[0].vessels.len(), 4);
    }

    #[test]
    fn test_disabled_recorder_keeps_nothing() {
        let mut recorder = FrameRecorder::disabled();
        recorder.event("ignored");
        recorder.record(0, 0.0, 1.0, &states());
        assert!(recorder.into_frames().is_empty());
    }

    #[test]
    fn test_export_writes_json() {
        let mut export = SimExport::new("patrol", 42);
        let mut recorder = FrameRecorder::every(1);
        recorder.event("reset 4 vessels");
        recorder.record(1, 60.0, 1.0, &states());
        for frame in recorder.into_frames() {
            export.add_frame(frame);
        }
        export.finalize(true, None);

        let path = std::env::temp_dir().join(format!("fleet-export-{}.json", std::process::id()));
        export.write_to_file(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["scenario"], "patrol");
        assert_eq!(parsed["duration_sec"], 60.0);
        assert_eq!(parsed["frames"][0]["vessels"][0]["id"], "vessel-001");
        assert_eq!(
            parsed["frames"][0]["events"][0],
            serde_json::json!({ "message": "reset 4 vessels" })
        );
        assert!(parsed.get("failure_reason").is_none());
        let _ = std::fs::remove_file(&path);
    }
}
