//! Counter snapshot builder.
//!
//! Maps the engine's raw per-category counter arrays into named fields for
//! transmission. No logic beyond the fixed name table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::{RawCounters, SimulationEngine};

/// Category names, in the engine's positional order.
pub const CATEGORIES: [&str; 8] = [
    "Susceptible",
    "Infected (Undetected)",
    "Infected (Detected)",
    "Severe",
    "Unattended",
    "Immune (Undetected)",
    "Immune (Detected)",
    "Dead",
];

/// Named counter values plus the per-step report figures.
///
/// Rebuilt on every step; the driver keeps no history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    /// Step this snapshot was taken at.
    pub time: u64,
    /// Cumulative count per category.
    pub absolute: BTreeMap<String, i64>,
    /// Per-step change per category.
    pub daily: BTreeMap<String, i64>,
    /// Hospital capacity figure.
    pub hospital_capacity: f64,
    /// Reproduction number estimate. `None` while the engine has no estimate.
    pub reproduction: Option<f64>,
    /// Serial interval estimate. `None` while the engine has no estimate.
    pub serial_interval: Option<f64>,
}

impl CounterSnapshot {
    /// Build a snapshot of `engine` at step `time`.
    ///
    /// NaN report figures become `None` so the snapshot stays representable
    /// in JSON.
    #[must_use]
    pub fn capture(time: u64, engine: &dyn SimulationEngine) -> Self {
        let RawCounters { absolute, daily } = engine.counters();
        Self {
            time,
            absolute: name_counts(&absolute),
            daily: name_counts(&daily),
            hospital_capacity: engine.hospital_capacity(),
            reproduction: finite(engine.reproduction_estimate()),
            serial_interval: finite(engine.serial_interval_estimate()),
        }
    }
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Zip a raw counter array onto the category name table.
///
/// Missing positions read as zero; positions past the table are ignored.
fn name_counts(raw: &[i64]) -> BTreeMap<String, i64> {
    CATEGORIES
        .iter()
        .enumerate()
        .map(|(i, name)| ((*name).to_string(), raw.get(i).copied().unwrap_or(0)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scripted::{ScriptFrame, ScriptedEngine};

    #[test]
    fn capture_names_every_category() {
        let engine = ScriptedEngine::new(vec![ScriptFrame {
            absolute: vec![10, 1, 2, 3, 4, 5, 6, 7],
            daily: vec![0, 1, 0, 1, 0, 1, 0, 1],
        }])
        .with_reports(1_500.0, 1.2, 4.5);

        let snapshot = CounterSnapshot::capture(0, &engine);
        assert_eq!(snapshot.absolute["Susceptible"], 10);
        assert_eq!(snapshot.absolute["Severe"], 3);
        assert_eq!(snapshot.absolute["Dead"], 7);
        assert_eq!(snapshot.daily["Infected (Undetected)"], 1);
        assert_eq!(snapshot.absolute.len(), CATEGORIES.len());
        assert!((snapshot.hospital_capacity - 1_500.0).abs() < f64::EPSILON);
        assert_eq!(snapshot.reproduction, Some(1.2));
    }

    #[test]
    fn short_arrays_read_as_zero() {
        let engine = ScriptedEngine::new(vec![ScriptFrame {
            absolute: vec![5],
            daily: Vec::new(),
        }]);

        let snapshot = CounterSnapshot::capture(0, &engine);
        assert_eq!(snapshot.absolute["Susceptible"], 5);
        assert_eq!(snapshot.absolute["Dead"], 0);
        assert_eq!(snapshot.daily["Severe"], 0);
    }

    #[test]
    fn nan_reports_become_none() {
        let engine = ScriptedEngine::new(Vec::new());
        let snapshot = CounterSnapshot::capture(0, &engine);
        assert_eq!(snapshot.reproduction, None);
        assert_eq!(snapshot.serial_interval, None);
    }
}
