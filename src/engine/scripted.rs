//! Deterministic scripted engine for tests and demos.
//!
//! Plays back a fixed sequence of counter frames and records every mutator
//! call, so driver behavior can be asserted without a real epidemiological
//! model behind it.

use std::sync::{Arc, Mutex};

use crate::config::SimulationConfig;
use crate::counter::CATEGORIES;
use crate::engine::{EngineFactory, RawCounters, SimulationEngine};
use crate::error::ConfigError;

/// One step's worth of scripted counter data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptFrame {
    /// Cumulative counts, positionally mapped to [`CATEGORIES`].
    pub absolute: Vec<i64>,
    /// Per-step deltas, positionally mapped to [`CATEGORIES`].
    pub daily: Vec<i64>,
}

impl ScriptFrame {
    /// A frame with every category zero except `Severe` set to `severe`.
    #[must_use]
    pub fn with_severe(severe: i64) -> Self {
        let mut absolute = vec![0; CATEGORIES.len()];
        absolute[3] = severe;
        Self {
            absolute,
            daily: vec![0; CATEGORIES.len()],
        }
    }
}

/// A mutator invocation recorded by the scripted engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Name of the mutator that was invoked.
    pub method: &'static str,
    /// The payload value it was invoked with.
    pub value: f64,
}

/// Shared view of the calls made against scripted engines.
pub type CallLog = Arc<Mutex<Vec<RecordedCall>>>;

/// Scripted [`SimulationEngine`].
///
/// Step `n` reports the script's frame `n`; past the end of the script the
/// last frame repeats. An empty script reports all-zero counters.
#[derive(Debug)]
pub struct ScriptedEngine {
    script: Vec<ScriptFrame>,
    elapsed: u64,
    hospital_capacity: f64,
    day_r: f64,
    day_serial: f64,
    calls: CallLog,
}

impl ScriptedEngine {
    /// Create an engine playing back `script`.
    #[must_use]
    pub fn new(script: Vec<ScriptFrame>) -> Self {
        Self {
            script,
            elapsed: 0,
            hospital_capacity: 0.0,
            day_r: f64::NAN,
            day_serial: f64::NAN,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the constant report figures this engine returns.
    #[must_use]
    pub fn with_reports(mut self, hospital_capacity: f64, day_r: f64, day_serial: f64) -> Self {
        self.hospital_capacity = hospital_capacity;
        self.day_r = day_r;
        self.day_serial = day_serial;
        self
    }

    /// Shared handle to the mutator call log.
    #[must_use]
    pub fn call_log(&self) -> CallLog {
        Arc::clone(&self.calls)
    }

    fn frame(&self) -> ScriptFrame {
        let idx = usize::try_from(self.elapsed).unwrap_or(usize::MAX);
        self.script
            .get(idx)
            .or_else(|| self.script.last())
            .cloned()
            .unwrap_or_default()
    }

    fn record(&mut self, method: &'static str, value: f64) {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(RecordedCall { method, value });
    }
}

impl SimulationEngine for ScriptedEngine {
    fn step(&mut self) {
        self.elapsed += 1;
    }

    fn elapsed_steps(&self) -> u64 {
        self.elapsed
    }

    fn counters(&self) -> RawCounters {
        let frame = self.frame();
        RawCounters {
            absolute: frame.absolute,
            daily: frame.daily,
        }
    }

    fn hospital_capacity(&self) -> f64 {
        self.hospital_capacity
    }

    fn reproduction_estimate(&self) -> f64 {
        self.day_r
    }

    fn serial_interval_estimate(&self) -> f64 {
        self.day_serial
    }

    fn close_workplaces(&mut self, fraction: f64) {
        self.record("close_workplaces", fraction);
    }

    fn reopen_workplaces(&mut self, fraction: f64) {
        self.record("reopen_workplaces", fraction);
    }

    fn scale_undetected_workplace_infectivity(&mut self, factor: f64) {
        self.record("scale_undetected_workplace_infectivity", factor);
    }

    fn unscale_undetected_workplace_infectivity(&mut self, factor: f64) {
        self.record("unscale_undetected_workplace_infectivity", factor);
    }

    fn scale_undetected_world_infectivity(&mut self, factor: f64) {
        self.record("scale_undetected_world_infectivity", factor);
    }

    fn unscale_undetected_world_infectivity(&mut self, factor: f64) {
        self.record("unscale_undetected_world_infectivity", factor);
    }

    fn cut_world_connections(&mut self, fraction: f64) {
        self.record("cut_world_connections", fraction);
    }

    fn restore_world_connections(&mut self, fraction: f64) {
        self.record("restore_world_connections", fraction);
    }

    fn set_contact_tracing_limit(&mut self, max_daily_tests: u32) {
        self.record("set_contact_tracing_limit", f64::from(max_daily_tests));
    }

    fn clear_contact_tracing_limit(&mut self, max_daily_tests: u32) {
        self.record("clear_contact_tracing_limit", f64::from(max_daily_tests));
    }

    fn scale_detected_household_infectivity(&mut self, factor: f64) {
        self.record("scale_detected_household_infectivity", factor);
    }

    fn unscale_detected_household_infectivity(&mut self, factor: f64) {
        self.record("unscale_detected_household_infectivity", factor);
    }

    fn scale_detected_workplace_infectivity(&mut self, factor: f64) {
        self.record("scale_detected_workplace_infectivity", factor);
    }

    fn unscale_detected_workplace_infectivity(&mut self, factor: f64) {
        self.record("unscale_detected_workplace_infectivity", factor);
    }

    fn scale_detected_world_infectivity(&mut self, factor: f64) {
        self.record("scale_detected_world_infectivity", factor);
    }

    fn unscale_detected_world_infectivity(&mut self, factor: f64) {
        self.record("unscale_detected_world_infectivity", factor);
    }
}

/// Factory producing [`ScriptedEngine`]s that share one call log.
#[derive(Debug)]
pub struct ScriptedFactory {
    script: Vec<ScriptFrame>,
    default_config: SimulationConfig,
    reject_reason: Option<String>,
    hospital_capacity: f64,
    day_r: f64,
    day_serial: f64,
    calls: CallLog,
}

impl ScriptedFactory {
    /// A factory whose engines play back `script`.
    #[must_use]
    pub fn new(script: Vec<ScriptFrame>) -> Self {
        Self {
            script,
            default_config: SimulationConfig::default(),
            reject_reason: None,
            hospital_capacity: 0.0,
            day_r: f64::NAN,
            day_serial: f64::NAN,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A factory that rejects every configuration with `reason`.
    #[must_use]
    pub fn rejecting(reason: &str) -> Self {
        let mut factory = Self::new(Vec::new());
        factory.reject_reason = Some(reason.to_string());
        factory
    }

    /// Set the constant report figures produced engines return.
    #[must_use]
    pub fn with_reports(mut self, hospital_capacity: f64, day_r: f64, day_serial: f64) -> Self {
        self.hospital_capacity = hospital_capacity;
        self.day_r = day_r;
        self.day_serial = day_serial;
        self
    }

    /// Shared handle to the mutator call log of every engine this factory
    /// has built.
    #[must_use]
    pub fn call_log(&self) -> CallLog {
        Arc::clone(&self.calls)
    }
}

impl EngineFactory for ScriptedFactory {
    fn default_config(&self) -> SimulationConfig {
        self.default_config.clone()
    }

    fn build(&self, _config: &SimulationConfig) -> Result<Box<dyn SimulationEngine>, ConfigError> {
        if let Some(reason) = &self.reject_reason {
            return Err(ConfigError::EngineRejected {
                reason: reason.clone(),
            });
        }

        let mut engine = ScriptedEngine::new(self.script.clone()).with_reports(
            self.hospital_capacity,
            self.day_r,
            self.day_serial,
        );
        engine.calls = Arc::clone(&self.calls);
        Ok(Box::new(engine))
    }
}
