//! Boundary traits for the stepping engine.
//!
//! The driver never looks inside the epidemiological model. Everything it
//! needs is expressed here: step once, read counters and report figures, and
//! apply or reverse intervention effects through structurally paired mutators.

pub mod scripted;

use crate::config::SimulationConfig;
use crate::error::ConfigError;

/// Raw per-category counter arrays as the engine reports them.
///
/// Both arrays are positionally mapped onto [`crate::counter::CATEGORIES`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCounters {
    /// Cumulative population count per category.
    pub absolute: Vec<i64>,
    /// Net change per category since the previous step.
    pub daily: Vec<i64>,
}

/// The opaque stepping engine consumed by the driver.
///
/// Each intervention mutator comes with its structural inverse; the driver
/// guarantees that an inverse is only invoked with the same payload its apply
/// counterpart received.
pub trait SimulationEngine: Send {
    /// Advance the simulation by one step.
    fn step(&mut self);

    /// Number of steps taken since construction.
    fn elapsed_steps(&self) -> u64;

    /// Current counter arrays.
    fn counters(&self) -> RawCounters;

    /// Hospital capacity figure for the current step.
    fn hospital_capacity(&self) -> f64;

    /// Reproduction number estimate. May be NaN early in a run.
    fn reproduction_estimate(&self) -> f64;

    /// Serial interval estimate. May be NaN early in a run.
    fn serial_interval_estimate(&self) -> f64;

    /// Close the given fraction of workplaces.
    fn close_workplaces(&mut self, fraction: f64);
    /// Reverse of [`Self::close_workplaces`].
    fn reopen_workplaces(&mut self, fraction: f64);

    /// Scale infectivity of undetected cases at workplaces.
    fn scale_undetected_workplace_infectivity(&mut self, factor: f64);
    /// Reverse of [`Self::scale_undetected_workplace_infectivity`].
    fn unscale_undetected_workplace_infectivity(&mut self, factor: f64);

    /// Scale infectivity of undetected cases in world contacts.
    fn scale_undetected_world_infectivity(&mut self, factor: f64);
    /// Reverse of [`Self::scale_undetected_world_infectivity`].
    fn unscale_undetected_world_infectivity(&mut self, factor: f64);

    /// Sever the given fraction of world-graph connections.
    fn cut_world_connections(&mut self, fraction: f64);
    /// Reverse of [`Self::cut_world_connections`].
    fn restore_world_connections(&mut self, fraction: f64);

    /// Cap daily contact-tracing tests.
    fn set_contact_tracing_limit(&mut self, max_daily_tests: u32);
    /// Reverse of [`Self::set_contact_tracing_limit`].
    fn clear_contact_tracing_limit(&mut self, max_daily_tests: u32);

    /// Scale infectivity of detected cases within households.
    fn scale_detected_household_infectivity(&mut self, factor: f64);
    /// Reverse of [`Self::scale_detected_household_infectivity`].
    fn unscale_detected_household_infectivity(&mut self, factor: f64);

    /// Scale infectivity of detected cases at workplaces.
    fn scale_detected_workplace_infectivity(&mut self, factor: f64);
    /// Reverse of [`Self::scale_detected_workplace_infectivity`].
    fn unscale_detected_workplace_infectivity(&mut self, factor: f64);

    /// Scale infectivity of detected cases in world contacts.
    fn scale_detected_world_infectivity(&mut self, factor: f64);
    /// Reverse of [`Self::scale_detected_world_infectivity`].
    fn unscale_detected_world_infectivity(&mut self, factor: f64);
}

/// Constructs engines for the driver.
///
/// The driver holds one factory for its lifetime and builds a fresh engine on
/// every `INIT`; the previous engine, if any, is discarded wholesale.
pub trait EngineFactory: Send {
    /// The configuration offered to consumers asking for defaults.
    fn default_config(&self) -> SimulationConfig;

    /// Build an engine for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EngineRejected`] when the configuration is not
    /// acceptable. The driver surfaces this to the consumer and does not
    /// start a run.
    fn build(&self, config: &SimulationConfig) -> Result<Box<dyn SimulationEngine>, ConfigError>;
}
