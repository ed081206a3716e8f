//! Run configuration for the simulation engine.

use serde::{Deserialize, Serialize};

/// Knobs handed to the engine at construction time.
///
/// The driver treats this as an opaque payload: range validation is the
/// engine's job, and a rejection at build time is surfaced to the consumer as
/// a fatal configuration error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Approximate number of simulated individuals.
    pub total_population: u64,
    /// Number of workplace sites individuals are assigned to.
    pub workplaces: u64,
    /// Probability that an individual starts the run infected.
    pub initial_infected_chance: f64,
    /// Connection density within a workplace, in `[0, 1]`.
    pub workplace_connectivity: f64,
    /// Average number of random world-graph contacts per individual.
    pub average_world_connections: u64,
    /// Hospital capacity reported alongside counter snapshots.
    pub hospital_beds: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            total_population: 300_000,
            workplaces: 2_000,
            initial_infected_chance: 0.0001,
            workplace_connectivity: 0.8,
            average_world_connections: 100,
            hospital_beds: 1_500,
        }
    }
}
