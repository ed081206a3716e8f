//! The message protocol between the driver's execution context and its
//! consumer.
//!
//! An asynchronous duplex channel: commands flow in, events flow out, and
//! neither side assumes request/response pairing. Envelopes serialize as
//! `{"type": ..., "args": ...}`; the type tags and payload field names are
//! the wire contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::SimulationConfig;
use crate::counter::CounterSnapshot;
use crate::policy::PolicySpec;
use crate::scheduler::PolicyEvent;

/// Inbound envelope: consumer to driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "args", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Ask for the engine's default configuration.
    GetDefaultConfig,
    /// Start (or restart) a run.
    Init {
        /// Engine configuration.
        config: SimulationConfig,
        /// Policies to seed the scheduler with.
        policies: Vec<PolicySpec>,
    },
    /// Suspend stepping.
    Pause,
    /// Resume stepping.
    Resume,
    /// Acknowledge receipt of all counter data up to a step.
    Ack(u64),
}

/// Outbound envelope: driver to consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "args", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    /// Reply to [`Command::GetDefaultConfig`], also sent once at startup.
    DefaultConfig {
        /// The engine's default configuration.
        config: SimulationConfig,
    },
    /// The run started or resumed.
    Started,
    /// The run paused.
    Paused,
    /// One step's counter snapshot.
    CounterData {
        /// Step the snapshot was taken at.
        time: u64,
        /// Cumulative counts per category.
        abs_counter_output: BTreeMap<String, i64>,
        /// Per-step deltas per category.
        day_counter_output: BTreeMap<String, i64>,
        /// Hospital capacity figure.
        hospital_capacity: f64,
        /// Reproduction number estimate; `null` while unavailable.
        day_r: Option<f64>,
        /// Serial interval estimate; `null` while unavailable.
        day_serial: Option<f64>,
    },
    /// A policy's effect was applied this step.
    PolicyApplied {
        /// Step of application.
        time: u64,
        /// Wire label of the policy kind.
        policy: String,
        /// Always `"applied"`.
        event: String,
    },
    /// A policy's effect was reversed this step.
    PolicyReversed {
        /// Step of reversal.
        time: u64,
        /// Wire label of the policy kind.
        policy: String,
        /// Always `"reversed"`.
        event: String,
    },
    /// The engine rejected the `INIT` configuration; no run was started.
    ConfigError {
        /// Human-readable rejection reason.
        message: String,
    },
}

impl Event {
    /// Build a `COUNTER_DATA` envelope from a snapshot.
    #[must_use]
    pub fn counter_data(snapshot: CounterSnapshot) -> Self {
        Self::CounterData {
            time: snapshot.time,
            abs_counter_output: snapshot.absolute,
            day_counter_output: snapshot.daily,
            hospital_capacity: snapshot.hospital_capacity,
            day_r: snapshot.reproduction,
            day_serial: snapshot.serial_interval,
        }
    }
}

impl From<PolicyEvent> for Event {
    fn from(event: PolicyEvent) -> Self {
        match event {
            PolicyEvent::Applied { step, policy, .. } => Self::PolicyApplied {
                time: step,
                policy: policy.to_string(),
                event: "applied".to_string(),
            },
            PolicyEvent::Reversed { step, policy, .. } => Self::PolicyReversed {
                time: step,
                policy: policy.to_string(),
                event: "reversed".to_string(),
            },
        }
    }
}
