//! # epidrive - a driver loop for stepped epidemic simulations
//!
//! epidrive runs an opaque stepping engine on a dedicated worker thread and
//! exposes a pausable, backpressured run loop to a consumer across an
//! asynchronous message boundary. On top of the loop it schedules
//! time- and state-triggered interventions ("policies"), applying and
//! reversing their engine effects as the run progresses.
//!
//! ## Core concepts
//!
//! - **Engine**: the external simulation kernel, consumed through
//!   [`SimulationEngine`] and built through [`EngineFactory`]
//! - **Trigger**: a predicate over elapsed steps or a named counter
//! - **Policy**: an intervention with an activation trigger, an engine
//!   effect, and a shutdown condition
//! - **Flow window**: the maximum gap between steps produced and steps
//!   acknowledged before stepping halts
//!
//! ## Usage
//!
//! ```rust,ignore
//! use epidrive::{Command, DriverHandle, RuntimeConfig};
//!
//! let handle = DriverHandle::spawn(Box::new(my_factory), &RuntimeConfig::default());
//! handle.send(Command::Init { config, policies })?;
//! while let Ok(event) = handle.events().recv() {
//!     // render COUNTER_DATA, acknowledge periodically with Command::Ack
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod counter;
pub mod driver;
pub mod engine;
pub mod error;
pub mod flow;
pub mod policy;
pub mod protocol;
pub mod scheduler;
pub mod worker;

// Re-export primary types at crate root for convenience
pub use config::SimulationConfig;
pub use counter::{CounterSnapshot, CATEGORIES};
pub use driver::{Driver, Phase};
pub use engine::{EngineFactory, RawCounters, SimulationEngine};
pub use error::{ConfigError, DriverError, DriverResult, ProtocolError};
pub use flow::{should_continue, ACK_WINDOW};
pub use policy::{
    Policy, PolicyEffect, PolicyId, PolicySpec, Shutdown, Trigger, TriggerContext, TriggerOp,
    TriggerVariable,
};
pub use protocol::{Command, Event};
pub use scheduler::{PolicyEvent, PolicyScheduler};
pub use worker::{DriverHandle, RuntimeConfig};
