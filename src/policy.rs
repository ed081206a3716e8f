//! Policies: activation triggers, shutdown conditions, and intervention
//! effects.
//!
//! These types are intentionally serializable so a consumer can ship its
//! policy list across the message boundary at `INIT` time. Field names and
//! kind labels are the wire contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::counter::CATEGORIES;
use crate::engine::SimulationEngine;
use crate::error::ConfigError;

/// Unique identifier for a policy instance.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(Uuid);

impl PolicyId {
    /// Create a new random policy id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for PolicyId {
    fn default() -> Self {
        Self::new()
    }
}

/// Comparison operator of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerOp {
    /// Fires while the variable is at or above the threshold.
    #[serde(rename = ">=")]
    Ge,
    /// Fires while the variable is at or below the threshold.
    #[serde(rename = "<=")]
    Le,
    /// Fires when the variable equals the threshold exactly.
    ///
    /// Only valid for variables advancing in unit steps; anything else can
    /// cross the threshold between two discrete ticks without ever equaling
    /// it.
    #[serde(rename = "==")]
    Eq,
}

impl TriggerOp {
    #[allow(clippy::float_cmp)] // Eq is restricted to integral unit-step values.
    fn compare(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Ge => lhs >= rhs,
            Self::Le => lhs <= rhs,
            Self::Eq => lhs == rhs,
        }
    }
}

/// What a trigger compares against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TriggerVariable {
    /// The elapsed step count, wire name `time`.
    ElapsedSteps,
    /// A named absolute counter category.
    Counter(String),
}

impl From<String> for TriggerVariable {
    fn from(name: String) -> Self {
        if name == "time" {
            Self::ElapsedSteps
        } else {
            Self::Counter(name)
        }
    }
}

impl From<TriggerVariable> for String {
    fn from(variable: TriggerVariable) -> Self {
        match variable {
            TriggerVariable::ElapsedSteps => "time".to_string(),
            TriggerVariable::Counter(name) => name,
        }
    }
}

impl TriggerVariable {
    /// Wire name of this variable.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::ElapsedSteps => "time",
            Self::Counter(name) => name,
        }
    }
}

/// The comparison context a trigger is evaluated against: the elapsed step
/// count plus the current absolute counters.
#[derive(Debug, Clone, Copy)]
pub struct TriggerContext<'a> {
    /// Steps taken so far in this run.
    pub elapsed_steps: u64,
    /// Absolute counter values, keyed by category name.
    pub counters: &'a BTreeMap<String, i64>,
}

impl TriggerContext<'_> {
    /// Look up the current value of `variable`, if it names anything here.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // step counts and populations stay far below 2^53
    pub fn value_of(&self, variable: &TriggerVariable) -> Option<f64> {
        match variable {
            TriggerVariable::ElapsedSteps => Some(self.elapsed_steps as f64),
            TriggerVariable::Counter(name) => self.counters.get(name).map(|v| *v as f64),
        }
    }
}

/// A predicate over run state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    /// Variable compared.
    pub variable: TriggerVariable,
    /// Comparison operator.
    pub operator: TriggerOp,
    /// Threshold value.
    pub value: f64,
    /// Whether a policy reversed by this trigger rearms afterwards.
    /// Meaningful on shutdown triggers only.
    #[serde(default)]
    pub recurrent: bool,
}

impl Trigger {
    /// Evaluate this trigger against `ctx`.
    ///
    /// Precondition: the variable was validated against the category table at
    /// run initialization. An unknown variable here is a defect, not a
    /// runtime condition.
    #[must_use]
    pub fn evaluate(&self, ctx: &TriggerContext<'_>) -> bool {
        let current = ctx
            .value_of(&self.variable)
            .expect("trigger variables are validated before a run starts");
        self.operator.compare(current, self.value)
    }
}

/// When a policy's effect ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ShutdownSpec", into = "ShutdownSpec")]
pub enum Shutdown {
    /// The effect lasts for the remainder of the run.
    Permanent,
    /// The effect ends a fixed number of steps after it was applied.
    Duration {
        /// How many steps the effect stays active.
        value: u64,
        /// Whether the policy rearms after reversal.
        recurrent: bool,
    },
    /// The effect ends when an absolute trigger fires.
    Trigger(Trigger),
}

/// Wire shape of a shutdown condition: a trigger object whose `variable` may
/// also be the keyword `permanent` or `duration`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ShutdownSpec {
    variable: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    operator: Option<TriggerOp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<f64>,
    #[serde(default)]
    recurrent: bool,
}

impl TryFrom<ShutdownSpec> for Shutdown {
    type Error = ConfigError;

    fn try_from(spec: ShutdownSpec) -> Result<Self, ConfigError> {
        match spec.variable.as_str() {
            "permanent" => Ok(Self::Permanent),
            "duration" => {
                let value = spec.value.ok_or_else(|| ConfigError::InvalidShutdown {
                    reason: "duration shutdown requires a value".to_string(),
                })?;
                if value < 0.0 || value.fract() != 0.0 {
                    return Err(ConfigError::InvalidShutdown {
                        reason: format!("duration must be a non-negative whole number of steps, got {value}"),
                    });
                }
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                Ok(Self::Duration {
                    value: value as u64,
                    recurrent: spec.recurrent,
                })
            }
            _ => {
                let operator = spec.operator.ok_or_else(|| ConfigError::InvalidShutdown {
                    reason: format!("shutdown trigger on '{}' requires an operator", spec.variable),
                })?;
                let value = spec.value.ok_or_else(|| ConfigError::InvalidShutdown {
                    reason: format!("shutdown trigger on '{}' requires a value", spec.variable),
                })?;
                Ok(Self::Trigger(Trigger {
                    variable: TriggerVariable::from(spec.variable),
                    operator,
                    value,
                    recurrent: spec.recurrent,
                }))
            }
        }
    }
}

impl From<Shutdown> for ShutdownSpec {
    fn from(shutdown: Shutdown) -> Self {
        match shutdown {
            Shutdown::Permanent => Self {
                variable: "permanent".to_string(),
                operator: None,
                value: None,
                recurrent: false,
            },
            #[allow(clippy::cast_precision_loss)]
            Shutdown::Duration { value, recurrent } => Self {
                variable: "duration".to_string(),
                operator: None,
                value: Some(value as f64),
                recurrent,
            },
            Shutdown::Trigger(trigger) => Self {
                variable: String::from(trigger.variable),
                operator: Some(trigger.operator),
                value: Some(trigger.value),
                recurrent: trigger.recurrent,
            },
        }
    }
}

/// An intervention kind together with its typed effect data.
///
/// Serialized adjacently tagged so the wire shape stays
/// `{"kind": "...", "effectData": {...}}`.
///
/// The reduction fields carry kebab-case wire names; the remaining effect
/// data keys are snake_case on the wire as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "effectData", rename_all = "kebab-case")]
pub enum PolicyEffect {
    /// Close a fraction of workplaces.
    ShutWorkplaces {
        /// Fraction of workplaces closed.
        workplaces: f64,
    },
    /// Reduce infectivity of undetected cases at workplaces and in the world
    /// graph.
    SocialDistancing {
        /// Infectivity reduction at workplaces, in `[0, 1]`.
        #[serde(rename = "workplace-reduction")]
        workplace_reduction: f64,
        /// Infectivity reduction in world contacts, in `[0, 1]`.
        #[serde(rename = "world-reduction")]
        world_reduction: f64,
    },
    /// Sever a fraction of world-graph connections.
    Lockdown {
        /// Fraction of connections cut.
        connections_cut_fraction: f64,
    },
    /// Cap the number of daily contact-tracing tests.
    ContactTracing {
        /// Maximum tests per day.
        max_daily_tests: u32,
    },
    /// Reduce infectivity of detected cases across all contact layers.
    EnhancedSelfIsolation {
        /// Infectivity reduction within households, in `[0, 1]`.
        #[serde(rename = "household-reduction")]
        household_reduction: f64,
        /// Infectivity reduction at workplaces, in `[0, 1]`.
        #[serde(rename = "workplace-reduction")]
        workplace_reduction: f64,
        /// Infectivity reduction in world contacts, in `[0, 1]`.
        #[serde(rename = "world-reduction")]
        world_reduction: f64,
    },
}

enum Direction {
    Apply,
    Undo,
}

impl PolicyEffect {
    /// Wire label of this kind.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::ShutWorkplaces { .. } => "shut-workplaces",
            Self::SocialDistancing { .. } => "social-distancing",
            Self::Lockdown { .. } => "lockdown",
            Self::ContactTracing { .. } => "contact-tracing",
            Self::EnhancedSelfIsolation { .. } => "enhanced-self-isolation",
        }
    }

    /// Apply this effect to `engine`.
    pub fn apply(&self, engine: &mut dyn SimulationEngine) {
        self.drive(engine, &Direction::Apply);
    }

    /// Apply the structural inverse of this effect to `engine`.
    pub fn undo(&self, engine: &mut dyn SimulationEngine) {
        self.drive(engine, &Direction::Undo);
    }

    // Apply and inverse are adjacent arms of one dispatch per kind, so the
    // pair cannot drift apart.
    fn drive(&self, engine: &mut dyn SimulationEngine, direction: &Direction) {
        match self {
            Self::ShutWorkplaces { workplaces } => match direction {
                Direction::Apply => engine.close_workplaces(*workplaces),
                Direction::Undo => engine.reopen_workplaces(*workplaces),
            },
            Self::SocialDistancing {
                workplace_reduction,
                world_reduction,
            } => {
                let workplace_factor = 1.0 - workplace_reduction;
                let world_factor = 1.0 - world_reduction;
                match direction {
                    Direction::Apply => {
                        engine.scale_undetected_workplace_infectivity(workplace_factor);
                        engine.scale_undetected_world_infectivity(world_factor);
                    }
                    Direction::Undo => {
                        engine.unscale_undetected_workplace_infectivity(workplace_factor);
                        engine.unscale_undetected_world_infectivity(world_factor);
                    }
                }
            }
            Self::Lockdown {
                connections_cut_fraction,
            } => match direction {
                Direction::Apply => engine.cut_world_connections(*connections_cut_fraction),
                Direction::Undo => engine.restore_world_connections(*connections_cut_fraction),
            },
            Self::ContactTracing { max_daily_tests } => match direction {
                Direction::Apply => engine.set_contact_tracing_limit(*max_daily_tests),
                Direction::Undo => engine.clear_contact_tracing_limit(*max_daily_tests),
            },
            Self::EnhancedSelfIsolation {
                household_reduction,
                workplace_reduction,
                world_reduction,
            } => {
                let household_factor = 1.0 - household_reduction;
                let workplace_factor = 1.0 - workplace_reduction;
                let world_factor = 1.0 - world_reduction;
                match direction {
                    Direction::Apply => {
                        engine.scale_detected_household_infectivity(household_factor);
                        engine.scale_detected_workplace_infectivity(workplace_factor);
                        engine.scale_detected_world_infectivity(world_factor);
                    }
                    Direction::Undo => {
                        engine.unscale_detected_household_infectivity(household_factor);
                        engine.unscale_detected_workplace_infectivity(workplace_factor);
                        engine.unscale_detected_world_infectivity(world_factor);
                    }
                }
            }
        }
    }
}

/// Consumer-supplied policy definition, as carried by `INIT`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySpec {
    /// Intervention kind and effect data.
    #[serde(flatten)]
    pub effect: PolicyEffect,
    /// Activation trigger.
    pub trigger: Trigger,
    /// Shutdown condition.
    pub shutdown: Shutdown,
}

/// A policy instance created at run initialization.
///
/// Immutable after creation except for its position in the scheduler's pools.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    /// Opaque instance id.
    pub id: PolicyId,
    /// Intervention kind and effect data.
    pub effect: PolicyEffect,
    /// Activation trigger.
    pub trigger: Trigger,
    /// Shutdown condition.
    pub shutdown: Shutdown,
}

impl Policy {
    /// Instantiate a policy from its wire spec.
    #[must_use]
    pub fn from_spec(spec: PolicySpec) -> Self {
        Self {
            id: PolicyId::new(),
            effect: spec.effect,
            trigger: spec.trigger,
            shutdown: spec.shutdown,
        }
    }

    /// Wire label of this policy's kind.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        self.effect.label()
    }
}

/// Validate a policy list before a run starts.
///
/// Rejects unknown trigger variables and equality operators on variables that
/// do not advance in unit steps. The scheduler itself trusts this validation;
/// passing it unvalidated policies is a contract violation.
///
/// # Errors
///
/// Returns the first [`ConfigError`] found, in policy order.
pub fn validate_policies(specs: &[PolicySpec]) -> Result<(), ConfigError> {
    for spec in specs {
        validate_trigger(&spec.trigger)?;
        if let Shutdown::Trigger(trigger) = &spec.shutdown {
            validate_trigger(trigger)?;
        }
    }
    Ok(())
}

fn validate_trigger(trigger: &Trigger) -> Result<(), ConfigError> {
    if let TriggerVariable::Counter(name) = &trigger.variable {
        if !CATEGORIES.contains(&name.as_str()) {
            return Err(ConfigError::UnknownTriggerVariable {
                variable: name.clone(),
            });
        }
        if trigger.operator == TriggerOp::Eq {
            return Err(ConfigError::EqualityOnNonUnitVariable {
                variable: name.clone(),
            });
        }
    }
    Ok(())
}
