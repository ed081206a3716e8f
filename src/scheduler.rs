//! Policy scheduler: trigger evaluation and reversal.
//!
//! Holds the pending (active pool) and in-effect (reverse pool)
//! interventions. Both pools are evaluated once per tick in stable insertion
//! order, and every firing is applied within that tick.

use crate::engine::SimulationEngine;
use crate::policy::{Policy, PolicyId, Shutdown, Trigger, TriggerContext, TriggerOp, TriggerVariable};

/// A policy application or reversal that happened during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyEvent {
    /// The policy's effect was applied.
    Applied {
        /// Step the effect was applied at.
        step: u64,
        /// Instance id of the policy.
        id: PolicyId,
        /// Wire label of the policy kind.
        policy: &'static str,
    },
    /// The policy's effect was reversed.
    Reversed {
        /// Step the effect was reversed at.
        step: u64,
        /// Instance id of the policy.
        id: PolicyId,
        /// Wire label of the policy kind.
        policy: &'static str,
    },
}

/// An applied policy awaiting reversal, with its shutdown condition
/// concretized to an absolute trigger.
#[derive(Debug, Clone)]
struct ReverseEntry {
    policy: Policy,
    shutdown: Trigger,
}

/// Holds and evaluates the active and reverse policy pools.
#[derive(Debug, Default)]
pub struct PolicyScheduler {
    active: Vec<Policy>,
    reverse: Vec<ReverseEntry>,
}

impl PolicyScheduler {
    /// A scheduler seeded with `policies` in its active pool.
    #[must_use]
    pub fn new(policies: Vec<Policy>) -> Self {
        Self {
            active: policies,
            reverse: Vec::new(),
        }
    }

    /// Number of policies awaiting activation.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Number of policies in effect awaiting reversal.
    #[must_use]
    pub fn reverse_count(&self) -> usize {
        self.reverse.len()
    }

    /// Evaluate both pools against `ctx`, mutating `engine` through the
    /// matching effect or inverse for every firing.
    ///
    /// Returns the resulting events in firing order: applications first, then
    /// reversals. A policy reversed with a recurrent shutdown returns to the
    /// active pool under its original trigger and is re-evaluated from the
    /// next tick on.
    pub fn evaluate(
        &mut self,
        ctx: &TriggerContext<'_>,
        engine: &mut dyn SimulationEngine,
    ) -> Vec<PolicyEvent> {
        let mut events = Vec::new();

        for policy in std::mem::take(&mut self.active) {
            if policy.trigger.evaluate(ctx) {
                policy.effect.apply(engine);
                events.push(PolicyEvent::Applied {
                    step: ctx.elapsed_steps,
                    id: policy.id,
                    policy: policy.label(),
                });
                match policy.shutdown.clone() {
                    Shutdown::Permanent => {}
                    Shutdown::Duration { value, recurrent } => {
                        let shutdown = concretize_duration(ctx.elapsed_steps, value, recurrent);
                        self.reverse.push(ReverseEntry { policy, shutdown });
                    }
                    Shutdown::Trigger(shutdown) => {
                        self.reverse.push(ReverseEntry { policy, shutdown });
                    }
                }
            } else {
                self.active.push(policy);
            }
        }

        for entry in std::mem::take(&mut self.reverse) {
            if entry.shutdown.evaluate(ctx) {
                entry.policy.effect.undo(engine);
                events.push(PolicyEvent::Reversed {
                    step: ctx.elapsed_steps,
                    id: entry.policy.id,
                    policy: entry.policy.label(),
                });
                if entry.shutdown.recurrent {
                    self.active.push(entry.policy);
                }
            } else {
                self.reverse.push(entry);
            }
        }

        events
    }
}

/// Turn a duration-based shutdown into an absolute elapsed-steps trigger.
///
/// Equality is sound here: elapsed steps advance by exactly one per tick, so
/// `applied_at + duration` is always sampled.
#[allow(clippy::cast_precision_loss)]
fn concretize_duration(applied_at: u64, duration: u64, recurrent: bool) -> Trigger {
    Trigger {
        variable: TriggerVariable::ElapsedSteps,
        operator: TriggerOp::Eq,
        value: (applied_at + duration) as f64,
        recurrent,
    }
}
