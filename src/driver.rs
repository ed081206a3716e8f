//! The driver loop state machine.
//!
//! Ties stepping, snapshotting, flow control and policy evaluation into one
//! per-tick unit of work. All mutable run state lives in one explicit value
//! owned here, including the pending-tick flag, so a pause can always cancel
//! deterministically. Scheduling itself is the worker's job: the driver only
//! records whether a tick is due.

use crate::config::SimulationConfig;
use crate::counter::CounterSnapshot;
use crate::engine::{EngineFactory, SimulationEngine};
use crate::flow;
use crate::policy::{self, Policy, PolicySpec, TriggerContext};
use crate::protocol::{Command, Event};
use crate::scheduler::PolicyScheduler;

/// Lifecycle phase of the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No run yet, or the last `INIT` was rejected.
    Idle,
    /// Stepping (possibly halted by flow control).
    Running,
    /// Suspended by the consumer.
    Paused,
}

/// Per-run mutable state. Created on `INIT`, replaced wholesale on re-`INIT`.
struct Run {
    engine: Box<dyn SimulationEngine>,
    scheduler: PolicyScheduler,
    elapsed_steps: u64,
    last_acknowledged_step: u64,
    queue_suppressed: bool,
    tick_scheduled: bool,
}

/// The lifecycle state machine driving one simulation run at a time.
///
/// Commands and ticks both return the events to emit, in order; the caller
/// (normally the [`crate::worker`] loop) forwards them to the consumer.
pub struct Driver {
    factory: Box<dyn EngineFactory>,
    phase: Phase,
    run: Option<Run>,
}

impl Driver {
    /// A driver building engines through `factory`.
    #[must_use]
    pub fn new(factory: Box<dyn EngineFactory>) -> Self {
        Self {
            factory,
            phase: Phase::Idle,
            run: None,
        }
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Steps taken in the current run.
    #[must_use]
    pub fn elapsed_steps(&self) -> u64 {
        self.run.as_ref().map_or(0, |run| run.elapsed_steps)
    }

    /// Whether flow control has halted stepping.
    #[must_use]
    pub fn queue_suppressed(&self) -> bool {
        self.run.as_ref().is_some_and(|run| run.queue_suppressed)
    }

    /// Whether a tick is due. At most one tick is ever pending.
    #[must_use]
    pub fn tick_pending(&self) -> bool {
        self.phase == Phase::Running && self.run.as_ref().is_some_and(|run| run.tick_scheduled)
    }

    /// Dispatch one consumer command.
    pub fn handle(&mut self, command: Command) -> Vec<Event> {
        match command {
            Command::GetDefaultConfig => vec![Event::DefaultConfig {
                config: self.factory.default_config(),
            }],
            Command::Init { config, policies } => self.initialize(&config, policies),
            Command::Pause => self.pause(),
            Command::Resume => self.resume(),
            Command::Ack(step) => self.acknowledge(step),
        }
    }

    /// Start a fresh run, discarding any previous one.
    ///
    /// On rejection (invalid policies or engine refusing the configuration)
    /// the driver reports the error and returns to idle: no `STARTED`, no
    /// run.
    fn initialize(&mut self, config: &SimulationConfig, policies: Vec<PolicySpec>) -> Vec<Event> {
        self.phase = Phase::Idle;
        self.run = None;

        if let Err(err) = policy::validate_policies(&policies) {
            return vec![Event::ConfigError {
                message: err.to_string(),
            }];
        }
        let engine = match self.factory.build(config) {
            Ok(engine) => engine,
            Err(err) => {
                return vec![Event::ConfigError {
                    message: err.to_string(),
                }]
            }
        };

        let scheduler = PolicyScheduler::new(policies.into_iter().map(Policy::from_spec).collect());
        let run = Run {
            engine,
            scheduler,
            elapsed_steps: 0,
            last_acknowledged_step: 0,
            queue_suppressed: false,
            tick_scheduled: true,
        };
        let snapshot = CounterSnapshot::capture(0, run.engine.as_ref());
        self.run = Some(run);
        self.phase = Phase::Running;

        vec![Event::Started, Event::counter_data(snapshot)]
    }

    /// Cancel any pending tick and suspend. Idempotent.
    fn pause(&mut self) -> Vec<Event> {
        let Some(run) = self.run.as_mut() else {
            return Vec::new();
        };
        run.tick_scheduled = false;
        self.phase = Phase::Paused;
        vec![Event::Paused]
    }

    /// Resume stepping. Flow-control suppression survives a pause: stepping
    /// only restarts once the gap is acknowledged back into the window.
    fn resume(&mut self) -> Vec<Event> {
        let Some(run) = self.run.as_mut() else {
            return Vec::new();
        };
        self.phase = Phase::Running;
        if !run.queue_suppressed {
            run.tick_scheduled = true;
        }
        vec![Event::Started]
    }

    /// Record a consumer acknowledgement.
    ///
    /// Acknowledgements for steps this run has not produced are stale
    /// (typically from before a re-`INIT`) and are ignored, not errors.
    fn acknowledge(&mut self, step: u64) -> Vec<Event> {
        let Some(run) = self.run.as_mut() else {
            return Vec::new();
        };
        if step > run.elapsed_steps {
            return Vec::new();
        }
        run.last_acknowledged_step = step;
        if run.queue_suppressed && flow::should_continue(run.elapsed_steps, step) {
            run.queue_suppressed = false;
            if self.phase == Phase::Running {
                run.tick_scheduled = true;
            }
        }
        Vec::new()
    }

    /// Run one tick: step the engine, evaluate policies, snapshot, and decide
    /// whether the next tick may follow.
    ///
    /// A no-op unless a tick is pending; the worker only calls it after
    /// draining queued commands, so a pause arriving between ticks always
    /// wins over the step.
    pub fn tick(&mut self) -> Vec<Event> {
        if !self.tick_pending() {
            return Vec::new();
        }
        let Some(run) = self.run.as_mut() else {
            return Vec::new();
        };

        run.engine.step();
        run.elapsed_steps += 1;

        // Policies are evaluated before the outbound snapshot is taken, so
        // the snapshot reflects the post-policy engine state for this step.
        let pre = CounterSnapshot::capture(run.elapsed_steps, run.engine.as_ref());
        let ctx = TriggerContext {
            elapsed_steps: run.elapsed_steps,
            counters: &pre.absolute,
        };
        let policy_events = run.scheduler.evaluate(&ctx, run.engine.as_mut());

        let snapshot = CounterSnapshot::capture(run.elapsed_steps, run.engine.as_ref());
        let mut events = vec![Event::counter_data(snapshot)];
        events.extend(policy_events.into_iter().map(Event::from));

        if flow::should_continue(run.elapsed_steps, run.last_acknowledged_step) {
            run.tick_scheduled = true;
        } else {
            run.queue_suppressed = true;
            run.tick_scheduled = false;
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::engine::scripted::{ScriptFrame, ScriptedFactory};
    use crate::flow::ACK_WINDOW;
    use crate::policy::{PolicyEffect, Shutdown, Trigger, TriggerOp, TriggerVariable};

    fn driver_with_script(script: Vec<ScriptFrame>) -> Driver {
        Driver::new(Box::new(ScriptedFactory::new(script)))
    }

    fn init(driver: &mut Driver, policies: Vec<PolicySpec>) -> Vec<Event> {
        driver.handle(Command::Init {
            config: SimulationConfig::default(),
            policies,
        })
    }

    fn drain_ticks(driver: &mut Driver) -> Vec<Event> {
        let mut events = Vec::new();
        while driver.tick_pending() {
            events.extend(driver.tick());
        }
        events
    }

    #[test]
    fn init_emits_started_then_step_zero_snapshot() {
        let mut driver = driver_with_script(vec![ScriptFrame::with_severe(1)]);
        let events = init(&mut driver, Vec::new());

        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Event::Started);
        let Event::CounterData { time, ref abs_counter_output, .. } = events[1] else {
            panic!("expected COUNTER_DATA, got {:?}", events[1]);
        };
        assert_eq!(time, 0);
        assert_eq!(abs_counter_output["Severe"], 1);
        assert_eq!(driver.phase(), Phase::Running);
        assert!(driver.tick_pending());
    }

    #[test]
    fn rejected_config_reports_error_and_stays_idle() {
        let mut driver = Driver::new(Box::new(ScriptedFactory::rejecting("too big")));
        let events = init(&mut driver, Vec::new());

        assert_eq!(events.len(), 1);
        let Event::ConfigError { ref message } = events[0] else {
            panic!("expected CONFIG_ERROR, got {:?}", events[0]);
        };
        assert!(message.contains("too big"));
        assert_eq!(driver.phase(), Phase::Idle);
        assert!(!driver.tick_pending());
    }

    #[test]
    fn invalid_policies_fail_init_before_engine_build() {
        let mut driver = driver_with_script(Vec::new());
        let events = init(
            &mut driver,
            vec![PolicySpec {
                effect: PolicyEffect::Lockdown {
                    connections_cut_fraction: 0.5,
                },
                trigger: Trigger {
                    variable: TriggerVariable::Counter("NoSuch".to_string()),
                    operator: TriggerOp::Ge,
                    value: 1.0,
                    recurrent: false,
                },
                shutdown: Shutdown::Permanent,
            }],
        );

        assert!(matches!(events[0], Event::ConfigError { .. }));
        assert_eq!(driver.phase(), Phase::Idle);
    }

    #[test]
    fn stepping_halts_once_the_ack_window_is_exceeded() {
        let mut driver = driver_with_script(Vec::new());
        init(&mut driver, Vec::new());

        let events = drain_ticks(&mut driver);
        assert_eq!(events.len() as u64, ACK_WINDOW + 1);
        assert_eq!(driver.elapsed_steps(), ACK_WINDOW + 1);
        assert!(driver.queue_suppressed());
        assert!(!driver.tick_pending());

        // A still-out-of-window ACK does not release it.
        driver.handle(Command::Ack(0));
        assert!(!driver.tick_pending());

        // An in-window ACK does, and stepping continues from where it halted.
        driver.handle(Command::Ack(10));
        assert!(driver.tick_pending());
        assert!(!driver.queue_suppressed());
        driver.tick();
        assert_eq!(driver.elapsed_steps(), ACK_WINDOW + 2);
    }

    #[test]
    fn pause_then_resume_without_a_tick_keeps_elapsed_steps() {
        let mut driver = driver_with_script(Vec::new());
        init(&mut driver, Vec::new());
        driver.tick();
        driver.tick();
        let before = driver.elapsed_steps();

        let paused = driver.handle(Command::Pause);
        assert_eq!(paused, vec![Event::Paused]);
        assert_eq!(driver.phase(), Phase::Paused);
        assert!(!driver.tick_pending());

        let resumed = driver.handle(Command::Resume);
        assert_eq!(resumed, vec![Event::Started]);
        assert_eq!(driver.elapsed_steps(), before);
        assert!(driver.tick_pending());
    }

    #[test]
    fn pause_is_idempotent_with_no_tick_pending() {
        let mut driver = driver_with_script(Vec::new());
        init(&mut driver, Vec::new());
        driver.handle(Command::Pause);
        let again = driver.handle(Command::Pause);
        assert_eq!(again, vec![Event::Paused]);
        assert_eq!(driver.phase(), Phase::Paused);
    }

    #[test]
    fn lifecycle_commands_before_init_are_noops() {
        let mut driver = driver_with_script(Vec::new());
        assert!(driver.handle(Command::Pause).is_empty());
        assert!(driver.handle(Command::Resume).is_empty());
        assert!(driver.handle(Command::Ack(3)).is_empty());
        assert_eq!(driver.phase(), Phase::Idle);
    }

    #[test]
    fn suppression_survives_pause_and_resume() {
        let mut driver = driver_with_script(Vec::new());
        init(&mut driver, Vec::new());
        drain_ticks(&mut driver);
        assert!(driver.queue_suppressed());

        driver.handle(Command::Pause);
        driver.handle(Command::Resume);
        // Still gated: no ACK arrived.
        assert!(!driver.tick_pending());

        driver.handle(Command::Ack(driver.elapsed_steps()));
        assert!(driver.tick_pending());
    }

    #[test]
    fn ack_while_paused_clears_suppression_but_does_not_schedule() {
        let mut driver = driver_with_script(Vec::new());
        init(&mut driver, Vec::new());
        drain_ticks(&mut driver);
        driver.handle(Command::Pause);

        driver.handle(Command::Ack(driver.elapsed_steps()));
        assert!(!driver.queue_suppressed());
        assert!(!driver.tick_pending());

        driver.handle(Command::Resume);
        assert!(driver.tick_pending());
    }

    #[test]
    fn stale_acks_from_a_previous_run_are_ignored() {
        let mut driver = driver_with_script(Vec::new());
        init(&mut driver, Vec::new());
        drain_ticks(&mut driver);
        let elapsed = driver.elapsed_steps();

        // Re-INIT resets the run; an ACK for the old run's step 21 would be
        // ahead of the new run's production and must not be recorded.
        init(&mut driver, Vec::new());
        assert!(driver.handle(Command::Ack(elapsed)).is_empty());
        assert_eq!(driver.elapsed_steps(), 0);

        // The new run still halts at its own window edge.
        drain_ticks(&mut driver);
        assert_eq!(driver.elapsed_steps(), ACK_WINDOW + 1);
    }

    #[test]
    fn reinit_replaces_the_run_wholesale() {
        let mut driver = driver_with_script(Vec::new());
        init(&mut driver, Vec::new());
        driver.tick();
        driver.tick();
        assert_eq!(driver.elapsed_steps(), 2);

        let events = init(&mut driver, Vec::new());
        assert_eq!(events[0], Event::Started);
        assert_eq!(driver.elapsed_steps(), 0);
        assert_eq!(driver.phase(), Phase::Running);
    }

    #[test]
    fn tick_emits_policy_events_after_the_snapshot() {
        // Severe crosses 100 at step 2.
        let script = vec![
            ScriptFrame::with_severe(10),
            ScriptFrame::with_severe(50),
            ScriptFrame::with_severe(150),
        ];
        let mut driver = driver_with_script(script);
        init(
            &mut driver,
            vec![PolicySpec {
                effect: PolicyEffect::Lockdown {
                    connections_cut_fraction: 0.5,
                },
                trigger: Trigger {
                    variable: TriggerVariable::Counter("Severe".to_string()),
                    operator: TriggerOp::Ge,
                    value: 100.0,
                    recurrent: false,
                },
                shutdown: Shutdown::Permanent,
            }],
        );

        let first = driver.tick();
        assert_eq!(first.len(), 1, "no policy fires at Severe=50");

        let second = driver.tick();
        assert_eq!(second.len(), 2);
        assert!(matches!(second[0], Event::CounterData { time: 2, .. }));
        let Event::PolicyApplied { time, ref policy, ref event } = second[1] else {
            panic!("expected POLICY_APPLIED, got {:?}", second[1]);
        };
        assert_eq!(time, 2);
        assert_eq!(policy, "lockdown");
        assert_eq!(event, "applied");
    }
}
