use std::time::Duration;

use epidrive::engine::scripted::{ScriptFrame, ScriptedFactory};
use epidrive::{Command, DriverHandle, Event, RuntimeConfig, SimulationConfig, ACK_WINDOW};

const RECV_TIMEOUT: Duration = Duration::from_secs(1);
const QUIET_TIMEOUT: Duration = Duration::from_millis(300);

fn spawn_with_script(script: Vec<ScriptFrame>) -> DriverHandle {
    let handle = DriverHandle::spawn(Box::new(ScriptedFactory::new(script)), &RuntimeConfig::default());
    // Every worker announces its defaults first; swallow that here.
    let first = handle.recv_timeout(RECV_TIMEOUT).unwrap();
    assert!(matches!(first, Event::DefaultConfig { .. }));
    handle
}

fn init(handle: &DriverHandle, policies: serde_json::Value) {
    let command: Command = serde_json::from_value(serde_json::json!({
        "type": "INIT",
        "args": {
            "config": SimulationConfig::default(),
            "policies": policies,
        }
    }))
    .unwrap();
    handle.send(command).unwrap();
}

#[test]
fn lockdown_scenario_applies_at_threshold_and_reverses_after_duration() {
    // Severe crosses 100 at step 12.
    let script: Vec<ScriptFrame> = (0..=40)
        .map(|step| ScriptFrame::with_severe(if step < 12 { 50 } else { 150 }))
        .collect();
    let handle = spawn_with_script(script);

    init(
        &handle,
        serde_json::json!([{
            "kind": "lockdown",
            "effectData": {"connections_cut_fraction": 0.5},
            "trigger": {"variable": "Severe", "operator": ">=", "value": 100.0},
            "shutdown": {"variable": "duration", "value": 14, "recurrent": false}
        }]),
    );

    assert!(matches!(
        handle.recv_timeout(RECV_TIMEOUT).unwrap(),
        Event::Started
    ));

    let mut policy_events = Vec::new();
    let mut last_time = None;
    loop {
        let event = handle.recv_timeout(RECV_TIMEOUT).unwrap();
        match event {
            Event::CounterData { time, .. } => {
                // Contiguous stream: no steps skipped or repeated.
                assert_eq!(time, last_time.map_or(0, |t: u64| t + 1));
                last_time = Some(time);
                if time % 10 == 0 {
                    handle.send(Command::Ack(time)).unwrap();
                }
                if time == 40 {
                    break;
                }
            }
            Event::PolicyApplied { time, policy, event } => {
                policy_events.push(("applied", time));
                assert_eq!(policy, "lockdown");
                assert_eq!(event, "applied");
            }
            Event::PolicyReversed { time, policy, event } => {
                policy_events.push(("reversed", time));
                assert_eq!(policy, "lockdown");
                assert_eq!(event, "reversed");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    assert_eq!(policy_events, vec![("applied", 12), ("reversed", 26)]);
}

#[test]
fn stepping_halts_without_acks_and_resumes_where_it_stopped() {
    let handle = spawn_with_script(Vec::new());
    init(&handle, serde_json::json!([]));

    assert!(matches!(
        handle.recv_timeout(RECV_TIMEOUT).unwrap(),
        Event::Started
    ));

    // With no ACKs the driver steps to the window edge and halts.
    let mut last_time = None;
    for expected in 0..=(ACK_WINDOW + 1) {
        let event = handle.recv_timeout(RECV_TIMEOUT).unwrap();
        let Event::CounterData { time, .. } = event else {
            panic!("expected COUNTER_DATA, got {event:?}");
        };
        assert_eq!(time, expected);
        last_time = Some(time);
    }
    assert_eq!(last_time, Some(ACK_WINDOW + 1));

    let quiet = handle.recv_timeout(QUIET_TIMEOUT);
    assert!(quiet.is_err(), "expected silence past the window, got {quiet:?}");

    // A still-out-of-window ACK changes nothing.
    handle.send(Command::Ack(0)).unwrap();
    assert!(handle.recv_timeout(QUIET_TIMEOUT).is_err());

    // An in-window ACK releases the halt; stepping continues with no steps
    // skipped or repeated.
    handle.send(Command::Ack(ACK_WINDOW + 1)).unwrap();
    let event = handle.recv_timeout(RECV_TIMEOUT).unwrap();
    let Event::CounterData { time, .. } = event else {
        panic!("expected COUNTER_DATA, got {event:?}");
    };
    assert_eq!(time, ACK_WINDOW + 2);
}

#[test]
fn pause_stops_the_stream_and_resume_continues_it() {
    let handle = spawn_with_script(Vec::new());
    init(&handle, serde_json::json!([]));

    assert!(matches!(
        handle.recv_timeout(RECV_TIMEOUT).unwrap(),
        Event::Started
    ));

    handle.send(Command::Pause).unwrap();

    // Ticks already in flight may land before the pause is processed; the
    // PAUSED envelope marks the cut. Acknowledge as we go so flow control
    // plays no part here.
    let mut last_time = 0;
    loop {
        match handle.recv_timeout(RECV_TIMEOUT).unwrap() {
            Event::CounterData { time, .. } => {
                last_time = time;
                handle.send(Command::Ack(time)).unwrap();
            }
            Event::Paused => break,
            other => panic!("unexpected event {other:?}"),
        }
    }

    assert!(handle.recv_timeout(QUIET_TIMEOUT).is_err(), "no events while paused");

    handle.send(Command::Resume).unwrap();
    assert!(matches!(
        handle.recv_timeout(RECV_TIMEOUT).unwrap(),
        Event::Started
    ));
    let event = handle.recv_timeout(RECV_TIMEOUT).unwrap();
    let Event::CounterData { time, .. } = event else {
        panic!("expected COUNTER_DATA, got {event:?}");
    };
    assert_eq!(time, last_time + 1, "no double-stepping, no dropped step");
}

#[test]
fn rejected_configuration_surfaces_config_error_and_no_started() {
    let handle = DriverHandle::spawn(
        Box::new(ScriptedFactory::rejecting("population too small")),
        &RuntimeConfig::default(),
    );
    assert!(matches!(
        handle.recv_timeout(RECV_TIMEOUT).unwrap(),
        Event::DefaultConfig { .. }
    ));

    init(&handle, serde_json::json!([]));

    let event = handle.recv_timeout(RECV_TIMEOUT).unwrap();
    let Event::ConfigError { message } = event else {
        panic!("expected CONFIG_ERROR, got {event:?}");
    };
    assert!(message.contains("population too small"));
    assert!(handle.recv_timeout(QUIET_TIMEOUT).is_err(), "no STARTED after rejection");
}

#[test]
fn reinit_restarts_the_counter_stream_from_step_zero() {
    let handle = spawn_with_script(Vec::new());
    init(&handle, serde_json::json!([]));

    assert!(matches!(
        handle.recv_timeout(RECV_TIMEOUT).unwrap(),
        Event::Started
    ));

    // Let the first run produce a few steps, then re-INIT mid-stream.
    for _ in 0..3 {
        let event = handle.recv_timeout(RECV_TIMEOUT).unwrap();
        assert!(matches!(event, Event::CounterData { .. }));
    }
    init(&handle, serde_json::json!([]));

    // Skip whatever the first run still had buffered; the second STARTED
    // marks the new run.
    loop {
        match handle.recv_timeout(RECV_TIMEOUT).unwrap() {
            Event::Started => break,
            Event::CounterData { .. } => {}
            other => panic!("unexpected event {other:?}"),
        }
    }
    let event = handle.recv_timeout(RECV_TIMEOUT).unwrap();
    let Event::CounterData { time, .. } = event else {
        panic!("expected COUNTER_DATA, got {event:?}");
    };
    assert_eq!(time, 0);
}

#[test]
fn recurrent_policy_cycles_through_the_event_stream() {
    // Severe stays above threshold for the whole run.
    let script = vec![ScriptFrame::with_severe(200)];
    let handle = spawn_with_script(script);

    init(
        &handle,
        serde_json::json!([{
            "kind": "shut-workplaces",
            "effectData": {"workplaces": 0.3},
            "trigger": {"variable": "Severe", "operator": ">=", "value": 100.0},
            "shutdown": {"variable": "duration", "value": 3, "recurrent": true}
        }]),
    );

    assert!(matches!(
        handle.recv_timeout(RECV_TIMEOUT).unwrap(),
        Event::Started
    ));

    let mut applied = Vec::new();
    let mut reversed = Vec::new();
    loop {
        match handle.recv_timeout(RECV_TIMEOUT).unwrap() {
            Event::CounterData { time, .. } => {
                handle.send(Command::Ack(time)).unwrap();
                // The tick-13 application lands after COUNTER_DATA 13; read
                // one more counter frame so it is in hand before breaking.
                if time >= 14 {
                    break;
                }
            }
            Event::PolicyApplied { time, .. } => applied.push(time),
            Event::PolicyReversed { time, .. } => reversed.push(time),
            other => panic!("unexpected event {other:?}"),
        }
    }

    // Applied at 1, reversed at 4, re-applied at 5, ... one cycle per 4 steps.
    assert_eq!(applied, vec![1, 5, 9, 13]);
    assert_eq!(reversed, vec![4, 8, 12]);
}
