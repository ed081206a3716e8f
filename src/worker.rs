//! Worker thread and consumer handle.
//!
//! The driver runs on one dedicated thread that owns the engine and all run
//! state; the consumer interacts with it purely through copied message
//! payloads over bounded channels. Ticks are scheduled cooperatively: the
//! worker drains every queued command before each tick, so a pause arriving
//! between ticks always takes effect before the next engine step.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::driver::Driver;
use crate::engine::EngineFactory;
use crate::error::{DriverResult, ProtocolError};
use crate::protocol::{Command, Event};

/// Channel capacities for the driver worker.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Max queued consumer commands.
    pub command_capacity: usize,
    /// Max buffered outbound events.
    ///
    /// Kept comfortably above the flow-control window so the worker never
    /// blocks on emission while stepping is still allowed.
    pub event_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_capacity: 64,
            event_capacity: 256,
        }
    }
}

/// Consumer-side handle to a spawned driver worker.
///
/// Dropping the handle closes both channels and joins the worker.
pub struct DriverHandle {
    command_tx: Sender<Command>,
    event_rx: Receiver<Event>,
    join: Option<JoinHandle<()>>,
}

impl DriverHandle {
    /// Spawn a driver worker building engines through `factory`.
    ///
    /// The worker announces the engine's default configuration as its first
    /// event, before any command arrives.
    #[must_use]
    pub fn spawn(factory: Box<dyn EngineFactory>, config: &RuntimeConfig) -> Self {
        let (command_tx, command_rx) = bounded::<Command>(config.command_capacity.max(1));
        let (event_tx, event_rx) = bounded::<Event>(config.event_capacity.max(1));

        let join = thread::Builder::new()
            .name("epidrive-driver".to_string())
            .spawn(move || worker_loop(Driver::new(factory), &command_rx, &event_tx))
            .expect("failed to spawn epidrive driver worker");

        Self {
            command_tx,
            event_rx,
            join: Some(join),
        }
    }

    /// Send a command to the driver.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Disconnected`] if the worker is gone.
    pub fn send(&self, command: Command) -> DriverResult<()> {
        self.command_tx.send(command).map_err(|_| {
            ProtocolError::Disconnected {
                channel: "commands".to_string(),
            }
            .into()
        })
    }

    /// The outbound event stream.
    #[must_use]
    pub fn events(&self) -> &Receiver<Event> {
        &self.event_rx
    }

    /// Receive the next event with a timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Timeout`] if nothing arrives in time, or
    /// [`ProtocolError::Disconnected`] if the worker is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> DriverResult<Event> {
        self.event_rx.recv_timeout(timeout).map_err(|err| {
            match err {
                RecvTimeoutError::Timeout => ProtocolError::Timeout {
                    duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
                },
                RecvTimeoutError::Disconnected => ProtocolError::Disconnected {
                    channel: "events".to_string(),
                },
            }
            .into()
        })
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        // Close both channels first so the worker can observe the disconnect
        // from whichever side it is blocked on, then join.
        let (dummy_tx, _) = bounded::<Command>(1);
        drop(std::mem::replace(&mut self.command_tx, dummy_tx));

        let (_, dummy_rx) = bounded::<Event>(1);
        drop(std::mem::replace(&mut self.event_rx, dummy_rx));

        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

/// Forward a batch of events; an error means the consumer is gone.
fn emit(event_tx: &Sender<Event>, events: Vec<Event>) -> Result<(), ()> {
    for event in events {
        event_tx.send(event).map_err(|_| ())?;
    }
    Ok(())
}

fn worker_loop(mut driver: Driver, command_rx: &Receiver<Command>, event_tx: &Sender<Event>) {
    // The original worker announces its defaults as soon as it comes up, so
    // consumers can prefill their configuration before the first INIT.
    let defaults = driver.handle(Command::GetDefaultConfig);
    if emit(event_tx, defaults).is_err() {
        return;
    }

    loop {
        if driver.tick_pending() {
            // Cooperative deferral: observe every command that arrived since
            // the last tick before stepping again.
            loop {
                match command_rx.try_recv() {
                    Ok(command) => {
                        if emit(event_tx, driver.handle(command)).is_err() {
                            return;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return,
                }
            }
            // A drained command may have cancelled the tick.
            if driver.tick_pending() && emit(event_tx, driver.tick()).is_err() {
                return;
            }
        } else {
            // Nothing to do until the consumer speaks.
            match command_rx.recv() {
                Ok(command) => {
                    if emit(event_tx, driver.handle(command)).is_err() {
                        return;
                    }
                }
                Err(_) => return,
            }
        }
    }
}
