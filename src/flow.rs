//! Windowed backpressure between the driver and its consumer.
//!
//! The engine can step far faster than a consumer can render. The driver
//! keeps stepping while the gap between steps produced and steps acknowledged
//! stays within a fixed window; past that it halts until an acknowledgement
//! releases it. Consumers only need to acknowledge periodically, not every
//! step.

/// Maximum unacknowledged steps before stepping halts.
pub const ACK_WINDOW: u64 = 20;

/// Whether the driver may schedule another tick.
///
/// Pure function of run state; consulted on every tick and again on every
/// acknowledgement, so it must be safe to evaluate at any time.
#[must_use]
pub const fn should_continue(elapsed_steps: u64, last_acknowledged_step: u64) -> bool {
    elapsed_steps.saturating_sub(last_acknowledged_step) <= ACK_WINDOW
}
