//! Deadline waiting for the playback thread
//!
//! Coarse phase: block on the command channel with a timeout that ends
//! `SPIN_WINDOW` before the target, so commands are still collected while
//! the thread is idle. Fine phase: spin for the last stretch to keep wake-up
//! jitter well under a millisecond.

use crate::sequencer::control::{ControlCommand, PendingCommands};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

/// Final stretch before a deadline spent busy-waiting
pub const SPIN_WINDOW: Duration = Duration::from_micros(1500);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WaitOutcome {
    Reached,
    /// A stop or shutdown arrived; the caller must act on it now
    Interrupted,
}

/// Wait until `target`, folding any commands received into `pending`
pub(crate) fn wait_until(
    target: Instant,
    commands: &Receiver<ControlCommand>,
    pending: &mut PendingCommands,
) -> WaitOutcome {
    loop {
        let now = Instant::now();
        if now >= target {
            return WaitOutcome::Reached;
        }
        let remaining = target - now;
        if remaining > SPIN_WINDOW {
            match commands.recv_timeout(remaining - SPIN_WINDOW) {
                Ok(cmd) => {
                    let interrupt = cmd.interrupts_wait();
                    pending.push(cmd);
                    if interrupt {
                        return WaitOutcome::Interrupted;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    pending.push(ControlCommand::Shutdown);
                    return WaitOutcome::Interrupted;
                }
            }
        } else {
            std::hint::spin_loop();
        }
    }
}
