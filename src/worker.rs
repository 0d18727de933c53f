//! Machinery shared by backend worker threads.
//!
//! Every flux owns one worker. The worker suspends in exactly two places:
//! the host wait primitive and the pause gate below. Stopping a flux sets
//! halt, clears pause (releasing a parked worker) and joins.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};

/// Halt and pause signalling between a flux handle and its worker.
///
/// The pause flag is the source of truth: native pause on the host stream
/// is advisory (some hosts return immediately from their wait primitive
/// while paused), so the worker additionally parks here each iteration.
pub(crate) struct WorkerGate {
    halt: AtomicBool,
    paused: Mutex<bool>,
    resumed: Condvar,
}

impl WorkerGate {
    pub(crate) fn new() -> Self {
        Self {
            halt: AtomicBool::new(false),
            paused: Mutex::new(false),
            resumed: Condvar::new(),
        }
    }

    /// True once the worker must exit.
    pub(crate) fn halted(&self) -> bool {
        self.halt.load(Ordering::Acquire)
    }

    /// Orders the worker to exit, releasing it if parked on the pause gate.
    pub(crate) fn halt(&self) {
        self.halt.store(true, Ordering::Release);
        self.set_paused(false);
    }

    /// Flips the pause flag and wakes a parked worker when clearing it.
    pub(crate) fn set_paused(&self, on: bool) {
        let mut paused = self.paused.lock();
        *paused = on;
        drop(paused);
        self.resumed.notify_all();
    }

    /// True while production/consumption is suspended.
    pub(crate) fn paused(&self) -> bool {
        *self.paused.lock()
    }

    /// Parks the calling worker until unpaused or halted.
    pub(crate) fn wait_if_paused(&self) {
        let mut paused = self.paused.lock();
        while *paused && !self.halted() {
            self.resumed.wait(&mut paused);
        }
    }
}

/// Applies the playback commit rules to a host buffer after the user
/// callback ran.
///
/// `produced` is what the callback reported (possibly 0 to request
/// silence, possibly more than `capacity`). Returns the frame count to
/// commit, which is always a full buffer: committing less than a quantum
/// makes hosts loop on the resulting underrun.
pub(crate) fn finish_playback_buffer(
    buf: &mut [u8],
    produced: u32,
    capacity: u32,
    frame_bytes: usize,
) -> u32 {
    let produced = produced.min(capacity);
    let valid = produced as usize * frame_bytes;
    buf[valid..capacity as usize * frame_bytes].fill(0);
    capacity
}

/// Frames per host wake-up: ~10 ms of audio.
pub(crate) fn quantum_frames(sample_rate: u32) -> u32 {
    (sample_rate / 100).max(1)
}
