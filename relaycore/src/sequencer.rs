//! Centralized work queue for the continuation-style bookkeeping the
//! protocol/API layers need (socket teardown, session disconnect, …), in
//! place of ad-hoc per-callback struct fields (§4.9, design notes §9).
//!
//! A [`Sequencer`] is a FIFO of [`SequencerTask`] entries. Tasks queued
//! during a [`Sequencer::drain`] call run on the *next* drain, never
//! reentrantly; a task identical to one already queued is a no-op, so a
//! session that gets disconnected twice in the same turn only tears down
//! once.

use crate::api::session::SessionHandle;

/// One deferred unit of work. New variants are added here as the API layer
/// grows continuations that would otherwise live as scattered struct fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerTask {
    DisconnectSession(SessionHandle),
    StopSocket,
}

pub struct Sequencer {
    queued: Vec<SequencerTask>,
    pending: Vec<SequencerTask>,
}

impl Sequencer {
    pub fn new() -> Sequencer {
        Sequencer { queued: Vec::new(), pending: Vec::new() }
    }

    /// Enqueues `task` for the next drain. No-op if an identical task is
    /// already waiting (§4.9: "a task already enqueued is a no-op on
    /// re-submit").
    pub fn submit(&mut self, task: SequencerTask) {
        if !self.pending.contains(&task) {
            self.pending.push(task);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.queued.is_empty()
    }

    /// Hands back every task queued before this call, in submission order.
    /// Tasks submitted by the caller while processing this batch are held
    /// until the *next* `drain`.
    pub fn drain(&mut self) -> Vec<SequencerTask> {
        std::mem::swap(&mut self.queued, &mut self.pending);
        self.pending.clear();
        std::mem::take(&mut self.queued)
    }
}

impl Default for Sequencer {
    fn default() -> Sequencer {
        Sequencer::new()
    }
}
