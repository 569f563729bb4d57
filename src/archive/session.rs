//! Startup reconciliation state shared between the backlog coordinator and
//! the live event intake.

use std::sync::Mutex;

use super::model::LiveEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    BacklogInProgress,
    Live,
}

#[derive(Debug)]
enum State {
    Initializing(Vec<LiveEvent>),
    Backlog(Vec<LiveEvent>),
    Live,
}

/// What the intake path should do with an event.
#[derive(Debug, PartialEq)]
pub enum Admission {
    Process(LiveEvent),
    Queued { position: usize },
}

/// Two-phase session: events are queued until the backlog has been drained,
/// then admitted directly for the rest of the process.
#[derive(Debug)]
pub struct BacklogSession {
    state: Mutex<State>,
}

impl Default for BacklogSession {
    fn default() -> Self {
        Self::new()
    }
}

impl BacklogSession {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::Initializing(Vec::new())),
        }
    }

    /// A session that skips reconciliation entirely.
    pub fn live() -> Self {
        Self {
            state: Mutex::new(State::Live),
        }
    }

    pub fn phase(&self) -> Phase {
        match &*self.lock() {
            State::Initializing(_) => Phase::Initializing,
            State::Backlog(_) => Phase::BacklogInProgress,
            State::Live => Phase::Live,
        }
    }

    /// Moves `Initializing` to `BacklogInProgress`, keeping anything already
    /// queued. Returns false if the backlog was started before.
    pub fn begin_backlog(&self) -> bool {
        let mut state = self.lock();
        match &mut *state {
            State::Initializing(queue) => {
                let queue = std::mem::take(queue);
                *state = State::Backlog(queue);
                true
            }
            _ => false,
        }
    }

    pub fn admit(&self, event: LiveEvent) -> Admission {
        let mut state = self.lock();
        match &mut *state {
            State::Live => Admission::Process(event),
            State::Initializing(queue) | State::Backlog(queue) => {
                queue.push(event);
                Admission::Queued {
                    position: queue.len(),
                }
            }
        }
    }

    /// Takes the next batch of queued events. When nothing is left the
    /// session switches to `Live` under the same lock, so no event can slip
    /// in between the last batch and the switch.
    pub fn next_drain_batch(&self) -> Option<Vec<LiveEvent>> {
        let mut state = self.lock();
        match &mut *state {
            State::Live => None,
            State::Initializing(queue) | State::Backlog(queue) => {
                if queue.is_empty() {
                    *state = State::Live;
                    None
                } else {
                    Some(std::mem::take(queue))
                }
            }
        }
    }

    pub fn pending(&self) -> usize {
        match &*self.lock() {
            State::Initializing(queue) | State::Backlog(queue) => queue.len(),
            State::Live => 0,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // Only plain data lives behind this lock; a poisoned guard is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
