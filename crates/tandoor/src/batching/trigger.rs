use std::time::Duration;
use tokio::time::Instant;
use crate::config::BatchConfig;

/// What the runner should do about the queue right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    /// Nothing queued.
    Idle,
    /// Drain now.
    Ready,
    /// Tasks are queued below capacity; drain at the deadline unless capacity
    /// is reached first.
    Until(Instant),
}

/// Decides when the queued tasks form a batch.
///
/// Holds at most one deadline, anchored to the arrival of the oldest queued task.
/// The deadline is armed exactly while the queue is non-empty and below capacity.
#[derive(Debug)]
pub(crate) struct BatchTrigger {
    max_batch_size: usize,
    max_wait: Duration,
    deadline: Option<Instant>,
    readiness: Readiness,
}

impl BatchTrigger {
    pub(crate) fn new(config: &BatchConfig) -> Self {
        Self {
            max_batch_size: config.max_batch_size.max(1),
            max_wait: config.max_wait,
            deadline: None,
            readiness: Readiness::Idle,
        }
    }

    /// Re-evaluates after tasks were appended. An armed deadline is kept: later
    /// arrivals never push the flush of the oldest task back.
    pub(crate) fn on_enqueue(&mut self, len: usize, oldest: Option<Instant>) -> Readiness {
        self.evaluate(len, oldest)
    }

    /// Re-evaluates after tasks left the head of the queue. The old deadline
    /// belonged to a task that is gone, so it is cancelled and re-anchored on
    /// whatever is now oldest.
    pub(crate) fn on_removal(&mut self, len: usize, oldest: Option<Instant>) -> Readiness {
        self.deadline = None;
        self.evaluate(len, oldest)
    }

    /// The current decision with an elapsed deadline reported as [`Readiness::Ready`].
    pub(crate) fn readiness_at(&self, now: Instant) -> Readiness {
        match self.readiness {
            Readiness::Until(deadline) if deadline <= now => Readiness::Ready,
            other => other,
        }
    }

    #[cfg(test)]
    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn evaluate(&mut self, len: usize, oldest: Option<Instant>) -> Readiness {
        self.readiness = match oldest {
            Some(_) if len >= self.max_batch_size => {
                // capacity supersedes the timer
                self.deadline = None;
                Readiness::Ready
            }
            Some(oldest) if len > 0 => {
                let max_wait = self.max_wait;
                Readiness::Until(*self.deadline.get_or_insert_with(|| oldest + max_wait))
            }
            _ => {
                self.deadline = None;
                Readiness::Idle
            }
        };
        self.readiness
    }
}
