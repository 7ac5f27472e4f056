/*
 * A single-slot deferred action used to batch profile saves. The slot is either idle
 * or armed with a deadline. Arming an armed slot keeps the original deadline, so the
 * first change of a batch starts the clock and later changes simply join the batch.
 * The owner polls the slot (`take_if_due`) from its own loop; nothing here spawns
 * threads or sleeps.
 */
use std::time::{Duration, Instant};

pub const DEFAULT_SAVE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct DebounceTimer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl DebounceTimer {
    pub fn new(delay: Duration) -> Self {
        DebounceTimer {
            delay,
            deadline: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /*
     * Arms the slot relative to `now`. Returns `true` if the slot was idle and is now
     * armed, `false` if a deadline was already pending (which is left untouched).
     */
    pub fn arm(&mut self, now: Instant) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(now + self.delay);
        true
    }

    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Disarms the slot and returns `true` when its deadline has passed.
    pub fn take_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

impl Default for DebounceTimer {
    fn default() -> Self {
        Self::new(DEFAULT_SAVE_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arm_is_noop_while_armed() {
        // Arrange
        let start = Instant::now();
        let mut timer = DebounceTimer::new(Duration::from_millis(100));

        // Act
        let first = timer.arm(start);
        let second = timer.arm(start + Duration::from_millis(80));

        // Assert: the second arm does not push the deadline out
        assert!(first);
        assert!(!second);
        assert_eq!(timer.deadline(), Some(start + Duration::from_millis(100)));
    }

    #[test]
    fn test_take_if_due_fires_once() {
        let start = Instant::now();
        let mut timer = DebounceTimer::new(Duration::from_millis(50));
        timer.arm(start);

        assert!(!timer.take_if_due(start + Duration::from_millis(49)));
        assert!(timer.is_armed());
        assert!(timer.take_if_due(start + Duration::from_millis(50)));
        assert!(!timer.is_armed());
        assert!(!timer.take_if_due(start + Duration::from_millis(500)));
    }

    #[test]
    fn test_cancel_returns_slot_to_idle() {
        let start = Instant::now();
        let mut timer = DebounceTimer::default();
        assert_eq!(timer.delay(), DEFAULT_SAVE_DELAY);
        assert!(!timer.cancel());

        timer.arm(start);
        assert!(timer.cancel());
        assert!(timer.deadline().is_none());
        assert!(timer.arm(start + Duration::from_secs(1)));
    }
}
