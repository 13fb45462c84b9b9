use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Default bonus length
pub const BONUS_DURATION: Duration = Duration::from_secs(60);

/// Which transition the scheduler should fire next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    Activation(Instant),
    Deactivation(Instant),
}

impl Deadline {
    pub fn at(&self) -> Instant {
        match self {
            Deadline::Activation(at) | Deadline::Deactivation(at) => *at,
        }
    }
}

/// Result of firing an activation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// The window opened and a deactivation is now pending
    Started,
    /// A window was already open; it is neither extended nor doubled
    Collapsed,
}

#[derive(Debug)]
struct WindowState {
    active: bool,
    next_activation: Option<Instant>,
    deactivation: Option<Instant>,
}

/// The global bonus flag and its pending schedule.
///
/// All reads and transitions take the same lock, so a reader sees either the
/// state before a transition or after it.
#[derive(Debug)]
pub struct BonusWindow {
    state: Mutex<WindowState>,
    duration: Duration,
}

impl BonusWindow {
    /// Idle window whose first activation is due at `first_activation`
    pub fn new(first_activation: Instant, duration: Duration) -> Self {
        Self {
            state: Mutex::new(WindowState {
                active: false,
                next_activation: Some(first_activation),
                deactivation: None,
            }),
            duration,
        }
    }

    fn lock(&self) -> MutexGuard<'_, WindowState> {
        // Plain data, every transition leaves it consistent
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn pending_deactivation(&self) -> Option<Instant> {
        self.lock().deactivation
    }

    pub fn next_activation(&self) -> Option<Instant> {
        self.lock().next_activation
    }

    /// Earliest pending transition, or `None` once nothing is scheduled.
    /// Deactivation wins ties so a window that ends exactly when the next
    /// one is due closes before it reopens.
    pub fn next_deadline(&self) -> Option<Deadline> {
        let state = self.lock();
        match (state.deactivation, state.next_activation) {
            (Some(off), Some(on)) if off <= on => Some(Deadline::Deactivation(off)),
            (_, Some(on)) => Some(Deadline::Activation(on)),
            (Some(off), None) => Some(Deadline::Deactivation(off)),
            (None, None) => None,
        }
    }

    /// Fire an activation at `now`.
    ///
    /// From Idle this opens the window, arms its deactivation and arms the
    /// next activation `next_delay` later. While a window is already open it
    /// is a no-op: nothing is extended or re-armed. If the activation that
    /// fired was the pending one it is spent, so the cadence ends there.
    pub fn activate(&self, now: Instant, next_delay: Duration) -> Activation {
        let mut state = self.lock();

        if state.active {
            if state.next_activation == Some(now) {
                state.next_activation = None;
            }
            return Activation::Collapsed;
        }

        state.active = true;
        state.deactivation = Some(now + self.duration);
        state.next_activation = Some(now + next_delay);
        Activation::Started
    }

    /// Close the window, whatever else is pending
    pub fn deactivate(&self) {
        let mut state = self.lock();
        state.active = false;
        state.deactivation = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_starts_idle() {
        let now = Instant::now();
        let window = BonusWindow::new(now + secs(90), BONUS_DURATION);

        assert!(!window.is_active());
        assert_eq!(window.pending_deactivation(), None);
        assert_eq!(window.next_deadline(), Some(Deadline::Activation(now + secs(90))));
    }

    #[test]
    fn test_activate_schedules_deactivation_and_next_activation() {
        let now = Instant::now();
        let window = BonusWindow::new(now, BONUS_DURATION);

        assert_eq!(window.activate(now, secs(120)), Activation::Started);

        assert!(window.is_active());
        assert_eq!(window.pending_deactivation(), Some(now + secs(60)));
        assert_eq!(window.next_activation(), Some(now + secs(120)));
        assert_eq!(window.next_deadline(), Some(Deadline::Deactivation(now + secs(60))));
    }

    #[test]
    fn test_double_activation_keeps_single_deactivation() {
        let now = Instant::now();
        let window = BonusWindow::new(now, BONUS_DURATION);

        assert_eq!(window.activate(now, secs(100)), Activation::Started);
        let pending = window.pending_deactivation();

        let later = now + secs(30);
        assert_eq!(window.activate(later, secs(100)), Activation::Collapsed);

        assert!(window.is_active());
        // Not extended, not doubled, not re-armed
        assert_eq!(window.pending_deactivation(), pending);
        assert_eq!(window.next_activation(), Some(now + secs(100)));
    }

    #[test]
    fn test_due_activation_while_active_is_spent() {
        let now = Instant::now();
        let window = BonusWindow::new(now, BONUS_DURATION);
        window.activate(now, secs(20));
        let pending = window.pending_deactivation();

        let due = now + secs(20);
        assert_eq!(window.activate(due, secs(100)), Activation::Collapsed);

        assert_eq!(window.next_activation(), None);
        assert_eq!(window.pending_deactivation(), pending);
        assert_eq!(window.next_deadline(), Some(Deadline::Deactivation(now + secs(60))));

        window.deactivate();
        assert_eq!(window.next_deadline(), None);
    }

    #[test]
    fn test_deactivate() {
        let now = Instant::now();
        let window = BonusWindow::new(now, BONUS_DURATION);
        window.activate(now, secs(150));

        window.deactivate();

        assert!(!window.is_active());
        assert_eq!(window.pending_deactivation(), None);
        assert_eq!(window.next_deadline(), Some(Deadline::Activation(now + secs(150))));
    }

    #[test]
    fn test_deactivation_wins_tie() {
        let now = Instant::now();
        let window = BonusWindow::new(now, BONUS_DURATION);
        window.activate(now, secs(60));

        assert_eq!(window.next_deadline(), Some(Deadline::Deactivation(now + secs(60))));
    }

    #[test]
    fn test_reactivation_after_window_closes() {
        let now = Instant::now();
        let window = BonusWindow::new(now, secs(10));
        window.activate(now, secs(30));
        window.deactivate();

        let next = now + secs(30);
        assert_eq!(window.activate(next, secs(30)), Activation::Started);
        assert_eq!(window.pending_deactivation(), Some(next + secs(10)));
    }

    #[test]
    fn test_concurrent_reads_during_transitions() {
        use std::sync::Arc;
        use std::thread;

        let now = Instant::now();
        let window = Arc::new(BonusWindow::new(now, BONUS_DURATION));

        let writer = {
            let window = Arc::clone(&window);
            thread::spawn(move || {
                for _ in 0..1000 {
                    window.activate(now, secs(90));
                    window.deactivate();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let window = Arc::clone(&window);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        // Active always comes with a pending deactivation
                        let deadline = window.next_deadline();
                        if let Some(Deadline::Deactivation(at)) = deadline {
                            assert_eq!(at, now + BONUS_DURATION);
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert!(!window.is_active());
    }
}
