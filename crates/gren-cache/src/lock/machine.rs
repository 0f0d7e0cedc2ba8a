//! Pure lock state machine.
//!
//! [`LockState::step`] consumes one [`LockEvent`] and answers with an
//! optional [`LockOutcome`] plus the [`LockEffect`]s the driver must carry
//! out. Effects that touch the filesystem come back as new events, so the
//! whole protocol can be exercised here without a filesystem or a clock.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use super::{LockOutcome, RetryPolicy, MAX_STALE_RECOVERIES, STALE_AFTER, TOUCH_INTERVAL};

/// Identifies one hold of a path. Timers from an earlier hold carry an older
/// lease and are ignored.
pub type Lease = u64;

/// Progress of a single acquisition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Attempt {
    /// Retries so far; compared against [`RetryPolicy::attempts`].
    pub number: u32,
    pub stale_recoveries: u32,
}

impl Attempt {
    fn retry(self) -> Self {
        Self {
            number: self.number + 1,
            ..self
        }
    }

    fn recover(self) -> Self {
        Self {
            number: self.number + 1,
            stale_recoveries: self.stale_recoveries + 1,
        }
    }
}

#[derive(Debug)]
pub enum LockEvent {
    Acquire {
        path: PathBuf,
    },
    /// A retry delay elapsed.
    RetryDue {
        path: PathBuf,
        attempt: Attempt,
    },
    MarkerCreated {
        path: PathBuf,
        attempt: Attempt,
    },
    MarkerCreateFailed {
        path: PathBuf,
        attempt: Attempt,
        error: io::Error,
    },
    MarkerInspected {
        path: PathBuf,
        attempt: Attempt,
        last_accessed: SystemTime,
        now: SystemTime,
    },
    MarkerInspectFailed {
        path: PathBuf,
        attempt: Attempt,
        error: io::Error,
    },
    TouchDue {
        path: PathBuf,
        lease: Lease,
    },
    Touched {
        path: PathBuf,
        lease: Lease,
    },
    TouchFailed {
        path: PathBuf,
        lease: Lease,
        error: io::Error,
    },
    Release {
        path: PathBuf,
    },
}

#[derive(Debug)]
pub enum LockEffect {
    /// Atomically create the marker; answers `MarkerCreated` or `MarkerCreateFailed`.
    CreateMarker { path: PathBuf, attempt: Attempt },
    /// Read the marker's last-accessed time; answers `MarkerInspected` or `MarkerInspectFailed`.
    InspectMarker { path: PathBuf, attempt: Attempt },
    /// Best effort, failures are only logged.
    RemoveMarker { path: PathBuf },
    /// Refresh the marker's timestamps; answers `Touched` or `TouchFailed`.
    TouchMarker { path: PathBuf, lease: Lease },
    /// Feed `event` back after `after` without blocking anything else.
    Schedule { after: Duration, event: LockEvent },
}

/// Result of one step.
#[derive(Debug, Default)]
pub struct Transition {
    pub outcome: Option<LockOutcome>,
    pub effects: Vec<LockEffect>,
}

impl Transition {
    fn effects(effects: Vec<LockEffect>) -> Self {
        Self {
            outcome: None,
            effects,
        }
    }

    fn outcome(outcome: LockOutcome) -> Self {
        Self {
            outcome: Some(outcome),
            effects: Vec::new(),
        }
    }

    fn nothing() -> Self {
        Self::default()
    }
}

/// Paths this process holds, plus the contention policy.
#[derive(Debug, Default)]
pub struct LockState {
    held: HashMap<PathBuf, Lease>,
    next_lease: Lease,
    retry: Option<RetryPolicy>,
}

impl LockState {
    pub fn new(retry: Option<RetryPolicy>) -> Self {
        Self {
            held: HashMap::new(),
            next_lease: 0,
            retry,
        }
    }

    pub fn is_held(&self, path: &Path) -> bool {
        self.held.contains_key(path)
    }

    pub fn held(&self) -> impl Iterator<Item = &Path> {
        self.held.keys().map(PathBuf::as_path)
    }

    fn holds_lease(&self, path: &Path, lease: Lease) -> bool {
        self.held.get(path) == Some(&lease)
    }

    pub fn step(&mut self, event: LockEvent) -> Transition {
        match event {
            LockEvent::Acquire { path } => {
                if self.is_held(&path) {
                    tracing::warn!("{} is already locked by this process", path.display());
                    return Transition::outcome(LockOutcome::AlreadyLocked { path });
                }
                Transition::effects(vec![LockEffect::CreateMarker {
                    path,
                    attempt: Attempt::default(),
                }])
            }

            LockEvent::RetryDue { path, attempt } => {
                Transition::effects(vec![LockEffect::CreateMarker { path, attempt }])
            }

            LockEvent::MarkerCreated { path, .. } => {
                let lease = self.next_lease;
                self.next_lease += 1;
                self.held.insert(path.clone(), lease);
                tracing::debug!("acquired {} (lease {lease})", path.display());
                Transition {
                    effects: vec![LockEffect::Schedule {
                        after: TOUCH_INTERVAL,
                        event: LockEvent::TouchDue {
                            path: path.clone(),
                            lease,
                        },
                    }],
                    outcome: Some(LockOutcome::Acquired { path }),
                }
            }

            LockEvent::MarkerCreateFailed {
                path,
                attempt,
                error,
            } => {
                if error.kind() == io::ErrorKind::AlreadyExists {
                    Transition::effects(vec![LockEffect::InspectMarker { path, attempt }])
                } else {
                    Transition::outcome(LockOutcome::UnexpectedError { path, error })
                }
            }

            LockEvent::MarkerInspected {
                path,
                attempt,
                last_accessed,
                now,
            } => {
                let age = now.duration_since(last_accessed).unwrap_or(Duration::ZERO);
                if age > STALE_AFTER {
                    tracing::debug!(
                        "{} marker untouched for {}ms, taking over",
                        path.display(),
                        age.as_millis()
                    );
                    self.recover(path, attempt)
                } else {
                    self.contended(path, attempt)
                }
            }

            LockEvent::MarkerInspectFailed {
                path,
                attempt,
                error,
            } => {
                if error.kind() == io::ErrorKind::NotFound {
                    // Holder released between our create and inspect.
                    self.recover(path, attempt)
                } else {
                    Transition::outcome(LockOutcome::UnexpectedError { path, error })
                }
            }

            LockEvent::TouchDue { path, lease } => {
                if self.holds_lease(&path, lease) {
                    Transition::effects(vec![LockEffect::TouchMarker { path, lease }])
                } else {
                    Transition::nothing()
                }
            }

            LockEvent::Touched { path, lease } => {
                if self.holds_lease(&path, lease) {
                    Transition::effects(vec![LockEffect::Schedule {
                        after: TOUCH_INTERVAL,
                        event: LockEvent::TouchDue { path, lease },
                    }])
                } else {
                    Transition::nothing()
                }
            }

            LockEvent::TouchFailed { path, lease, error } => {
                if self.holds_lease(&path, lease) {
                    self.held.remove(&path);
                    Transition::outcome(LockOutcome::UnexpectedError { path, error })
                } else {
                    Transition::nothing()
                }
            }

            LockEvent::Release { path } => {
                if self.held.remove(&path).is_none() {
                    return Transition::nothing();
                }
                tracing::debug!("released {}", path.display());
                Transition {
                    effects: vec![LockEffect::RemoveMarker { path: path.clone() }],
                    outcome: Some(LockOutcome::Released { path }),
                }
            }
        }
    }

    /// Remove an abandoned marker and try again straight away.
    fn recover(&self, path: PathBuf, attempt: Attempt) -> Transition {
        if attempt.stale_recoveries >= MAX_STALE_RECOVERIES {
            tracing::warn!(
                "{} stayed stale after {} takeovers, giving up",
                path.display(),
                attempt.stale_recoveries
            );
            return Transition::outcome(LockOutcome::AlreadyLocked { path });
        }
        Transition::effects(vec![
            LockEffect::RemoveMarker { path: path.clone() },
            LockEffect::CreateMarker {
                path,
                attempt: attempt.recover(),
            },
        ])
    }

    /// A live process holds the marker.
    fn contended(&self, path: PathBuf, attempt: Attempt) -> Transition {
        match self.retry {
            Some(policy) if attempt.number < policy.attempts => {
                tracing::debug!(
                    "{} is locked, retry {} of {} in {}ms",
                    path.display(),
                    attempt.number + 1,
                    policy.attempts,
                    policy.between.as_millis()
                );
                Transition::effects(vec![LockEffect::Schedule {
                    after: policy.between,
                    event: LockEvent::RetryDue {
                        path,
                        attempt: attempt.retry(),
                    },
                }])
            }
            _ => Transition::outcome(LockOutcome::AlreadyLocked { path }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> PathBuf {
        PathBuf::from("/cache")
    }

    fn at(millis: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_millis(millis)
    }

    fn exists() -> io::Error {
        io::Error::from(io::ErrorKind::AlreadyExists)
    }

    fn created(state: &mut LockState) -> Lease {
        let transition = state.step(LockEvent::MarkerCreated {
            path: path(),
            attempt: Attempt::default(),
        });
        match transition.effects.as_slice() {
            [LockEffect::Schedule {
                event: LockEvent::TouchDue { lease, .. },
                ..
            }] => *lease,
            other => panic!("expected a touch to be scheduled, got {other:?}"),
        }
    }

    #[test]
    fn acquire_starts_by_creating_the_marker() {
        let mut state = LockState::new(None);
        let transition = state.step(LockEvent::Acquire { path: path() });
        assert!(transition.outcome.is_none());
        assert!(matches!(
            transition.effects.as_slice(),
            [LockEffect::CreateMarker { attempt, .. }] if *attempt == Attempt::default()
        ));
    }

    #[test]
    fn created_marker_is_held_and_touched() {
        let mut state = LockState::new(None);
        let transition = state.step(LockEvent::MarkerCreated {
            path: path(),
            attempt: Attempt::default(),
        });
        assert!(matches!(transition.outcome, Some(LockOutcome::Acquired { .. })));
        assert!(matches!(
            transition.effects.as_slice(),
            [LockEffect::Schedule { after, .. }] if *after == TOUCH_INTERVAL
        ));
        assert!(state.is_held(&path()));
    }

    #[test]
    fn existing_marker_is_inspected() {
        let mut state = LockState::new(None);
        let transition = state.step(LockEvent::MarkerCreateFailed {
            path: path(),
            attempt: Attempt::default(),
            error: exists(),
        });
        assert!(matches!(
            transition.effects.as_slice(),
            [LockEffect::InspectMarker { .. }]
        ));
    }

    #[test]
    fn other_create_errors_are_unexpected() {
        let mut state = LockState::new(Some(RetryPolicy::new(5, 10)));
        let transition = state.step(LockEvent::MarkerCreateFailed {
            path: path(),
            attempt: Attempt::default(),
            error: io::Error::from(io::ErrorKind::PermissionDenied),
        });
        assert!(transition.effects.is_empty());
        assert!(matches!(
            transition.outcome,
            Some(LockOutcome::UnexpectedError { ref error, .. })
                if error.kind() == io::ErrorKind::PermissionDenied
        ));
    }

    #[test]
    fn live_marker_without_policy_is_already_locked() {
        let mut state = LockState::new(None);
        let transition = state.step(LockEvent::MarkerInspected {
            path: path(),
            attempt: Attempt::default(),
            last_accessed: at(10_000),
            now: at(10_800),
        });
        assert!(transition.effects.is_empty());
        assert!(matches!(
            transition.outcome,
            Some(LockOutcome::AlreadyLocked { .. })
        ));
    }

    #[test]
    fn marker_exactly_at_threshold_is_still_live() {
        let mut state = LockState::new(None);
        let transition = state.step(LockEvent::MarkerInspected {
            path: path(),
            attempt: Attempt::default(),
            last_accessed: at(10_000),
            now: at(15_000),
        });
        assert!(matches!(
            transition.outcome,
            Some(LockOutcome::AlreadyLocked { .. })
        ));
    }

    #[test]
    fn marker_from_the_future_is_live() {
        let mut state = LockState::new(None);
        let transition = state.step(LockEvent::MarkerInspected {
            path: path(),
            attempt: Attempt::default(),
            last_accessed: at(20_000),
            now: at(10_000),
        });
        assert!(matches!(
            transition.outcome,
            Some(LockOutcome::AlreadyLocked { .. })
        ));
    }

    #[test]
    fn stale_marker_is_removed_and_retried_immediately() {
        let mut state = LockState::new(None);
        let transition = state.step(LockEvent::MarkerInspected {
            path: path(),
            attempt: Attempt::default(),
            last_accessed: at(10_000),
            now: at(15_001),
        });
        assert!(transition.outcome.is_none());
        match transition.effects.as_slice() {
            [LockEffect::RemoveMarker { .. }, LockEffect::CreateMarker { attempt, .. }] => {
                assert_eq!(attempt.number, 1);
                assert_eq!(attempt.stale_recoveries, 1);
            }
            other => panic!("unexpected effects {other:?}"),
        }
    }

    #[test]
    fn stale_recovery_is_bounded() {
        let mut state = LockState::new(None);
        let transition = state.step(LockEvent::MarkerInspected {
            path: path(),
            attempt: Attempt {
                number: MAX_STALE_RECOVERIES,
                stale_recoveries: MAX_STALE_RECOVERIES,
            },
            last_accessed: at(0),
            now: at(60_000),
        });
        assert!(transition.effects.is_empty());
        assert!(matches!(
            transition.outcome,
            Some(LockOutcome::AlreadyLocked { .. })
        ));
    }

    #[test]
    fn vanished_marker_is_retried() {
        let mut state = LockState::new(None);
        let transition = state.step(LockEvent::MarkerInspectFailed {
            path: path(),
            attempt: Attempt::default(),
            error: io::Error::from(io::ErrorKind::NotFound),
        });
        assert!(matches!(
            transition.effects.as_slice(),
            [LockEffect::RemoveMarker { .. }, LockEffect::CreateMarker { .. }]
        ));
    }

    #[test]
    fn inspect_errors_are_unexpected() {
        let mut state = LockState::new(None);
        let transition = state.step(LockEvent::MarkerInspectFailed {
            path: path(),
            attempt: Attempt::default(),
            error: io::Error::from(io::ErrorKind::PermissionDenied),
        });
        assert!(matches!(
            transition.outcome,
            Some(LockOutcome::UnexpectedError { .. })
        ));
    }

    #[test]
    fn retry_policy_spaces_attempts_then_gives_up() {
        let policy = RetryPolicy::new(3, 250);
        let mut state = LockState::new(Some(policy));
        let mut attempt = Attempt::default();
        let mut retries = 0;

        loop {
            let transition = state.step(LockEvent::MarkerInspected {
                path: path(),
                attempt,
                last_accessed: at(1_000),
                now: at(1_500),
            });
            match (transition.outcome, transition.effects.as_slice()) {
                (
                    None,
                    [LockEffect::Schedule {
                        after,
                        event: LockEvent::RetryDue { attempt: next, .. },
                    }],
                ) => {
                    assert_eq!(*after, Duration::from_millis(250));
                    retries += 1;
                    attempt = *next;
                }
                (Some(LockOutcome::AlreadyLocked { .. }), []) => break,
                (outcome, effects) => panic!("unexpected {outcome:?} / {effects:?}"),
            }
        }

        assert_eq!(retries, 3);
    }

    #[test]
    fn retry_due_creates_the_marker_again() {
        let mut state = LockState::new(None);
        let attempt = Attempt {
            number: 2,
            stale_recoveries: 0,
        };
        let transition = state.step(LockEvent::RetryDue {
            path: path(),
            attempt,
        });
        assert!(matches!(
            transition.effects.as_slice(),
            [LockEffect::CreateMarker { attempt: a, .. }] if *a == attempt
        ));
    }

    #[test]
    fn touch_loop_reschedules_while_held() {
        let mut state = LockState::new(None);
        let lease = created(&mut state);

        let due = state.step(LockEvent::TouchDue {
            path: path(),
            lease,
        });
        assert!(matches!(
            due.effects.as_slice(),
            [LockEffect::TouchMarker { .. }]
        ));

        let touched = state.step(LockEvent::Touched {
            path: path(),
            lease,
        });
        assert!(matches!(
            touched.effects.as_slice(),
            [LockEffect::Schedule { after, event: LockEvent::TouchDue { .. } }]
                if *after == TOUCH_INTERVAL
        ));
    }

    #[test]
    fn touch_failure_drops_the_hold() {
        let mut state = LockState::new(None);
        let lease = created(&mut state);
        let transition = state.step(LockEvent::TouchFailed {
            path: path(),
            lease,
            error: io::Error::from(io::ErrorKind::PermissionDenied),
        });
        assert!(matches!(
            transition.outcome,
            Some(LockOutcome::UnexpectedError { .. })
        ));
        assert!(!state.is_held(&path()));
    }

    #[test]
    fn release_removes_marker_once() {
        let mut state = LockState::new(None);
        created(&mut state);

        let first = state.step(LockEvent::Release { path: path() });
        assert!(matches!(first.outcome, Some(LockOutcome::Released { .. })));
        assert!(matches!(
            first.effects.as_slice(),
            [LockEffect::RemoveMarker { .. }]
        ));

        let second = state.step(LockEvent::Release { path: path() });
        assert!(second.outcome.is_none());
        assert!(second.effects.is_empty());
    }

    #[test]
    fn timers_from_an_earlier_hold_are_ignored() {
        let mut state = LockState::new(None);
        let old = created(&mut state);
        state.step(LockEvent::Release { path: path() });
        let new = created(&mut state);
        assert_ne!(old, new);

        let stale_timer = state.step(LockEvent::TouchDue {
            path: path(),
            lease: old,
        });
        assert!(stale_timer.effects.is_empty());

        let stale_failure = state.step(LockEvent::TouchFailed {
            path: path(),
            lease: old,
            error: io::Error::from(io::ErrorKind::NotFound),
        });
        assert!(stale_failure.outcome.is_none());
        assert!(state.is_held(&path()));
    }

    #[test]
    fn reentrant_acquire_is_rejected() {
        let mut state = LockState::new(Some(RetryPolicy::new(3, 10)));
        created(&mut state);
        let transition = state.step(LockEvent::Acquire { path: path() });
        assert!(transition.effects.is_empty());
        assert!(matches!(
            transition.outcome,
            Some(LockOutcome::AlreadyLocked { .. })
        ));
    }
}
