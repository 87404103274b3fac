//! The live workout session: set logging, exercise navigation, and the
//! rest timer that runs between sets.
//!
//! A [`WorkoutSession`] is an ordinary owned value. Callers that need to
//! share one across threads or drive its rest timer asynchronously wrap it
//! in a [`crate::engine::SessionEngine`].
//!
//! ## Set pointer policy
//!
//! Logging or skipping advances the set pointer by one. After the last set
//! of an exercise the pointer wraps back to 0 rather than moving on to the
//! next exercise; moving between exercises is always an explicit
//! navigation call. Because a wrapped pointer can land on a set that is
//! already logged, logging onto a completed set is ignored and the earlier
//! result is kept.

use crate::aggregate;
use crate::clock::{Clock, SystemClock};
use crate::rest_timer::{RestStatus, RestTick, RestTimer};
use crate::{CompletedSet, Error, Result, WorkoutLog, WorkoutPlan};
use chrono::{DateTime, Utc};

/// Why a set operation left the session unchanged
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    NoActiveSession,
    /// The caller targeted an exercise other than the current one
    StaleExerciseIndex { expected: usize, got: usize },
    SetAlreadyCompleted { set_index: usize },
    /// Weight was negative, NaN or infinite
    InvalidWeight,
}

/// Result of [`WorkoutSession::log_set`] or [`WorkoutSession::skip_set`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetOutcome {
    /// Set recorded; `rest_seconds` is set when a countdown started
    Logged {
        set_index: usize,
        rest_seconds: Option<u32>,
    },
    Skipped {
        set_index: usize,
    },
    Ignored(IgnoreReason),
}

/// Read-only view of an active session for display
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSnapshot {
    pub workout_name: String,
    pub exercise_index: usize,
    pub exercise_count: usize,
    pub exercise_name: String,
    pub set_index: usize,
    pub sets_in_exercise: u32,
    pub completed_sets: u32,
    pub total_sets: u32,
    pub elapsed_secs: i64,
    pub rest: RestStatus,
}

#[derive(Clone, Debug)]
struct ActiveSession {
    plan: WorkoutPlan,
    exercise_index: usize,
    set_index: usize,
    started_at: DateTime<Utc>,
}

/// One workout session; inactive until [`start`](Self::start) is called
#[derive(Debug)]
pub struct WorkoutSession<C: Clock = SystemClock> {
    clock: C,
    active: Option<ActiveSession>,
    rest: RestTimer,
}

impl Default for WorkoutSession<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkoutSession<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl<C: Clock> WorkoutSession<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            active: None,
            rest: RestTimer::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// The session's own copy of the plan, including per-set results
    pub fn plan(&self) -> Option<&WorkoutPlan> {
        self.active.as_ref().map(|a| &a.plan)
    }

    pub fn current_exercise_index(&self) -> Option<usize> {
        self.active.as_ref().map(|a| a.exercise_index)
    }

    pub fn current_set_index(&self) -> Option<usize> {
        self.active.as_ref().map(|a| a.set_index)
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.active.as_ref().map(|a| a.started_at)
    }

    /// Begin a session from `plan`.
    ///
    /// The plan is deep-copied and every exercise gets a fresh, incomplete
    /// record per planned set. Fails if the plan is unusable or a session
    /// is already running.
    pub fn start(&mut self, plan: &WorkoutPlan) -> Result<()> {
        if let Some(active) = &self.active {
            return Err(Error::SessionActive(active.plan.name.clone()));
        }
        plan.validate()?;

        let started_at = self.clock.now();
        self.rest.cancel();
        self.active = Some(ActiveSession {
            plan: plan.prepared_for_session(),
            exercise_index: 0,
            set_index: 0,
            started_at,
        });

        tracing::info!(
            workout = %plan.name,
            exercises = plan.exercises.len(),
            "session started"
        );
        Ok(())
    }

    /// Record the current set of the current exercise and advance.
    ///
    /// Starts the rest countdown when the exercise has sets left; logging the
    /// final set instead clears any countdown and wraps the pointer to 0.
    pub fn log_set(&mut self, exercise_index: usize, reps: u32, weight: f64) -> SetOutcome {
        let now = self.clock.now();
        let Some(active) = self.active.as_mut() else {
            tracing::warn!("log_set ignored: no active session");
            return SetOutcome::Ignored(IgnoreReason::NoActiveSession);
        };
        if exercise_index != active.exercise_index {
            tracing::warn!(
                expected = active.exercise_index,
                got = exercise_index,
                "log_set ignored: stale exercise index"
            );
            return SetOutcome::Ignored(IgnoreReason::StaleExerciseIndex {
                expected: active.exercise_index,
                got: exercise_index,
            });
        }

        if !weight.is_finite() || weight < 0.0 {
            tracing::warn!(weight, "log_set ignored: invalid weight");
            return SetOutcome::Ignored(IgnoreReason::InvalidWeight);
        }

        let set_index = active.set_index;
        let exercise = &mut active.plan.exercises[active.exercise_index];
        let slot = &mut exercise.completed_sets[set_index];
        if slot.completed {
            tracing::warn!(
                exercise = %exercise.name,
                set_index,
                "log_set ignored: set already completed"
            );
            return SetOutcome::Ignored(IgnoreReason::SetAlreadyCompleted { set_index });
        }

        *slot = CompletedSet {
            reps,
            weight,
            completed: true,
        };
        tracing::debug!(exercise = %exercise.name, set_index, reps, weight, "set logged");

        let next = set_index + 1;
        let rest_seconds = if next < exercise.sets as usize {
            active.set_index = next;
            let secs = exercise.rest_seconds;
            self.rest.start(secs, now).map(|_| secs)
        } else {
            active.set_index = 0;
            self.rest.cancel();
            None
        };

        SetOutcome::Logged {
            set_index,
            rest_seconds,
        }
    }

    /// Advance past the current set without recording anything.
    ///
    /// A countdown started by an earlier log keeps running.
    pub fn skip_set(&mut self, exercise_index: usize) -> SetOutcome {
        let Some(active) = self.active.as_mut() else {
            tracing::warn!("skip_set ignored: no active session");
            return SetOutcome::Ignored(IgnoreReason::NoActiveSession);
        };
        if exercise_index != active.exercise_index {
            tracing::warn!(
                expected = active.exercise_index,
                got = exercise_index,
                "skip_set ignored: stale exercise index"
            );
            return SetOutcome::Ignored(IgnoreReason::StaleExerciseIndex {
                expected: active.exercise_index,
                got: exercise_index,
            });
        }

        let set_index = active.set_index;
        let sets = active.plan.exercises[active.exercise_index].sets as usize;
        active.set_index = (set_index + 1) % sets;
        tracing::debug!(set_index, "set skipped");

        SetOutcome::Skipped { set_index }
    }

    /// Move to the next exercise (stays on the last one at the end)
    pub fn next_exercise(&mut self) -> Option<usize> {
        let current = self.current_exercise_index()?;
        self.move_to(current.saturating_add(1))
    }

    /// Move to the previous exercise (stays on the first one at the start)
    pub fn prev_exercise(&mut self) -> Option<usize> {
        let current = self.current_exercise_index()?;
        self.move_to(current.saturating_sub(1))
    }

    /// Jump to exercise `index`, clamped to the plan
    pub fn set_current_exercise(&mut self, index: usize) -> Option<usize> {
        self.move_to(index)
    }

    /// Every navigation resets the set pointer and stops the rest countdown,
    /// including when clamping leaves the exercise unchanged.
    fn move_to(&mut self, target: usize) -> Option<usize> {
        let active = self.active.as_mut()?;
        let last = active.plan.exercises.len() - 1;
        active.exercise_index = target.min(last);
        active.set_index = 0;
        self.rest.cancel();

        tracing::debug!(exercise_index = active.exercise_index, "navigated");
        Some(active.exercise_index)
    }

    pub fn rest_status(&self) -> RestStatus {
        self.rest.status(self.clock.now())
    }

    /// Advance the rest timer to the current time; called on tick boundaries
    pub fn poll_rest_timer(&mut self) -> RestTick {
        let now = self.clock.now();
        self.rest.poll(now)
    }

    pub fn cancel_rest_timer(&mut self) -> bool {
        self.rest.cancel()
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        let active = self.active.as_ref()?;
        let now = self.clock.now();
        let exercise = &active.plan.exercises[active.exercise_index];

        Some(SessionSnapshot {
            workout_name: active.plan.name.clone(),
            exercise_index: active.exercise_index,
            exercise_count: active.plan.exercises.len(),
            exercise_name: exercise.name.clone(),
            set_index: active.set_index,
            sets_in_exercise: exercise.sets,
            completed_sets: active.plan.exercises.iter().map(|e| e.completed_count()).sum(),
            total_sets: active.plan.total_sets(),
            elapsed_secs: (now - active.started_at).num_seconds().max(0),
            rest: self.rest.status(now),
        })
    }

    /// Finish the session and return its summary.
    ///
    /// The session is inactive afterwards. Returns `None` when there was no
    /// active session. Persisting the log is the caller's concern.
    pub fn complete(&mut self, rating: u8, note: &str) -> Option<WorkoutLog> {
        let Some(active) = self.active.take() else {
            tracing::debug!("complete ignored: no active session");
            return None;
        };
        self.rest.cancel();

        let log = aggregate::summarize(
            &active.plan,
            active.started_at,
            self.clock.now(),
            rating,
            note,
        );
        tracing::info!(
            workout = %log.workout_name,
            completed_sets = log.completed_sets,
            total_volume = log.total_volume,
            duration_minutes = log.duration_minutes,
            "session completed"
        );
        Some(log)
    }

    /// Discard the session. Returns whether one was active.
    pub fn cancel(&mut self) -> bool {
        self.rest.cancel();
        match self.active.take() {
            Some(active) => {
                tracing::info!(workout = %active.plan.name, "session cancelled");
                true
            }
            None => false,
        }
    }
}
