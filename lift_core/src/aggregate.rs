//! Completion summary for a finished session.
//!
//! Turns the final per-set state of a plan into a [`WorkoutLog`]:
//! - Volume is `reps * weight` summed over completed sets only
//! - Total sets counts every planned set, done or not
//! - Duration is whole minutes of wall time, rounded to nearest
//! - Calories come from the plan estimate, else a flat per-minute rate

use crate::{ExerciseRecord, WorkoutLog, WorkoutPlan};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Calorie burn assumed when the plan carries no estimate
pub const FALLBACK_KCAL_PER_MINUTE: f64 = 7.0;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// Build the workout log for a session that ran from `started_at` to `ended_at`
pub fn summarize(
    plan: &WorkoutPlan,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    rating: u8,
    note: &str,
) -> WorkoutLog {
    let mut total_volume = 0.0;
    let mut completed_sets = 0;
    let mut completed_exercises = 0;

    for exercise in &plan.exercises {
        let done = exercise.completed_count();
        if done > 0 {
            completed_exercises += 1;
        }
        completed_sets += done;
        total_volume += exercise
            .completed_sets
            .iter()
            .map(|s| s.volume())
            .sum::<f64>();
    }

    let duration = duration_minutes(started_at, ended_at);

    WorkoutLog {
        id: Uuid::new_v4(),
        date_key: date_key(ended_at),
        workout_name: plan.name.clone(),
        target_muscles: plan.target_muscles.clone(),
        exercises: plan
            .exercises
            .iter()
            .map(|e| ExerciseRecord {
                name: e.name.clone(),
                muscle_group: e.muscle_group.clone(),
                sets: e.completed_sets.clone(),
            })
            .collect(),
        duration_minutes: duration,
        total_volume,
        completed_exercises,
        total_sets: plan.total_sets(),
        completed_sets,
        calories_burned: estimate_calories(plan, duration),
        rating: rating.clamp(MIN_RATING, MAX_RATING),
        note: note.to_string(),
        started_at,
        ended_at,
    }
}

/// Elapsed minutes, rounded to nearest; zero if the clock ran backwards
pub fn duration_minutes(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> u32 {
    let elapsed_ms = (ended_at - started_at).num_milliseconds().max(0);
    (elapsed_ms as f64 / 60_000.0).round() as u32
}

/// Plan estimate when positive, otherwise `duration * 7` rounded
pub fn estimate_calories(plan: &WorkoutPlan, duration_minutes: u32) -> u32 {
    match plan.estimated_calories {
        Some(kcal) if kcal > 0 => kcal,
        _ => (f64::from(duration_minutes) * FALLBACK_KCAL_PER_MINUTE).round() as u32,
    }
}

/// Upsert key for the store: the UTC calendar date of `at`
pub fn date_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}
