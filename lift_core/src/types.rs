//! Core domain types for the workout session engine.
//!
//! This module defines:
//! - Workout plans and their exercises (input from a plan catalog)
//! - Per-set completion records
//! - The persisted workout log produced when a session completes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rest between sets when a plan does not say otherwise
pub const DEFAULT_REST_SECONDS: u32 = 60;

fn default_rest_seconds() -> u32 {
    DEFAULT_REST_SECONDS
}

// ============================================================================
// Plan Types
// ============================================================================

/// A warmup or cooldown step. Both fields are display strings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanStep {
    pub name: String,
    #[serde(default)]
    pub duration: String,
}

/// Outcome of one planned set
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct CompletedSet {
    pub reps: u32,
    /// Load in the user's unit; 0 for bodyweight work
    pub weight: f64,
    pub completed: bool,
}

impl CompletedSet {
    /// Training volume contributed by this set (zero unless completed)
    pub fn volume(&self) -> f64 {
        if self.completed {
            f64::from(self.reps) * self.weight
        } else {
            0.0
        }
    }
}

/// One exercise in a plan, carrying its per-set results once a session runs
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub name: String,
    #[serde(default)]
    pub muscle_group: String,
    pub sets: u32,
    /// Display only, e.g. "8-12"
    #[serde(default)]
    pub rep_target: String,
    /// Display only, e.g. "60% 1RM"
    #[serde(default)]
    pub suggested_load: String,
    #[serde(default = "default_rest_seconds")]
    pub rest_seconds: u32,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub tips: Vec<String>,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub completed_sets: Vec<CompletedSet>,
}

impl Exercise {
    /// Number of sets marked completed
    pub fn completed_count(&self) -> u32 {
        self.completed_sets.iter().filter(|s| s.completed).count() as u32
    }
}

/// A workout template as supplied by the plan catalog
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutPlan {
    pub name: String,
    #[serde(default)]
    pub target_muscles: Vec<String>,
    #[serde(default)]
    pub estimated_duration_minutes: u32,
    #[serde(default)]
    pub estimated_calories: Option<u32>,
    #[serde(default)]
    pub warmup: Vec<PlanStep>,
    pub exercises: Vec<Exercise>,
    #[serde(default)]
    pub cooldown: Vec<PlanStep>,
    #[serde(default)]
    pub coach_note: String,
}

// ============================================================================
// Workout Log
// ============================================================================

/// Set results for one exercise, as stored in a workout log
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExerciseRecord {
    pub name: String,
    pub muscle_group: String,
    pub sets: Vec<CompletedSet>,
}

/// Immutable summary of a completed session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkoutLog {
    pub id: Uuid,
    /// `YYYY-MM-DD` of `ended_at` (UTC); the store's upsert key
    pub date_key: String,
    pub workout_name: String,
    pub target_muscles: Vec<String>,
    pub exercises: Vec<ExerciseRecord>,
    pub duration_minutes: u32,
    pub total_volume: f64,
    pub completed_exercises: u32,
    pub total_sets: u32,
    pub completed_sets: u32,
    pub calories_burned: u32,
    pub rating: u8,
    pub note: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}
