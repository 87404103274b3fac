//! Workout plan loading, validation, and the built-in sample plan.

use crate::types::*;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use std::path::Path;

/// Cached sample plan - built once and reused
static SAMPLE_PLAN: Lazy<WorkoutPlan> = Lazy::new(build_sample_plan);

/// Get a reference to the built-in sample plan
///
/// Used by the CLI when no plan file is given.
pub fn sample_plan() -> &'static WorkoutPlan {
    &SAMPLE_PLAN
}

/// Load a plan from a JSON file and validate it
pub fn load_plan(path: &Path) -> Result<WorkoutPlan> {
    let contents = std::fs::read_to_string(path)?;
    let plan: WorkoutPlan = serde_json::from_str(&contents)?;
    plan.validate()?;
    tracing::info!("Loaded plan {:?} from {:?}", plan.name, path);
    Ok(plan)
}

impl WorkoutPlan {
    /// Check that a session can be started from this plan
    pub fn validate(&self) -> Result<()> {
        if self.exercises.is_empty() {
            return Err(Error::InvalidPlan(format!(
                "plan '{}' has no exercises",
                self.name
            )));
        }

        if let Some(exercise) = self.exercises.iter().find(|e| e.sets == 0) {
            return Err(Error::InvalidPlan(format!(
                "exercise '{}' has zero sets",
                exercise.name
            )));
        }

        Ok(())
    }

    /// Deep copy with one zeroed, incomplete set record per planned set
    pub fn prepared_for_session(&self) -> WorkoutPlan {
        let mut plan = self.clone();
        for exercise in &mut plan.exercises {
            exercise.completed_sets = vec![CompletedSet::default(); exercise.sets as usize];
        }
        plan
    }

    /// Sum of planned sets across all exercises
    pub fn total_sets(&self) -> u32 {
        self.exercises.iter().map(|e| e.sets).sum()
    }
}

fn exercise(
    name: &str,
    muscle_group: &str,
    sets: u32,
    rep_target: &str,
    suggested_load: &str,
    rest_seconds: u32,
) -> Exercise {
    Exercise {
        name: name.into(),
        muscle_group: muscle_group.into(),
        sets,
        rep_target: rep_target.into(),
        suggested_load: suggested_load.into(),
        rest_seconds,
        instructions: String::new(),
        tips: vec![],
        alternatives: vec![],
        completed_sets: vec![],
    }
}

fn build_sample_plan() -> WorkoutPlan {
    let mut squat = exercise("Goblet Squat", "legs", 3, "10-12", "16kg kettlebell", 90);
    squat.instructions = "Hold the bell at the chest, sit between the heels.".into();
    squat.tips = vec!["Keep the chest tall".into(), "Knees track the toes".into()];
    squat.alternatives = vec!["Bodyweight Squat".into(), "Split Squat".into()];

    let mut pushup = exercise("Push-up", "chest", 3, "8-15", "bodyweight", 60);
    pushup.instructions = "Hands under shoulders, lower until the chest nearly touches.".into();
    pushup.alternatives = vec!["Incline Push-up".into()];

    let mut row = exercise("One-arm Row", "back", 3, "10 each side", "20kg dumbbell", 60);
    row.tips = vec!["Pull the elbow toward the hip".into()];

    let plank = exercise("Plank", "core", 2, "30-45s", "bodyweight", 45);

    WorkoutPlan {
        name: "Full Body Basics".into(),
        target_muscles: vec![
            "legs".into(),
            "chest".into(),
            "back".into(),
            "core".into(),
        ],
        estimated_duration_minutes: 35,
        estimated_calories: None,
        warmup: vec![
            PlanStep {
                name: "Jumping jacks".into(),
                duration: "2 min".into(),
            },
            PlanStep {
                name: "Hip openers".into(),
                duration: "1 min".into(),
            },
        ],
        exercises: vec![squat, pushup, row, plank],
        cooldown: vec![PlanStep {
            name: "Hamstring stretch".into(),
            duration: "1 min".into(),
        }],
        coach_note: "Leave one or two reps in the tank on every set.".into(),
    }
}
