//! CSV export of workout history.

use crate::{Result, WorkoutLog};
use std::fs::OpenOptions;
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow<'a> {
    id: String,
    date: &'a str,
    workout: &'a str,
    duration_minutes: u32,
    total_volume: f64,
    completed_exercises: u32,
    completed_sets: u32,
    total_sets: u32,
    calories_burned: u32,
    rating: u8,
    note: &'a str,
    started_at: String,
    ended_at: String,
}

impl<'a> From<&'a WorkoutLog> for CsvRow<'a> {
    fn from(log: &'a WorkoutLog) -> Self {
        CsvRow {
            id: log.id.to_string(),
            date: &log.date_key,
            workout: &log.workout_name,
            duration_minutes: log.duration_minutes,
            total_volume: log.total_volume,
            completed_exercises: log.completed_exercises,
            completed_sets: log.completed_sets,
            total_sets: log.total_sets,
            calories_burned: log.calories_burned,
            rating: log.rating,
            note: &log.note,
            started_at: log.started_at.to_rfc3339(),
            ended_at: log.ended_at.to_rfc3339(),
        }
    }
}

/// Append logs to a CSV file, writing headers only when the file is new
/// or empty. Returns the number of rows written.
pub fn write_csv(logs: &[WorkoutLog], path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let needs_headers = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_headers)
        .from_writer(file);

    for log in logs {
        writer.serialize(CsvRow::from(log))?;
    }
    writer.flush()?;

    tracing::info!("Exported {} workout logs to {:?}", logs.len(), path);
    Ok(logs.len())
}
