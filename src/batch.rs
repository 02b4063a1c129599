use std::path::PathBuf;

use serde::Serialize;
use serde_json::{Map, Number, Value};
use tracing::info;

use crate::dataset::{write_table, DatasetCatalog, DatasetSource, RawTable};
use crate::error::{ServiceError, ServiceResult};
use crate::harmonize::harmonize;
use crate::inference::round2;
use crate::models::{clip, GRADE_RANGE};
use crate::training::TrainedArtifact;

pub const PREDICTION_COLUMN: &str = "PredictedGrade";

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub saved_files: Vec<PathBuf>,
    pub rows: Vec<Map<String, Value>>,
    pub count: usize,
}

/// Original columns plus the appended prediction column.
pub fn augment(artifact: &TrainedArtifact, source: DatasetSource, table: &RawTable) -> ServiceResult<RawTable> {
    let features: Vec<_> = harmonize(source, table)
        .iter()
        .map(|record| record.features())
        .collect();
    let predictions = artifact.predict(&features).map_err(ServiceError::Prediction)?;

    let mut headers = table.headers.clone();
    headers.push(PREDICTION_COLUMN.to_string());
    let rows = table
        .rows
        .iter()
        .zip(predictions)
        .map(|(row, prediction)| {
            let mut row = row.clone();
            row.resize(table.headers.len(), String::new());
            row.push(format!("{:.2}", round2(clip(prediction, GRADE_RANGE))));
            row
        })
        .collect();
    Ok(RawTable::new(headers, rows))
}

fn cell_value(cell: &str) -> Value {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::from(int);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(cell.to_string()))
}

fn preview_row(table: &RawTable, row: &[String]) -> Map<String, Value> {
    table
        .headers
        .iter()
        .zip(row)
        .map(|(header, cell)| (header.clone(), cell_value(cell)))
        .collect()
}

pub fn run(
    artifact: &TrainedArtifact,
    catalog: &DatasetCatalog,
    selector: &str,
    save: bool,
    limit: Option<usize>,
) -> ServiceResult<BatchOutcome> {
    let sources = DatasetSource::parse_selector(selector)
        .ok_or_else(|| ServiceError::UnknownSource(selector.to_string()))?;

    // every source is augmented before anything is written
    let mut augmented = Vec::with_capacity(sources.len());
    for source in sources {
        let table = catalog.load(source)?;
        augmented.push((source, augment(artifact, source, &table)?));
    }

    let mut outcome = BatchOutcome {
        saved_files: Vec::new(),
        rows: Vec::new(),
        count: 0,
    };
    for (source, table) in &augmented {
        outcome.count += table.len();
        let remaining = limit.map_or(usize::MAX, |limit| limit.saturating_sub(outcome.rows.len()));
        outcome.rows.extend(
            table
                .rows
                .iter()
                .take(remaining)
                .map(|row| preview_row(table, row)),
        );

        if save {
            let path = catalog.augmented_path(*source);
            write_table(&path, table)?;
            info!(source = source.tag(), rows = table.len(), path = %path.display(), "saved predictions");
            outcome.saved_files.push(path);
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::tests::{small_config, synthetic_records};
    use crate::training::train;
    use pretty_assertions::assert_eq;

    const SURVEY_CSV: &str = "StudentID,Gender,AttendanceRate,StudyHoursPerWeek,PreviousGrade,FinalGrade\n\
        S1,Male,95,20,80,84\n\
        S2,Female,60,5,55,\n\
        S3,Other,80,12,70,71\n";

    fn artifact() -> TrainedArtifact {
        train(&synthetic_records(60), &small_config()).unwrap()
    }

    fn catalog_with_survey() -> (tempfile::TempDir, DatasetCatalog) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DatasetSource::Survey.file_name()), SURVEY_CSV).unwrap();
        let catalog = DatasetCatalog::new(dir.path());
        (dir, catalog)
    }

    #[test]
    fn appends_clipped_rounded_predictions() {
        let (_dir, catalog) = catalog_with_survey();
        let outcome = run(&artifact(), &catalog, "survey", false, Some(2)).unwrap();
        assert_eq!(outcome.count, 3);
        assert_eq!(outcome.rows.len(), 2);
        assert!(outcome.saved_files.is_empty());

        let first = &outcome.rows[0];
        let keys: Vec<&str> = first.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "StudentID",
                "Gender",
                "AttendanceRate",
                "StudyHoursPerWeek",
                "PreviousGrade",
                "FinalGrade",
                PREDICTION_COLUMN
            ]
        );
        assert_eq!(first["StudentID"], Value::from("S1"));
        assert_eq!(outcome.rows[1]["FinalGrade"], Value::Null);
        let grade = first[PREDICTION_COLUMN].as_f64().unwrap();
        assert!((0.0..=100.0).contains(&grade));
        assert_eq!(round2(grade), grade);
    }

    #[test]
    fn saves_augmented_copy_next_to_original() {
        let (dir, catalog) = catalog_with_survey();
        let outcome = run(&artifact(), &catalog, "survey", true, None).unwrap();
        let expected = dir.path().join("student_performance_updated_1000_with_predictions.csv");
        assert_eq!(outcome.saved_files, vec![expected.clone()]);

        let saved = RawTable::from_reader(std::fs::File::open(expected).unwrap()).unwrap();
        assert_eq!(saved.headers.last().map(String::as_str), Some(PREDICTION_COLUMN));
        assert_eq!(saved.len(), 3);
        assert_eq!(saved.rows[0][0], "S1");
    }

    #[test]
    fn empty_dataset_yields_empty_preview() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = DatasetCatalog::new(dir.path());
        let outcome = run(&artifact(), &catalog, "lifestyle", false, Some(10)).unwrap();
        assert_eq!(outcome.count, 0);
        assert!(outcome.rows.is_empty());

        std::fs::write(dir.path().join(DatasetSource::Survey.file_name()), "Gender,FinalGrade\n").unwrap();
        let outcome = run(&artifact(), &catalog, "survey", true, None).unwrap();
        assert_eq!(outcome.count, 0);
        assert!(outcome.rows.is_empty());
    }

    #[test]
    fn failed_source_leaves_no_partial_copies() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DatasetSource::Lifestyle.file_name()),
            "Student_ID,Study_Hours_Per_Day,Sleep_Hours_Per_Day\n1,3,7\n",
        )
        .unwrap();
        std::fs::write(dir.path().join(DatasetSource::Survey.file_name()), SURVEY_CSV).unwrap();
        let catalog = DatasetCatalog::new(dir.path());

        // classroom is required and absent
        let err = run(&artifact(), &catalog, "all", true, None).unwrap_err();
        assert!(matches!(err, ServiceError::Dataset(_)));
        assert!(!catalog.augmented_path(DatasetSource::Lifestyle).exists());
        assert!(!catalog.augmented_path(DatasetSource::Survey).exists());
    }

    #[test]
    fn unknown_selector_is_a_client_error() {
        let (_dir, catalog) = catalog_with_survey();
        let err = run(&artifact(), &catalog, "df7", false, None).unwrap_err();
        assert!(matches!(err, ServiceError::UnknownSource(ref s) if s == "df7"));
    }

    #[test]
    fn cells_parse_as_json_numbers_when_numeric() {
        assert_eq!(cell_value("12"), Value::from(12));
        assert_eq!(cell_value("3.5"), Value::from(3.5));
        assert_eq!(cell_value("Male"), Value::from("Male"));
        assert_eq!(cell_value(""), Value::Null);
    }
}
