use std::collections::BTreeMap;
use std::fmt::Write;

use serde::Serialize;

use crate::dataset::{DatasetCatalog, DatasetSource, RawTable};
use crate::error::ServiceResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Describe {
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    #[serde(rename = "25%")]
    pub q25: Option<f64>,
    #[serde(rename = "50%")]
    pub q50: Option<f64>,
    #[serde(rename = "75%")]
    pub q75: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceStats {
    pub shape: [usize; 2],
    pub counts: BTreeMap<String, BTreeMap<String, usize>>,
    pub describe: BTreeMap<String, Describe>,
}

pub type DatasetStats = BTreeMap<String, SourceStats>;

fn profiled_columns(source: DatasetSource) -> (&'static [&'static str], &'static [&'static str]) {
    match source {
        DatasetSource::Lifestyle => (
            &["Stress_Level"],
            &["GPA", "Study_Hours_Per_Day", "Sleep_Hours_Per_Day"],
        ),
        DatasetSource::Classroom => (
            &["GradeClass", "Gender", "Extracurricular"],
            &["GPA", "StudyTimeWeekly", "Absences"],
        ),
        DatasetSource::Survey => (
            &["Gender", "ParentalSupport"],
            &["PreviousGrade", "FinalGrade", "StudyHoursPerWeek", "AttendanceRate"],
        ),
    }
}

/// Value counts; empty cells count under `NaN`.
pub fn value_counts(cells: &[Option<&str>]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for cell in cells {
        *counts
            .entry(cell.unwrap_or("NaN").to_string())
            .or_insert(0) += 1;
    }
    counts
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (position - lower as f64)
}

/// Summary of the parseable values; non-numeric cells are skipped.
pub fn describe(cells: &[Option<&str>]) -> Describe {
    let mut values: Vec<f64> = cells
        .iter()
        .flatten()
        .filter_map(|cell| cell.parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .collect();
    values.sort_by(f64::total_cmp);

    let count = values.len();
    if count == 0 {
        return Describe {
            count,
            mean: None,
            std: None,
            min: None,
            q25: None,
            q50: None,
            q75: None,
            max: None,
        };
    }
    let mean = values.iter().sum::<f64>() / count as f64;
    let std = (count > 1).then(|| {
        (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64).sqrt()
    });
    Describe {
        count,
        mean: Some(mean),
        std,
        min: values.first().copied(),
        q25: Some(quantile(&values, 0.25)),
        q50: Some(quantile(&values, 0.5)),
        q75: Some(quantile(&values, 0.75)),
        max: values.last().copied(),
    }
}

pub fn summarize(source: DatasetSource, table: &RawTable) -> SourceStats {
    let (categorical, numeric) = profiled_columns(source);
    let counts = categorical
        .iter()
        .filter_map(|column| Some((column.to_string(), value_counts(&table.column(column)?))))
        .collect();
    let describe = numeric
        .iter()
        .filter_map(|column| Some((column.to_string(), describe(&table.column(column)?))))
        .collect();
    SourceStats {
        shape: table.shape(),
        counts,
        describe,
    }
}

pub fn collect(catalog: &DatasetCatalog) -> ServiceResult<DatasetStats> {
    let mut stats = DatasetStats::new();
    for source in DatasetSource::ALL {
        let table = catalog.load(source)?;
        stats.insert(source.tag().to_string(), summarize(source, &table));
    }
    Ok(stats)
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}

pub fn build_report(stats: &DatasetStats) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Dataset Statistics Report");
    for (source, summary) in stats {
        let _ = writeln!(output);
        let _ = writeln!(output, "## {source}");
        let _ = writeln!(
            output,
            "{} rows across {} columns",
            summary.shape[0], summary.shape[1]
        );

        if summary.counts.is_empty() && summary.describe.is_empty() {
            let _ = writeln!(output, "No profiled columns present.");
            continue;
        }

        for (column, counts) in &summary.counts {
            let _ = writeln!(output);
            let _ = writeln!(output, "### {column} values");
            let mut ordered: Vec<_> = counts.iter().collect();
            ordered.sort_by(|a, b| b.1.cmp(a.1));
            for (value, count) in ordered {
                let _ = writeln!(output, "- {value}: {count}");
            }
        }

        if !summary.describe.is_empty() {
            let _ = writeln!(output);
            let _ = writeln!(output, "| column | count | mean | std | min | 25% | 50% | 75% | max |");
            let _ = writeln!(output, "|---|---|---|---|---|---|---|---|---|");
            for (column, d) in &summary.describe {
                let _ = writeln!(
                    output,
                    "| {} | {} | {} | {} | {} | {} | {} | {} | {} |",
                    column,
                    d.count,
                    fmt_opt(d.mean),
                    fmt_opt(d.std),
                    fmt_opt(d.min),
                    fmt_opt(d.q25),
                    fmt_opt(d.q50),
                    fmt_opt(d.q75),
                    fmt_opt(d.max)
                );
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn describe_matches_linear_quantiles() {
        let cells = [Some("1"), Some("2"), Some("3"), Some("4"), None, Some("x")];
        let d = describe(&cells);
        assert_eq!(d.count, 4);
        assert_eq!(d.mean, Some(2.5));
        assert!((d.std.unwrap() - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(d.q25, Some(1.75));
        assert_eq!(d.q50, Some(2.5));
        assert_eq!(d.q75, Some(3.25));
        assert_eq!((d.min, d.max), (Some(1.0), Some(4.0)));
    }

    #[test]
    fn describe_of_nothing_is_all_null() {
        let d = describe(&[None, Some("abc")]);
        assert_eq!(d.count, 0);
        assert_eq!(d.mean, None);
        assert_eq!(describe(&[Some("7")]).std, None);
    }

    #[test]
    fn counts_include_missing_cells() {
        let counts = value_counts(&[Some("1"), None, Some("1"), Some("0")]);
        assert_eq!(
            counts,
            BTreeMap::from([("0".to_string(), 1), ("1".to_string(), 2), ("NaN".to_string(), 1)])
        );
    }

    #[test]
    fn collects_every_source_and_renders_report() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DatasetSource::Classroom.file_name()),
            "Gender,GPA,GradeClass\n1,3.0,2\n0,2.0,2\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join(DatasetSource::Survey.file_name()),
            "Gender,FinalGrade\nMale,80\n",
        )
        .unwrap();
        let stats = collect(&DatasetCatalog::new(dir.path())).unwrap();
        assert_eq!(stats["lifestyle"].shape, [0, 0]);
        assert_eq!(stats["classroom"].shape, [2, 3]);
        assert_eq!(stats["classroom"].counts["GradeClass"]["2"], 2);
        assert!(!stats["classroom"].describe.contains_key("Absences"));
        assert_eq!(stats["survey"].describe["FinalGrade"].mean, Some(80.0));

        let report = build_report(&stats);
        assert!(report.starts_with("# Dataset Statistics Report"));
        assert!(report.contains("## classroom"));
        assert!(report.contains("| GPA | 2 | 2.50 |"));
        assert!(report.contains("No profiled columns present."));
    }
}
