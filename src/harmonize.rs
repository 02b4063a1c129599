//! Maps the three raw dataset shapes onto [`CanonicalStudentRecord`].
//!
//! Each source is described by a [`SourceMapping`]: for every canonical field,
//! the raw column(s) it reads, how the raw value is converted, and the constant
//! used when the column is absent or a cell does not parse. Unparseable input
//! never fails harmonization.

use tracing::warn;

use crate::dataset::{DatasetSource, RawTable};
use crate::models::{
    clip, normalize_category, CanonicalStudentRecord, ABSENCES_RANGE, AGE_RANGE, GRADE_RANGE,
    SLEEP_RANGE, STUDY_TIME_RANGE,
};

const GENDERS: [&str; 3] = ["male", "female", "other"];

fn identity(value: f64) -> f64 {
    value
}

fn gpa_to_percent(gpa: f64) -> f64 {
    gpa / 4.0 * 100.0
}

fn weekly_to_daily(hours: f64) -> f64 {
    hours / 7.0
}

fn attendance_to_absences(rate: f64) -> f64 {
    ((100.0 - rate) / 100.0 * 30.0).round_ties_even()
}

/// Numeric field: first parseable column (times its multiplier), else `fallback`;
/// then clamped to `bounds` and passed through `convert`.
#[derive(Debug, Clone, Copy)]
pub struct NumericRule {
    pub columns: &'static [(&'static str, f64)],
    pub fallback: f64,
    pub bounds: Option<(f64, f64)>,
    pub convert: fn(f64) -> f64,
}

impl NumericRule {
    pub const fn fixed(value: f64) -> Self {
        Self {
            columns: &[],
            fallback: value,
            bounds: None,
            convert: identity,
        }
    }

    pub fn extract(&self, table: &RawTable, row: usize) -> f64 {
        let raw = self
            .columns
            .iter()
            .find_map(|(column, factor)| table.number(row, column).map(|v| v * factor))
            .unwrap_or(self.fallback);
        let bounded = match self.bounds {
            Some(range) => clip(raw, range),
            None => raw,
        };
        let value = (self.convert)(bounded);
        if value.is_finite() {
            value
        } else {
            (self.convert)(self.fallback)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum CategoryRule {
    Fixed(&'static str),
    Text {
        column: &'static str,
        fallback: &'static str,
    },
    /// Integer code lookup; unknown or missing codes use `fallback`.
    Code {
        column: &'static str,
        codes: &'static [(i64, &'static str)],
        fallback: &'static str,
    },
    /// `yes` when the numeric value is strictly above `threshold`.
    Flag {
        column: &'static str,
        threshold: f64,
        fallback: f64,
    },
}

impl CategoryRule {
    pub fn extract(&self, table: &RawTable, row: usize) -> String {
        match *self {
            CategoryRule::Fixed(value) => value.to_string(),
            CategoryRule::Text { column, fallback } => {
                table.value(row, column).unwrap_or(fallback).to_string()
            }
            CategoryRule::Code {
                column,
                codes,
                fallback,
            } => table
                .number(row, column)
                .and_then(as_code)
                .and_then(|code| codes.iter().find(|(c, _)| *c == code))
                .map(|(_, label)| *label)
                .unwrap_or(fallback)
                .to_string(),
            CategoryRule::Flag {
                column,
                threshold,
                fallback,
            } => {
                let value = table.number(row, column).unwrap_or(fallback);
                let label = if value > threshold { "yes" } else { "no" };
                label.to_string()
            }
        }
    }

    fn column(&self) -> Option<&'static str> {
        match *self {
            CategoryRule::Fixed(_) => None,
            CategoryRule::Text { column, .. }
            | CategoryRule::Code { column, .. }
            | CategoryRule::Flag { column, .. } => Some(column),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum TargetRule {
    Absent,
    Numeric {
        column: &'static str,
    },
    Code {
        column: &'static str,
        codes: &'static [(i64, f64)],
    },
}

impl TargetRule {
    pub fn extract(&self, table: &RawTable, row: usize) -> Option<f64> {
        let grade = match *self {
            TargetRule::Absent => None,
            TargetRule::Numeric { column } => table.number(row, column),
            TargetRule::Code { column, codes } => table
                .number(row, column)
                .and_then(as_code)
                .and_then(|code| codes.iter().find(|(c, _)| *c == code))
                .map(|(_, grade)| *grade),
        };
        grade.map(|grade| clip(grade, GRADE_RANGE))
    }

    fn column(&self) -> Option<&'static str> {
        match *self {
            TargetRule::Absent => None,
            TargetRule::Numeric { column } | TargetRule::Code { column, .. } => Some(column),
        }
    }
}

fn as_code(value: f64) -> Option<i64> {
    (value.fract() == 0.0).then_some(value as i64)
}

#[derive(Debug, Clone, Copy)]
pub struct SourceMapping {
    pub age: NumericRule,
    pub gender: CategoryRule,
    pub study_time_hours: NumericRule,
    pub absences: NumericRule,
    pub parental_education: CategoryRule,
    pub previous_grade: NumericRule,
    pub extracurricular: CategoryRule,
    pub sleep_hours: NumericRule,
    pub final_grade: TargetRule,
}

pub const LIFESTYLE: SourceMapping = SourceMapping {
    age: NumericRule::fixed(17.0),
    gender: CategoryRule::Fixed("other"),
    study_time_hours: NumericRule {
        columns: &[("Study_Hours_Per_Day", 1.0)],
        fallback: 2.0,
        bounds: None,
        convert: identity,
    },
    absences: NumericRule::fixed(5.0),
    parental_education: CategoryRule::Fixed("medium"),
    previous_grade: NumericRule {
        columns: &[("GPA", 1.0)],
        fallback: 2.5,
        bounds: Some((0.0, 4.0)),
        convert: gpa_to_percent,
    },
    extracurricular: CategoryRule::Flag {
        column: "Extracurricular_Hours_Per_Day",
        threshold: 0.5,
        fallback: 0.0,
    },
    sleep_hours: NumericRule {
        columns: &[("Sleep_Hours_Per_Day", 1.0)],
        fallback: 7.0,
        bounds: None,
        convert: identity,
    },
    final_grade: TargetRule::Absent,
};

pub const CLASSROOM: SourceMapping = SourceMapping {
    age: NumericRule {
        columns: &[("Age", 1.0)],
        fallback: 17.0,
        bounds: None,
        convert: identity,
    },
    gender: CategoryRule::Code {
        column: "Gender",
        codes: &[(1, "male"), (0, "female")],
        fallback: "other",
    },
    study_time_hours: NumericRule {
        columns: &[("StudyTimeWeekly", 1.0)],
        fallback: 10.0,
        bounds: Some((0.0, 70.0)),
        convert: weekly_to_daily,
    },
    absences: NumericRule {
        columns: &[("Absences", 1.0)],
        fallback: 5.0,
        bounds: None,
        convert: identity,
    },
    parental_education: CategoryRule::Code {
        column: "ParentalEducation",
        codes: &[
            (0, "none"),
            (1, "high_school"),
            (2, "college"),
            (3, "bachelor"),
            (4, "graduate"),
        ],
        fallback: "medium",
    },
    previous_grade: NumericRule {
        columns: &[("GPA", 1.0)],
        fallback: 2.5,
        bounds: Some((0.0, 4.0)),
        convert: gpa_to_percent,
    },
    extracurricular: CategoryRule::Code {
        column: "Extracurricular",
        codes: &[(1, "yes"), (0, "no")],
        fallback: "no",
    },
    sleep_hours: NumericRule::fixed(7.0),
    final_grade: TargetRule::Code {
        column: "GradeClass",
        codes: &[(1, 95.0), (2, 85.0), (3, 75.0), (4, 65.0)],
    },
};

pub const SURVEY: SourceMapping = SourceMapping {
    age: NumericRule::fixed(18.0),
    gender: CategoryRule::Text {
        column: "Gender",
        fallback: "other",
    },
    study_time_hours: NumericRule {
        columns: &[("StudyHoursPerWeek", 1.0), ("Study Hours", 7.0)],
        fallback: 15.0,
        bounds: Some((0.0, 70.0)),
        convert: weekly_to_daily,
    },
    absences: NumericRule {
        columns: &[("AttendanceRate", 1.0), ("Attendance (%)", 1.0)],
        fallback: 85.0,
        bounds: Some((0.0, 100.0)),
        convert: attendance_to_absences,
    },
    parental_education: CategoryRule::Text {
        column: "ParentalSupport",
        fallback: "medium",
    },
    previous_grade: NumericRule {
        columns: &[("PreviousGrade", 1.0)],
        fallback: 75.0,
        bounds: None,
        convert: identity,
    },
    extracurricular: CategoryRule::Flag {
        column: "ExtracurricularActivities",
        threshold: 0.0,
        fallback: 0.0,
    },
    sleep_hours: NumericRule::fixed(7.0),
    final_grade: TargetRule::Numeric {
        column: "FinalGrade",
    },
};

impl SourceMapping {
    pub fn for_source(source: DatasetSource) -> &'static SourceMapping {
        match source {
            DatasetSource::Lifestyle => &LIFESTYLE,
            DatasetSource::Classroom => &CLASSROOM,
            DatasetSource::Survey => &SURVEY,
        }
    }

    /// Every raw column this mapping reads.
    pub fn columns(&self) -> Vec<&'static str> {
        let numeric = [
            &self.age,
            &self.study_time_hours,
            &self.absences,
            &self.previous_grade,
            &self.sleep_hours,
        ];
        let mut columns: Vec<&'static str> = numeric
            .iter()
            .flat_map(|rule| rule.columns.iter().map(|(column, _)| *column))
            .collect();
        columns.extend(
            [&self.gender, &self.parental_education, &self.extracurricular]
                .iter()
                .filter_map(|rule| rule.column()),
        );
        columns.extend(self.final_grade.column());
        columns.sort_unstable();
        columns.dedup();
        columns
    }

    /// Mapped columns absent from `table`; those fields take their declared defaults.
    pub fn missing_columns(&self, table: &RawTable) -> Vec<&'static str> {
        self.columns()
            .into_iter()
            .filter(|column| !table.has_column(column))
            .collect()
    }

    pub fn record(&self, table: &RawTable, row: usize) -> CanonicalStudentRecord {
        let gender = normalize_category(&self.gender.extract(table, row));
        CanonicalStudentRecord {
            age: clip(self.age.extract(table, row), AGE_RANGE).round() as u32,
            gender: if GENDERS.contains(&gender.as_str()) {
                gender
            } else {
                "other".to_string()
            },
            study_time_hours: clip(self.study_time_hours.extract(table, row), STUDY_TIME_RANGE),
            absences: clip(self.absences.extract(table, row), ABSENCES_RANGE).round() as u32,
            parental_education: self.parental_education.extract(table, row),
            extracurricular: self.extracurricular.extract(table, row),
            sleep_hours: clip(self.sleep_hours.extract(table, row), SLEEP_RANGE),
            previous_grade: clip(self.previous_grade.extract(table, row), GRADE_RANGE),
            final_grade: self.final_grade.extract(table, row),
        }
        .normalized()
    }
}

pub fn harmonize(source: DatasetSource, table: &RawTable) -> Vec<CanonicalStudentRecord> {
    let mapping = SourceMapping::for_source(source);
    if !table.is_empty() {
        let missing = mapping.missing_columns(table);
        if !missing.is_empty() {
            warn!(
                source = source.tag(),
                columns = ?missing,
                "mapped columns absent, declared defaults apply"
            );
        }
    }
    (0..table.len()).map(|row| mapping.record(table, row)).collect()
}

/// Concatenates the harmonized rows of every source.
pub fn harmonize_all<'a, I>(tables: I) -> Vec<CanonicalStudentRecord>
where
    I: IntoIterator<Item = (DatasetSource, &'a RawTable)>,
{
    tables
        .into_iter()
        .flat_map(|(source, table)| harmonize(source, table))
        .collect()
}

pub fn labelled(records: Vec<CanonicalStudentRecord>) -> Vec<CanonicalStudentRecord> {
    records
        .into_iter()
        .filter(|record| record.final_grade.is_some())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table(csv: &str) -> RawTable {
        RawTable::from_reader(csv.as_bytes()).unwrap()
    }

    fn in_ranges(record: &CanonicalStudentRecord) -> bool {
        (12..=25).contains(&record.age)
            && (0.0..=12.0).contains(&record.study_time_hours)
            && record.absences <= 30
            && (4.0..=12.0).contains(&record.sleep_hours)
            && (0.0..=100.0).contains(&record.previous_grade)
            && record
                .final_grade
                .map_or(true, |grade| (0.0..=100.0).contains(&grade))
            && GENDERS.contains(&record.gender.as_str())
            && ["yes", "no"].contains(&record.extracurricular.as_str())
    }

    #[test]
    fn classroom_grade_class_maps_to_target() {
        let raw = table(
            "Age,Gender,StudyTimeWeekly,Absences,ParentalEducation,GPA,Extracurricular,GradeClass\n\
             16,1,14,3,2,3.0,1,2.0\n\
             17,0,7,4,9,2.0,0,0\n",
        );
        let records = harmonize(DatasetSource::Classroom, &raw);
        assert_eq!(
            records[0],
            CanonicalStudentRecord {
                age: 16,
                gender: "male".into(),
                study_time_hours: 2.0,
                absences: 3,
                parental_education: "college".into(),
                extracurricular: "yes".into(),
                sleep_hours: 7.0,
                previous_grade: 75.0,
                final_grade: Some(85.0),
            }
        );
        assert_eq!(records[1].parental_education, "medium");
        assert_eq!(records[1].gender, "female");
        assert_eq!(records[1].final_grade, None);
    }

    #[test]
    fn survey_attendance_rate_drives_absences() {
        let raw = table("Gender,AttendanceRate,FinalGrade\nFemale,100,88\nMale,0,\n");
        let records = harmonize(DatasetSource::Survey, &raw);
        assert_eq!(records[0].absences, 0);
        assert_eq!(records[1].absences, 30);
        assert_eq!(records[0].final_grade, Some(88.0));
        assert_eq!(records[1].final_grade, None);
    }

    #[test]
    fn survey_falls_back_through_alternate_columns() {
        let raw = table("Attendance (%),Study Hours,Gender\n90,3,  MALE \n,,unknown\n");
        let records = harmonize(DatasetSource::Survey, &raw);
        assert_eq!(records[0].absences, 3);
        assert!((records[0].study_time_hours - 3.0).abs() < 1e-9);
        assert_eq!(records[0].gender, "male");
        // 85% attendance is 4.5 absences; ties round to even
        assert_eq!(records[1].absences, 4);
        assert!((records[1].study_time_hours - 15.0 / 7.0).abs() < 1e-9);
        assert_eq!(records[1].gender, "other");
        assert_eq!(records[1].previous_grade, 75.0);
    }

    #[test]
    fn lifestyle_rows_have_no_target() {
        let raw = table(
            "Study_Hours_Per_Day,Extracurricular_Hours_Per_Day,Sleep_Hours_Per_Day,GPA\n\
             6.5,0.6,2.0,3.6\n",
        );
        let records = harmonize(DatasetSource::Lifestyle, &raw);
        let record = &records[0];
        assert_eq!(record.age, 17);
        assert_eq!(record.gender, "other");
        assert_eq!(record.extracurricular, "yes");
        assert_eq!(record.sleep_hours, 4.0);
        assert!((record.previous_grade - 90.0).abs() < 1e-9);
        assert_eq!(record.final_grade, None);
        assert!(labelled(records).is_empty());
    }

    #[test]
    fn clipping_is_total_for_malformed_input() {
        let cases = [
            (
                DatasetSource::Lifestyle,
                "Study_Hours_Per_Day,Extracurricular_Hours_Per_Day,Sleep_Hours_Per_Day,GPA\n\
                 99,x,-3,12\n-5,,40,-1\nnan,inf,abc,\n",
            ),
            (
                DatasetSource::Classroom,
                "Age,Gender,StudyTimeWeekly,Absences,ParentalEducation,GPA,Extracurricular,GradeClass\n\
                 99,7,900,-4,1.5,9,2,1\n3,x,-1,400,,,,\n",
            ),
            (
                DatasetSource::Survey,
                "Gender,AttendanceRate,StudyHoursPerWeek,PreviousGrade,ExtracurricularActivities,FinalGrade\n\
                 robot,250,-10,180,3,140\n,-40,500,-20,-1,-5\n",
            ),
            (DatasetSource::Survey, "Unrelated\n1\n2\n"),
        ];
        for (source, csv) in cases {
            for record in harmonize(source, &table(csv)) {
                assert!(in_ranges(&record), "{source:?} produced {record:?}");
            }
        }
    }

    #[test]
    fn harmonize_all_concatenates_and_filters_targets() {
        let classroom = table("GradeClass\n1\n0\n");
        let survey = table("FinalGrade\n70\n");
        let all = harmonize_all([
            (DatasetSource::Classroom, &classroom),
            (DatasetSource::Survey, &survey),
        ]);
        assert_eq!(all.len(), 3);
        let labelled = labelled(all);
        assert_eq!(labelled.len(), 2);
        assert_eq!(labelled[0].final_grade, Some(95.0));
        assert_eq!(labelled[1].final_grade, Some(70.0));
    }

    #[test]
    fn missing_columns_are_reported() {
        let raw = table("Gender,FinalGrade\nmale,80\n");
        let missing = SURVEY.missing_columns(&raw);
        assert!(missing.contains(&"AttendanceRate"));
        assert!(!missing.contains(&"Gender"));
        assert!(LIFESTYLE.columns().contains(&"GPA"));
    }
}
