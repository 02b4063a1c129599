use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::DatasetError;

pub const AUGMENTED_SUFFIX: &str = "_with_predictions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DatasetSource {
    /// Daily lifestyle log; no final grade.
    Lifestyle,
    /// Classroom record with coded demographics and grade class.
    Classroom,
    /// Survey extract with attendance rate and final grade.
    Survey,
}

impl DatasetSource {
    pub const ALL: [DatasetSource; 3] = [
        DatasetSource::Lifestyle,
        DatasetSource::Classroom,
        DatasetSource::Survey,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            DatasetSource::Lifestyle => "lifestyle",
            DatasetSource::Classroom => "classroom",
            DatasetSource::Survey => "survey",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            DatasetSource::Lifestyle => "student_lifestyle_dataset.csv",
            DatasetSource::Classroom => "Student_performance_data.csv",
            DatasetSource::Survey => "student_performance_updated_1000.csv",
        }
    }

    /// Optional sources load as an empty table when the file is absent.
    pub fn is_optional(self) -> bool {
        matches!(self, DatasetSource::Lifestyle)
    }

    /// Resolves a selector (`lifestyle`, `classroom`, `survey`, or `all`).
    pub fn parse_selector(selector: &str) -> Option<Vec<DatasetSource>> {
        let selector = selector.trim().to_lowercase();
        if selector == "all" {
            return Some(Self::ALL.to_vec());
        }
        Self::ALL
            .into_iter()
            .find(|source| source.tag() == selector)
            .map(|source| vec![source])
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Reads a headed CSV. Cells that are not valid UTF-8 are decoded lossily
    /// instead of failing the table.
    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);
        let headers = reader
            .byte_headers()?
            .iter()
            .map(|h| String::from_utf8_lossy(h).trim().to_string())
            .collect();
        let mut rows = Vec::new();
        for record in reader.byte_records() {
            let record = record?;
            rows.push(
                record
                    .iter()
                    .map(|cell| String::from_utf8_lossy(cell).into_owned())
                    .collect(),
            );
        }
        Ok(Self { headers, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.rows.len(), self.headers.len()]
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Trimmed, non-empty cell text.
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.column_index(column)?;
        let cell = self.rows.get(row)?.get(index)?.trim();
        (!cell.is_empty()).then_some(cell)
    }

    /// Finite numeric cell value; anything else reads as missing.
    pub fn number(&self, row: usize, column: &str) -> Option<f64> {
        self.value(row, column)
            .and_then(|cell| cell.parse::<f64>().ok())
            .filter(|value| value.is_finite())
    }

    /// All cells of a column, `None` for empty cells. `None` when the column is absent.
    pub fn column(&self, column: &str) -> Option<Vec<Option<&str>>> {
        let index = self.column_index(column)?;
        Some(
            self.rows
                .iter()
                .map(|row| {
                    row.get(index)
                        .map(|cell| cell.trim())
                        .filter(|cell| !cell.is_empty())
                })
                .collect(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct DatasetCatalog {
    data_dir: PathBuf,
}

impl DatasetCatalog {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn path(&self, source: DatasetSource) -> PathBuf {
        self.data_dir.join(source.file_name())
    }

    pub fn augmented_path(&self, source: DatasetSource) -> PathBuf {
        let original = Path::new(source.file_name());
        let stem = original
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(source.tag());
        self.data_dir.join(format!("{stem}{AUGMENTED_SUFFIX}.csv"))
    }

    pub fn load(&self, source: DatasetSource) -> Result<RawTable, DatasetError> {
        let path = self.path(source);
        if source.is_optional() && !path.exists() {
            debug!(source = source.tag(), path = %path.display(), "optional dataset absent");
            return Ok(RawTable::default());
        }

        let file = std::fs::File::open(&path).map_err(|err| DatasetError::Read {
            path: path.display().to_string(),
            source: err.into(),
        })?;
        let table = RawTable::from_reader(file).map_err(|source| DatasetError::Read {
            path: path.display().to_string(),
            source,
        })?;
        info!(
            source = source.tag(),
            rows = table.len(),
            columns = table.headers.len(),
            "loaded dataset"
        );
        Ok(table)
    }
}

pub fn write_table(path: &Path, table: &RawTable) -> Result<(), DatasetError> {
    let to_error = |source: csv::Error| DatasetError::Write {
        path: path.display().to_string(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(to_error)?;
    writer.write_record(&table.headers).map_err(to_error)?;
    for row in &table.rows {
        writer.write_record(row).map_err(to_error)?;
    }
    writer.flush()?;
    Ok(())
}
