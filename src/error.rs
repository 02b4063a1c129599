use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("not enough labelled rows to train: {0}")]
    InsufficientData(String),

    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("model fit failed: {0}")]
    Fit(String),
}

/// Transport-neutral classification of a [`ServiceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    ServiceUnavailable,
    Client,
    Server,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("model not ready: no trained model is loaded")]
    ModelNotReady,

    #[error("invalid value for {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("invalid source '{0}': use 'lifestyle', 'classroom', 'survey', or 'all'")]
    UnknownSource(String),

    #[error("prediction error: {0}")]
    Prediction(String),

    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),
}

impl ServiceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ServiceError::ModelNotReady => ErrorClass::ServiceUnavailable,
            ServiceError::Validation { .. } | ServiceError::UnknownSource(_) => ErrorClass::Client,
            ServiceError::Prediction(_) | ServiceError::Dataset(_) => ErrorClass::Server,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
