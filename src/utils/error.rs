use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Columnar snapshot error: {message}")]
    SnapshotError { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Input file not found: {path}")]
    MissingInputFile { path: String },

    #[error("Required column '{column}' not found. Columns: {available:?}")]
    MissingColumn {
        column: String,
        available: Vec<String>,
    },

    #[error("Row count mismatch: left table has {left} rows, right table has {right} rows")]
    RowCountMismatch { left: usize, right: usize },

    #[error("Row {row} does not correspond: '{column}' is '{left}' on the left and '{right}' on the right")]
    RowKeyMismatch {
        row: usize,
        column: String,
        left: String,
        right: String,
    },

    #[error("No bundle could be fetched from {endpoint}")]
    EmptyFetch { endpoint: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Stage '{stage}' failed: {details}")]
    TransformationError { stage: String, details: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Configuration,
    Input,
    Data,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::ApiError(_) | EtlError::EmptyFetch { .. } => ErrorCategory::Network,
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. } => ErrorCategory::Configuration,
            EtlError::MissingInputFile { .. } | EtlError::MissingColumn { .. } => {
                ErrorCategory::Input
            }
            EtlError::CsvError(_)
            | EtlError::SerializationError(_)
            | EtlError::RowCountMismatch { .. }
            | EtlError::RowKeyMismatch { .. }
            | EtlError::ProcessingError { .. }
            | EtlError::TransformationError { .. } => ErrorCategory::Data,
            EtlError::ZipError(_) | EtlError::IoError(_) | EtlError::SnapshotError { .. } => {
                ErrorCategory::System
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Configuration | ErrorCategory::Input | ErrorCategory::Data => {
                ErrorSeverity::High
            }
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            EtlError::ApiError(_) | EtlError::EmptyFetch { .. } => {
                "Check network access, the endpoint URL and that the bearer token is still valid"
                    .to_string()
            }
            EtlError::MissingConfigError { field } => {
                format!("Set '{}' in the TOML file or pass it on the command line", field)
            }
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. } => {
                "Fix the configuration file and run again".to_string()
            }
            EtlError::MissingInputFile { path } => {
                format!("Run the stage that produces '{}' first", path)
            }
            EtlError::MissingColumn { column, .. } => format!(
                "Make sure the upstream stage keeps the '{}' column",
                column
            ),
            EtlError::RowCountMismatch { .. } | EtlError::RowKeyMismatch { .. } => {
                "Regenerate both inputs from the same claims file so their rows line up".to_string()
            }
            EtlError::CsvError(_) | EtlError::SerializationError(_) => {
                "Inspect the input file for truncated or hand-edited content".to_string()
            }
            EtlError::ProcessingError { .. } | EtlError::TransformationError { .. } => {
                "Re-run with --verbose to see which record failed".to_string()
            }
            EtlError::ZipError(_) | EtlError::IoError(_) | EtlError::SnapshotError { .. } => {
                "Check disk space and write permissions of the output directory".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            EtlError::ApiError(_) | EtlError::EmptyFetch { .. } => {
                format!("Could not download data from the FHIR API: {}", self)
            }
            EtlError::MissingInputFile { path } => format!("Input file is missing: {}", path),
            EtlError::MissingColumn { column, .. } => {
                format!("Input table has no '{}' column", column)
            }
            _ => self.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
