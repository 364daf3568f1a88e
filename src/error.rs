use thiserror::Error;

/// Failures that stop an operation and are returned to the caller.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Definition error: {0}")]
    Definition(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type ReportResult<T> = Result<T, ReportError>;

/// Conditions that are logged while a report renders but never abort it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReportIssue {
    #[error("query failed in section {section}: {message} (statement: {statement}, subject: {subject_id})")]
    QueryFailed {
        section: String,
        statement: String,
        subject_id: String,
        message: String,
    },

    #[error("section {section}: got {rows} rows when expecting 1 row on 'row' query: {statement}")]
    ShapeViolation {
        section: String,
        statement: String,
        rows: usize,
    },

    #[error("section {section}: invalid shape mode [{mode}] at [{section_index},{query_index}], should be row/table")]
    UnknownShapeMode {
        section: String,
        mode: String,
        section_index: usize,
        query_index: usize,
    },

    #[error("rendering section {section} failed: {message}")]
    RenderFailed { section: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_error() {
        let error = ReportError::Definition("duplicate section header".to_string());
        assert_eq!(
            error.to_string(),
            "Definition error: duplicate section header"
        );
    }

    #[test]
    fn test_config_error() {
        let error = ReportError::Config("DATABASE_URL must be set".to_string());
        assert_eq!(
            error.to_string(),
            "Configuration error: DATABASE_URL must be set"
        );
    }

    #[test]
    fn test_io_error_from() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.toml");
        let error: ReportError = io.into();
        assert!(matches!(error, ReportError::Io(_)));
        assert_eq!(error.to_string(), "I/O error: missing.toml");
    }

    #[test]
    fn test_shape_violation_message() {
        let issue = ReportIssue::ShapeViolation {
            section: "header".to_string(),
            statement: "select 1".to_string(),
            rows: 2,
        };
        assert_eq!(
            issue.to_string(),
            "section header: got 2 rows when expecting 1 row on 'row' query: select 1"
        );
    }

    #[test]
    fn test_unknown_mode_message() {
        let issue = ReportIssue::UnknownShapeMode {
            section: "sec_1".to_string(),
            mode: "grid".to_string(),
            section_index: 0,
            query_index: 3,
        };
        assert_eq!(
            issue.to_string(),
            "section sec_1: invalid shape mode [grid] at [0,3], should be row/table"
        );
    }

    #[test]
    fn test_report_result_err() {
        fn returns_err() -> ReportResult<i32> {
            Err(ReportError::Definition("test".to_string()))
        }
        assert!(returns_err().is_err());
    }
}
