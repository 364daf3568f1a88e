use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ReportError;

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub database_url: String,
    pub database_max_connections: u32,
    pub template_dir: PathBuf,
    pub definition_path: Option<PathBuf>,
    pub rerun_all_per_section: bool,
    pub dump_context: bool,
    pub otel_service_name: String,
    pub otel_exporter_endpoint: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ReportError> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup (the process environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ReportError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            environment: var("ENVIRONMENT", "development"),
            database_url: lookup("DATABASE_URL")
                .ok_or_else(|| ReportError::Config("DATABASE_URL must be set".into()))?,
            database_max_connections: parse(
                "DATABASE_MAX_CONNECTIONS",
                &var("DATABASE_MAX_CONNECTIONS", "5"),
            )?,
            template_dir: PathBuf::from(var("TEMPLATE_DIR", "./tmpl")),
            definition_path: lookup("REPORT_DEFINITION_PATH")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            rerun_all_per_section: parse_bool(
                "RERUN_ALL_PER_SECTION",
                &var("RERUN_ALL_PER_SECTION", "true"),
            )?,
            dump_context: parse_bool("REPORT_DUMP_CONTEXT", &var("REPORT_DUMP_CONTEXT", "false"))?,
            otel_service_name: var("OTEL_SERVICE_NAME", "section-report"),
            otel_exporter_endpoint: var("OTEL_EXPORTER_OTLP_ENDPOINT", "http://localhost:4317"),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T, ReportError> {
    raw.trim()
        .parse()
        .map_err(|_| ReportError::Config(format!("{key} must be a number, got {raw:?}")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ReportError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ReportError::Config(format!(
            "{key} must be a boolean, got {raw:?}"
        ))),
    }
}
