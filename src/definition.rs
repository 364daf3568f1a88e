use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ReportError, ReportResult};

/// How a query's result set is placed into the report context.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ShapeMode {
    /// Zero or one row, merged as a mapping.
    Row,
    /// Any number of rows, stored as a list with `_length` and `_max_index` companions.
    Table,
    /// Unrecognized mode; reported when the query runs.
    Other(String),
}

impl From<String> for ShapeMode {
    fn from(s: String) -> Self {
        match s.as_str() {
            "row" => ShapeMode::Row,
            "table" => ShapeMode::Table,
            _ => ShapeMode::Other(s),
        }
    }
}

impl From<&str> for ShapeMode {
    fn from(s: &str) -> Self {
        ShapeMode::from(s.to_string())
    }
}

impl fmt::Display for ShapeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeMode::Row => f.write_str("row"),
            ShapeMode::Table => f.write_str("table"),
            ShapeMode::Other(s) => f.write_str(s),
        }
    }
}

/// Where a shaped result lands. `"."` is the root namespace.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum Destination {
    Root,
    Key(String),
}

impl From<String> for Destination {
    fn from(s: String) -> Self {
        if s == "." {
            Destination::Root
        } else {
            Destination::Key(s)
        }
    }
}

impl From<&str> for Destination {
    fn from(s: &str) -> Self {
        Destination::from(s.to_string())
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Root => f.write_str("."),
            Destination::Key(k) => f.write_str(k),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuerySpec {
    pub mode: ShapeMode,
    pub to: Destination,
    /// Statement with a single `$1` placeholder bound to the subject id.
    pub query: String,
}

impl QuerySpec {
    pub fn new(mode: impl Into<ShapeMode>, to: impl Into<Destination>, query: &str) -> Self {
        Self {
            mode: mode.into(),
            to: to.into(),
            query: query.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Section {
    pub name: String,
    #[serde(default)]
    pub queries: Vec<QuerySpec>,
}

impl Section {
    pub fn new(name: &str, queries: Vec<QuerySpec>) -> Self {
        Self {
            name: name.to_string(),
            queries,
        }
    }

    /// A section with no queries: the template block renders with whatever is already in context.
    pub fn template_only(name: &str) -> Self {
        Self::new(name, Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReportDefinition {
    /// Template resource the sections are rendered from.
    pub resource: String,
    pub sections: Vec<Section>,
}

impl ReportDefinition {
    pub fn from_toml_str(source: &str) -> ReportResult<Self> {
        let definition: ReportDefinition =
            toml::from_str(source).map_err(|e| ReportError::Definition(e.to_string()))?;
        definition.validate()?;
        Ok(definition)
    }

    #[tracing::instrument(name = "definition.load", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> ReportResult<Self> {
        let source = std::fs::read_to_string(path)?;
        let definition = Self::from_toml_str(&source)?;

        tracing::info!(
            resource = %definition.resource,
            sections = definition.sections.len(),
            queries = definition.query_count(),
            "Report definition loaded"
        );

        Ok(definition)
    }

    pub fn validate(&self) -> ReportResult<()> {
        if self.resource.trim().is_empty() {
            return Err(ReportError::Definition(
                "resource must not be empty".into(),
            ));
        }

        for (si, section) in self.sections.iter().enumerate() {
            if section.name.trim().is_empty() {
                return Err(ReportError::Definition(format!(
                    "section {si} has an empty name"
                )));
            }
            for (qi, spec) in section.queries.iter().enumerate() {
                if spec.query.trim().is_empty() {
                    return Err(ReportError::Definition(format!(
                        "section {} query {qi} has an empty statement",
                        section.name
                    )));
                }
                if let ShapeMode::Other(mode) = &spec.mode {
                    tracing::warn!(
                        section = %section.name,
                        query_index = qi,
                        mode = %mode,
                        "Unknown shape mode, query will be skipped at render time"
                    );
                }
            }
        }

        Ok(())
    }

    pub fn query_count(&self) -> usize {
        self.sections.iter().map(|s| s.queries.len()).sum()
    }

    /// The registration report: one data-gathering header followed by template-only sections.
    pub fn registration() -> Self {
        Self {
            resource: "report.html.j2".to_string(),
            sections: vec![
                Section::new(
                    "header",
                    vec![
                        QuerySpec::new("row", ".", "select * from t_reg_info where id = $1::int"),
                        QuerySpec::new(
                            "row",
                            ".",
                            r#"select "email" as "primary_email" from "t_email" where "reg_info_id" = $1::int and "address_type" = 'Primary' limit 1"#,
                        ),
                        registration_table("employee_resp", "t_employee_resp", "seq"),
                        registration_table("phone_no", "t_phone_no", "created"),
                        registration_table("physical_loc", "t_physical_loc", "created"),
                        registration_table("address", "t_address", "created"),
                        registration_table("program", "t_program", "created"),
                        registration_table("email", "t_email", "created"),
                        registration_table("ranch_locations", "t_ranch_locations", "created"),
                        QuerySpec::new(
                            "table",
                            "known_record_types",
                            r#"select * from "t_known_record_type" where $1 = $1 order by "created""#,
                        ),
                        registration_table("record_type", "t_record_type", "created"),
                        registration_table("calving_info", "t_calving_info", "created"),
                    ],
                ),
                Section::template_only("sec_1"),
                Section::template_only("sec_2"),
                Section::template_only("sec_3"),
                Section::template_only("footer"),
            ],
        }
    }
}

fn registration_table(to: &str, table: &str, order_by: &str) -> QuerySpec {
    QuerySpec::new(
        "table",
        to,
        &format!(
            r#"select * from "{table}" where "reg_info_id" = $1::int order by "{order_by}""#
        ),
    )
}
