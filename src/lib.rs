pub mod config;
pub mod db;
pub mod definition;
pub mod error;
pub mod pipeline;
pub mod render;
pub mod telemetry;
pub mod value;

pub use config::Config;
pub use definition::{Destination, QuerySpec, ReportDefinition, Section, ShapeMode};
pub use error::{ReportError, ReportIssue, ReportResult};
pub use pipeline::{RenderOptions, RenderedReport, ReportContext, ReportGenerator};
pub use value::{Row, Value};
