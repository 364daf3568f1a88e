pub mod context;
pub mod orchestrator;
pub mod shape;

pub use context::{ContextUpdate, ReportContext};
pub use orchestrator::{RenderOptions, RenderedReport, ReportGenerator};
