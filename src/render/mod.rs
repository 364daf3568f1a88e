pub mod template;

pub use template::TemplateRenderer;

use crate::error::ReportError;
use crate::pipeline::ReportContext;

/// Produces the text for one named section of a template resource.
#[async_trait::async_trait]
pub trait SectionRenderer: Send + Sync {
    async fn render(
        &self,
        resource_id: &str,
        section: &str,
        context: &ReportContext,
    ) -> Result<String, ReportError>;
}
