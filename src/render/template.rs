use std::path::Path;

use minijinja::{Environment, UndefinedBehavior, path_loader};

use crate::error::ReportError;
use crate::pipeline::ReportContext;

use super::SectionRenderer;

/// Renders sections as `{% block %}`s of a minijinja template.
///
/// The resource id names the template; the section name names the block.
/// Undefined keys render as empty so sections tolerate missing data.
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl TemplateRenderer {
    /// Loads templates lazily from `dir`.
    pub fn from_dir(dir: &Path) -> Self {
        let mut env = Self::environment();
        env.set_loader(path_loader(dir.to_path_buf()));

        tracing::info!(template_dir = %dir.display(), "Template renderer initialized");

        Self { env }
    }

    /// Registers a single in-memory template under `name`.
    pub fn from_source(name: &str, source: &str) -> Result<Self, ReportError> {
        let mut env = Self::environment();
        env.add_template_owned(name.to_string(), source.to_string())?;
        Ok(Self { env })
    }

    fn environment() -> Environment<'static> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Lenient);
        env
    }

    pub fn render_section(
        &self,
        resource_id: &str,
        section: &str,
        context: &ReportContext,
    ) -> Result<String, ReportError> {
        let template = self.env.get_template(resource_id)?;
        let mut state = template.eval_to_state(context)?;
        Ok(state.render_block(section)?)
    }
}

#[async_trait::async_trait]
impl SectionRenderer for TemplateRenderer {
    #[tracing::instrument(
        name = "render.section",
        skip(self, context),
        fields(render.keys = context.len(), render.bytes)
    )]
    async fn render(
        &self,
        resource_id: &str,
        section: &str,
        context: &ReportContext,
    ) -> Result<String, ReportError> {
        let text = self.render_section(resource_id, section, context)?;
        tracing::Span::current().record("render.bytes", text.len());
        Ok(text)
    }
}
