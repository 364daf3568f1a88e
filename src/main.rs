use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use section_report::db::{self, PgQueryExecutor};
use section_report::render::TemplateRenderer;
use section_report::telemetry::init_telemetry;
use section_report::{Config, RenderOptions, ReportDefinition, ReportGenerator};

/// Render a sectioned report for one subject record and print it to stdout.
#[derive(Debug, Parser)]
#[command(name = "section-report", version)]
struct Cli {
    /// Identifier bound to `$1` in every report query.
    subject_id: String,

    /// Report definition file (TOML). Defaults to the built-in registration report.
    #[arg(long, value_name = "PATH")]
    definition: Option<PathBuf>,

    /// Directory the template resource is loaded from.
    #[arg(long, value_name = "DIR")]
    template_dir: Option<PathBuf>,

    /// Run each section's queries once, just before that section renders.
    #[arg(long)]
    single_pass: bool,

    /// Exit with an error if any query, shape or render issue was recorded.
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let telemetry_guard = init_telemetry(&config)?;

    tracing::info!(
        environment = %config.environment,
        subject_id = %cli.subject_id,
        "Starting section-report"
    );

    let definition = match cli.definition.as_ref().or(config.definition_path.as_ref()) {
        Some(path) => ReportDefinition::load(path)?,
        None => ReportDefinition::registration(),
    };

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    let executor = Arc::new(PgQueryExecutor::new(pool.clone()));

    let template_dir = cli
        .template_dir
        .clone()
        .unwrap_or_else(|| config.template_dir.clone());
    let renderer = Arc::new(TemplateRenderer::from_dir(&template_dir));

    let options = RenderOptions {
        rerun_all_per_section: config.rerun_all_per_section && !cli.single_pass,
        dump_context: config.dump_context,
    };

    let generator = ReportGenerator::new(executor, renderer, Arc::new(definition), options);
    let report = generator.render_report(&cli.subject_id).await;

    pool.close().await;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(report.document.as_bytes())?;
    stdout.flush()?;

    if !report.is_clean() {
        tracing::warn!(status = %report.status(), "Report finished with issues");
    }

    tracing::info!(
        sections_rendered = report.sections_rendered,
        bytes = report.document.len(),
        "Report complete"
    );
    telemetry_guard.shutdown();

    if cli.strict && !report.is_clean() {
        anyhow::bail!(
            "report for {} recorded {} issue(s)",
            cli.subject_id,
            report.issues.len()
        );
    }

    Ok(())
}
