use std::sync::Arc;
use std::time::Instant;

use chrono::{Local, NaiveDate};
use opentelemetry::KeyValue;
use uuid::Uuid;

use crate::db::QueryExecutor;
use crate::definition::{ReportDefinition, Section};
use crate::error::ReportIssue;
use crate::render::SectionRenderer;
use crate::telemetry::metrics::{
    REPORT_GENERATION_DURATION, REPORT_QUERIES_EXECUTED, REPORT_QUERY_ERRORS,
    REPORT_SECTIONS_RENDERED, REPORT_SHAPE_VIOLATIONS,
};

use super::context::ReportContext;
use super::shape::{ShapeProblem, shape};

pub const OUTPUT_FILE_NAME_KEY: &str = "__output_file_name__";
pub const TEMPLATE_NAME_KEY: &str = "__template_name__";
pub const STATEMENTS_KEY: &str = "__stmt__";
pub const ROW_COUNTS_KEY: &str = "__nr__";
pub const TODAY_ISO_KEY: &str = "__today_ISO__";
pub const TODAY_US_KEY: &str = "__today_US__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Re-run every query of every section before rendering each section.
    /// When false, each section runs only its own queries.
    pub rerun_all_per_section: bool,
    /// Log the full context as JSON before each section renders.
    pub dump_context: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            rerun_all_per_section: true,
            dump_context: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderedReport {
    pub document: String,
    pub issues: Vec<ReportIssue>,
    pub sections_rendered: usize,
}

impl RenderedReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// One line per issue; empty when the report rendered cleanly.
    pub fn status(&self) -> String {
        self.issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Statement texts and row counts for the queries that fed one section.
/// Started empty for every pass, so `__stmt__` and `__nr__` describe only that pass.
#[derive(Debug, Default)]
struct PassDiagnostics {
    statements: Vec<String>,
    row_counts: Vec<usize>,
}

/// State owned by a single `render_report` call. Never shared between calls.
struct RenderRun<'a> {
    subject_id: &'a str,
    context: ReportContext,
    issues: Vec<ReportIssue>,
}

pub struct ReportGenerator {
    executor: Arc<dyn QueryExecutor>,
    renderer: Arc<dyn SectionRenderer>,
    definition: Arc<ReportDefinition>,
    options: RenderOptions,
}

impl ReportGenerator {
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        renderer: Arc<dyn SectionRenderer>,
        definition: Arc<ReportDefinition>,
        options: RenderOptions,
    ) -> Self {
        if options.rerun_all_per_section && definition.sections.len() > 1 {
            tracing::debug!(
                sections = definition.sections.len(),
                queries = definition.query_count(),
                "Every section pass re-runs all report queries"
            );
        }

        Self {
            executor,
            renderer,
            definition,
            options,
        }
    }

    pub fn definition(&self) -> &ReportDefinition {
        &self.definition
    }

    pub async fn render_report(&self, subject_id: &str) -> RenderedReport {
        self.render_report_on(subject_id, Local::now().date_naive())
            .await
    }

    /// Renders every section for `subject_id`, stamping the context with `today`.
    ///
    /// Query failures, shape problems and render failures are logged and
    /// collected in [`RenderedReport::issues`]; the document is always produced.
    #[tracing::instrument(
        name = "report.render",
        skip(self),
        fields(
            report.run_id = %Uuid::new_v4(),
            report.resource = %self.definition.resource,
            report.sections_rendered,
            report.issues,
            report.duration_ms,
        )
    )]
    pub async fn render_report_on(&self, subject_id: &str, today: NaiveDate) -> RenderedReport {
        let start = Instant::now();

        let mut run = RenderRun {
            subject_id,
            context: ReportContext::new(),
            issues: Vec::new(),
        };
        let mut document = String::new();
        let mut sections_rendered = 0;

        for (pass, section) in self.definition.sections.iter().enumerate() {
            let mut diagnostics = PassDiagnostics::default();

            if self.options.rerun_all_per_section {
                for (source_index, source) in self.definition.sections.iter().enumerate() {
                    self.run_queries(&mut run, &mut diagnostics, section, source_index, source)
                        .await;
                }
            } else {
                self.run_queries(&mut run, &mut diagnostics, section, pass, section)
                    .await;
            }

            self.inject_report_fields(&mut run.context, section, diagnostics, today);

            if self.options.dump_context {
                tracing::debug!(
                    section = %section.name,
                    pass,
                    context = %run.context.to_json(),
                    "Report data for section"
                );
            }

            match self
                .renderer
                .render(&self.definition.resource, &section.name, &run.context)
                .await
            {
                Ok(text) => {
                    document.push_str(&text);
                    sections_rendered += 1;
                    REPORT_SECTIONS_RENDERED.add(
                        1,
                        &[KeyValue::new("report.section", section.name.clone())],
                    );
                }
                Err(e) => {
                    tracing::error!(
                        resource = %self.definition.resource,
                        section = %section.name,
                        error = %e,
                        "Section render failed"
                    );
                    run.issues.push(ReportIssue::RenderFailed {
                        section: section.name.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let duration = start.elapsed();
        REPORT_GENERATION_DURATION.record(duration.as_secs_f64(), &[]);

        let span = tracing::Span::current();
        span.record("report.sections_rendered", sections_rendered);
        span.record("report.issues", run.issues.len());
        span.record("report.duration_ms", duration.as_millis() as u64);

        if !run.issues.is_empty() {
            tracing::warn!(
                subject_id,
                issues = run.issues.len(),
                "Report rendered with issues"
            );
        }

        RenderedReport {
            document,
            issues: run.issues,
            sections_rendered,
        }
    }

    /// Executes and shapes every query of `source` into the run's context.
    async fn run_queries(
        &self,
        run: &mut RenderRun<'_>,
        diagnostics: &mut PassDiagnostics,
        rendering: &Section,
        source_index: usize,
        source: &Section,
    ) {
        for (query_index, spec) in source.queries.iter().enumerate() {
            let statement = spec.query.as_str();
            diagnostics.statements.push(statement.to_string());

            REPORT_QUERIES_EXECUTED.add(1, &[KeyValue::new("report.section", source.name.clone())]);

            let rows = match self.executor.execute(statement, run.subject_id).await {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        statement,
                        subject_id = run.subject_id,
                        section = %source.name,
                        "Report query failed, skipping"
                    );
                    REPORT_QUERY_ERRORS.add(1, &[KeyValue::new("report.section", source.name.clone())]);
                    run.issues.push(ReportIssue::QueryFailed {
                        section: source.name.clone(),
                        statement: statement.to_string(),
                        subject_id: run.subject_id.to_string(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            diagnostics.row_counts.push(rows.len());

            let shaped = shape(&spec.mode, &spec.to, rows);
            match shaped.problem {
                Some(ShapeProblem::TooManyRows { rows, dump }) => {
                    tracing::error!(
                        section = %rendering.name,
                        query_section = %source.name,
                        rows,
                        statement,
                        data = %dump,
                        "Got more than 1 row on 'row' specified query"
                    );
                    REPORT_SHAPE_VIOLATIONS.add(1, &[KeyValue::new("report.section", source.name.clone())]);
                    run.issues.push(ReportIssue::ShapeViolation {
                        section: source.name.clone(),
                        statement: statement.to_string(),
                        rows,
                    });
                }
                Some(ShapeProblem::UnknownMode(mode)) => {
                    tracing::error!(
                        resource = %self.definition.resource,
                        section = %rendering.name,
                        mode = %mode,
                        section_index = source_index,
                        query_index,
                        "Invalid shape mode, should be row/table"
                    );
                    run.issues.push(ReportIssue::UnknownShapeMode {
                        section: source.name.clone(),
                        mode,
                        section_index: source_index,
                        query_index,
                    });
                }
                None => {}
            }

            run.context.apply_all(shaped.updates);
        }
    }

    fn inject_report_fields(
        &self,
        context: &mut ReportContext,
        section: &Section,
        diagnostics: PassDiagnostics,
        today: NaiveDate,
    ) {
        context.insert(OUTPUT_FILE_NAME_KEY, self.definition.resource.as_str());
        context.insert(TEMPLATE_NAME_KEY, section.name.as_str());
        context.insert(STATEMENTS_KEY, diagnostics.statements);
        context.insert(ROW_COUNTS_KEY, diagnostics.row_counts);
        context.insert(TODAY_ISO_KEY, today.format("%Y.%m.%d").to_string());
        context.insert(TODAY_US_KEY, today.format("%d/%b/%Y").to_string());
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::definition::QuerySpec;
    use crate::error::ReportError;
    use crate::render::TemplateRenderer;
    use crate::value::{Row, Value};

    /// Returns canned rows per statement and records every call.
    #[derive(Default)]
    struct FakeExecutor {
        results: HashMap<String, Result<Vec<Row>, String>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl FakeExecutor {
        fn with(mut self, statement: &str, rows: Vec<Row>) -> Self {
            self.results.insert(statement.to_string(), Ok(rows));
            self
        }

        fn failing(mut self, statement: &str, message: &str) -> Self {
            self.results
                .insert(statement.to_string(), Err(message.to_string()));
            self
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl QueryExecutor for FakeExecutor {
        async fn execute(&self, statement: &str, param: &str) -> Result<Vec<Row>, ReportError> {
            self.calls
                .lock()
                .unwrap()
                .push((statement.to_string(), param.to_string()));
            match self.results.get(statement) {
                Some(Ok(rows)) => Ok(rows.clone()),
                Some(Err(message)) => Err(ReportError::Definition(message.clone())),
                None => Ok(Vec::new()),
            }
        }
    }

    /// Emits `<section>` and keeps a copy of the context each section saw.
    #[derive(Default)]
    struct RecordingRenderer {
        seen: Mutex<Vec<(String, ReportContext)>>,
        fail_on: Option<String>,
    }

    impl RecordingRenderer {
        fn context_for(&self, section: &str) -> ReportContext {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .find(|(name, _)| name == section)
                .map(|(_, ctx)| ctx.clone())
                .unwrap()
        }
    }

    #[async_trait::async_trait]
    impl SectionRenderer for RecordingRenderer {
        async fn render(
            &self,
            _resource_id: &str,
            section: &str,
            context: &ReportContext,
        ) -> Result<String, ReportError> {
            self.seen
                .lock()
                .unwrap()
                .push((section.to_string(), context.clone()));
            if self.fail_on.as_deref() == Some(section) {
                return Err(ReportError::Definition(format!("no block {section}")));
            }
            Ok(format!("<{section}>"))
        }
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn phone(n: &str) -> Row {
        row(&[("phone_no", Value::from(n))])
    }

    fn definition(sections: Vec<Section>) -> Arc<ReportDefinition> {
        Arc::new(ReportDefinition {
            resource: "report.html.j2".to_string(),
            sections,
        })
    }

    fn generator(
        executor: Arc<FakeExecutor>,
        renderer: Arc<RecordingRenderer>,
        definition: Arc<ReportDefinition>,
        options: RenderOptions,
    ) -> ReportGenerator {
        ReportGenerator::new(executor, renderer, definition, options)
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    const REG: &str = "select * from t_reg_info where id = $1::int";
    const PHONES: &str = "select * from t_phone_no where reg_info_id = $1::int";

    #[tokio::test]
    async fn test_row_root_fields_visible_to_section() {
        let executor = Arc::new(FakeExecutor::default().with(
            REG,
            vec![row(&[
                ("name", Value::from("Bess")),
                ("tag", Value::from("1234")),
            ])],
        ));
        let renderer = Arc::new(RecordingRenderer::default());
        let report = generator(
            executor.clone(),
            renderer.clone(),
            definition(vec![Section::new("header", vec![QuerySpec::new("row", ".", REG)])]),
            RenderOptions::default(),
        )
        .render_report_on("42", today())
        .await;

        assert!(report.is_clean());
        assert_eq!(report.document, "<header>");
        assert_eq!(report.sections_rendered, 1);

        let ctx = renderer.context_for("header");
        assert_eq!(ctx.get("name"), Some(&Value::from("Bess")));
        assert_eq!(ctx.get("tag"), Some(&Value::from("1234")));
        assert_eq!(executor.calls(), vec![(REG.to_string(), "42".to_string())]);
    }

    #[tokio::test]
    async fn test_table_query_sets_length_and_max_index() {
        let executor = Arc::new(FakeExecutor::default().with(
            PHONES,
            vec![phone("555-0100"), phone("555-0101"), phone("555-0102")],
        ));
        let renderer = Arc::new(RecordingRenderer::default());
        generator(
            executor,
            renderer.clone(),
            definition(vec![Section::new(
                "header",
                vec![QuerySpec::new("table", "phone_no", PHONES)],
            )]),
            RenderOptions::default(),
        )
        .render_report_on("42", today())
        .await;

        let ctx = renderer.context_for("header");
        assert_eq!(ctx.get("phone_no").and_then(Value::as_list).map(|l| l.len()), Some(3));
        assert_eq!(ctx.get("phone_no_length"), Some(&Value::Int(3)));
        assert_eq!(ctx.get("phone_no_max_index"), Some(&Value::Int(2)));
    }

    #[tokio::test]
    async fn test_empty_table_query() {
        let executor = Arc::new(FakeExecutor::default());
        let renderer = Arc::new(RecordingRenderer::default());
        generator(
            executor,
            renderer.clone(),
            definition(vec![Section::new(
                "header",
                vec![QuerySpec::new("table", "phone_no", PHONES)],
            )]),
            RenderOptions::default(),
        )
        .render_report_on("42", today())
        .await;

        let ctx = renderer.context_for("header");
        assert_eq!(ctx.get("phone_no"), Some(&Value::List(vec![])));
        assert_eq!(ctx.get("phone_no_length"), Some(&Value::Int(0)));
        assert_eq!(ctx.get("phone_no_max_index"), Some(&Value::Int(-1)));
    }

    #[tokio::test]
    async fn test_row_query_with_two_rows_is_logged_and_ignored() {
        let executor = Arc::new(
            FakeExecutor::default().with(PHONES, vec![phone("555-0100"), phone("555-0101")]),
        );
        let renderer = Arc::new(RecordingRenderer::default());
        let report = generator(
            executor,
            renderer.clone(),
            definition(vec![Section::new(
                "header",
                vec![QuerySpec::new("row", ".", PHONES)],
            )]),
            RenderOptions::default(),
        )
        .render_report_on("42", today())
        .await;

        assert_eq!(
            report.issues,
            vec![ReportIssue::ShapeViolation {
                section: "header".to_string(),
                statement: PHONES.to_string(),
                rows: 2,
            }]
        );
        assert_eq!(report.document, "<header>");
        assert!(!renderer.context_for("header").contains_key("phone_no"));
    }

    #[tokio::test]
    async fn test_rerun_all_executes_every_query_each_pass() {
        let executor = Arc::new(FakeExecutor::default());
        let renderer = Arc::new(RecordingRenderer::default());
        let report = generator(
            executor.clone(),
            renderer,
            definition(vec![
                Section::new("header", vec![QuerySpec::new("row", ".", REG)]),
                Section::new("sec_1", vec![QuerySpec::new("table", "phone_no", PHONES)]),
                Section::template_only("footer"),
            ]),
            RenderOptions::default(),
        )
        .render_report_on("42", today())
        .await;

        assert_eq!(report.document, "<header><sec_1><footer>");
        // three passes, two queries each
        let calls = executor.calls();
        assert_eq!(calls.len(), 6);
        assert_eq!(calls[0].0, REG);
        assert_eq!(calls[1].0, PHONES);
        assert_eq!(calls[4].0, REG);
    }

    #[tokio::test]
    async fn test_single_pass_runs_each_section_once() {
        let executor = Arc::new(FakeExecutor::default());
        let renderer = Arc::new(RecordingRenderer::default());
        generator(
            executor.clone(),
            renderer.clone(),
            definition(vec![
                Section::new("header", vec![QuerySpec::new("row", ".", REG)]),
                Section::new("sec_1", vec![QuerySpec::new("table", "phone_no", PHONES)]),
                Section::template_only("footer"),
            ]),
            RenderOptions {
                rerun_all_per_section: false,
                dump_context: false,
            },
        )
        .render_report_on("42", today())
        .await;

        let statements: Vec<String> = executor.calls().into_iter().map(|(s, _)| s).collect();
        assert_eq!(statements, vec![REG.to_string(), PHONES.to_string()]);

        // header renders before the sec_1 query has run
        assert!(!renderer.context_for("header").contains_key("phone_no"));
        assert!(renderer.context_for("footer").contains_key("phone_no"));
    }

    #[tokio::test]
    async fn test_context_carries_across_sections() {
        let executor = Arc::new(
            FakeExecutor::default().with(REG, vec![row(&[("ranch_name", Value::from("Double R"))])]),
        );
        let renderer = Arc::new(RecordingRenderer::default());
        generator(
            executor,
            renderer.clone(),
            definition(vec![
                Section::new("header", vec![QuerySpec::new("row", ".", REG)]),
                Section::template_only("footer"),
            ]),
            RenderOptions {
                rerun_all_per_section: false,
                dump_context: true,
            },
        )
        .render_report_on("42", today())
        .await;

        assert_eq!(
            renderer.context_for("footer").get("ranch_name"),
            Some(&Value::from("Double R"))
        );
    }

    #[tokio::test]
    async fn test_last_write_wins_across_sections() {
        let first = "select 'first' as owner where $1 = $1";
        let second = "select 'second' as owner where $1 = $1";
        let executor = Arc::new(
            FakeExecutor::default()
                .with(first, vec![row(&[("owner", Value::from("first"))])])
                .with(second, vec![row(&[("owner", Value::from("second"))])]),
        );
        let sections = vec![
            Section::new("header", vec![QuerySpec::new("row", "who", first)]),
            Section::new("sec_1", vec![QuerySpec::new("row", "who", second)]),
        ];

        let owner = |ctx: &ReportContext| {
            ctx.get("who")
                .and_then(Value::as_map)
                .map(|m| m["owner"].clone())
                .unwrap()
        };

        let renderer = Arc::new(RecordingRenderer::default());
        generator(
            executor.clone(),
            renderer.clone(),
            definition(sections.clone()),
            RenderOptions::default(),
        )
        .render_report_on("42", today())
        .await;
        assert_eq!(owner(&renderer.context_for("header")), Value::from("second"));
        assert_eq!(owner(&renderer.context_for("sec_1")), Value::from("second"));

        let renderer = Arc::new(RecordingRenderer::default());
        generator(
            executor,
            renderer.clone(),
            definition(sections),
            RenderOptions {
                rerun_all_per_section: false,
                dump_context: false,
            },
        )
        .render_report_on("42", today())
        .await;
        assert_eq!(owner(&renderer.context_for("header")), Value::from("first"));
        assert_eq!(owner(&renderer.context_for("sec_1")), Value::from("second"));
    }

    #[tokio::test]
    async fn test_query_failure_is_skipped() {
        let executor = Arc::new(
            FakeExecutor::default()
                .failing(REG, "relation \"t_reg_info\" does not exist")
                .with(PHONES, vec![phone("555-0100")]),
        );
        let renderer = Arc::new(RecordingRenderer::default());
        let report = generator(
            executor,
            renderer.clone(),
            definition(vec![Section::new(
                "header",
                vec![
                    QuerySpec::new("row", ".", REG),
                    QuerySpec::new("table", "phone_no", PHONES),
                ],
            )]),
            RenderOptions::default(),
        )
        .render_report_on("42", today())
        .await;

        assert_eq!(report.issues.len(), 1);
        match &report.issues[0] {
            ReportIssue::QueryFailed {
                section,
                statement,
                subject_id,
                ..
            } => {
                assert_eq!(section, "header");
                assert_eq!(statement, REG);
                assert_eq!(subject_id, "42");
            }
            other => panic!("expected QueryFailed, got {other:?}"),
        }
        assert_eq!(report.document, "<header>");

        let ctx = renderer.context_for("header");
        assert_eq!(ctx.get("phone_no_length"), Some(&Value::Int(1)));
        // the failed statement is listed, but only the successful query has a row count
        assert_eq!(
            ctx.get(STATEMENTS_KEY),
            Some(&Value::from(vec![REG, PHONES]))
        );
        assert_eq!(ctx.get(ROW_COUNTS_KEY), Some(&Value::from(vec![1_usize])));
    }

    #[tokio::test]
    async fn test_unknown_mode_reported_without_update() {
        let executor = Arc::new(FakeExecutor::default().with(PHONES, vec![phone("555-0100")]));
        let renderer = Arc::new(RecordingRenderer::default());
        let report = generator(
            executor,
            renderer.clone(),
            definition(vec![Section::new(
                "header",
                vec![QuerySpec::new("grid", "phone_no", PHONES)],
            )]),
            RenderOptions::default(),
        )
        .render_report_on("42", today())
        .await;

        assert_eq!(
            report.issues,
            vec![ReportIssue::UnknownShapeMode {
                section: "header".to_string(),
                mode: "grid".to_string(),
                section_index: 0,
                query_index: 0,
            }]
        );
        let ctx = renderer.context_for("header");
        assert!(!ctx.contains_key("phone_no"));
        assert_eq!(ctx.get(ROW_COUNTS_KEY), Some(&Value::from(vec![1_usize])));
    }

    #[tokio::test]
    async fn test_render_failure_keeps_other_sections() {
        let executor = Arc::new(FakeExecutor::default());
        let renderer = Arc::new(RecordingRenderer {
            fail_on: Some("sec_1".to_string()),
            ..Default::default()
        });
        let report = generator(
            executor,
            renderer,
            definition(vec![
                Section::template_only("header"),
                Section::template_only("sec_1"),
                Section::template_only("footer"),
            ]),
            RenderOptions::default(),
        )
        .render_report_on("42", today())
        .await;

        assert_eq!(report.document, "<header><footer>");
        assert_eq!(report.sections_rendered, 2);
        assert!(matches!(
            &report.issues[..],
            [ReportIssue::RenderFailed { section, .. }] if section == "sec_1"
        ));
        assert!(report.status().contains("rendering section sec_1 failed"));
    }

    #[tokio::test]
    async fn test_report_fields_injected() {
        let executor = Arc::new(FakeExecutor::default());
        let renderer = Arc::new(RecordingRenderer::default());
        generator(
            executor,
            renderer.clone(),
            definition(vec![
                Section::new("header", vec![QuerySpec::new("table", "phone_no", PHONES)]),
                Section::template_only("footer"),
            ]),
            RenderOptions::default(),
        )
        .render_report_on("42", today())
        .await;

        let ctx = renderer.context_for("footer");
        assert_eq!(ctx.get(OUTPUT_FILE_NAME_KEY), Some(&Value::from("report.html.j2")));
        assert_eq!(ctx.get(TEMPLATE_NAME_KEY), Some(&Value::from("footer")));
        assert_eq!(ctx.get(TODAY_ISO_KEY), Some(&Value::from("2024.03.09")));
        assert_eq!(ctx.get(TODAY_US_KEY), Some(&Value::from("09/Mar/2024")));
        // rebuilt per pass rather than accumulated over the run
        assert_eq!(ctx.get(STATEMENTS_KEY), Some(&Value::from(vec![PHONES])));
        assert_eq!(ctx.get(ROW_COUNTS_KEY), Some(&Value::from(vec![0_usize])));

        assert_eq!(
            renderer.context_for("header").get(TEMPLATE_NAME_KEY),
            Some(&Value::from("header"))
        );
    }

    #[tokio::test]
    async fn test_repeated_section_renders_each_occurrence() {
        let executor = Arc::new(
            FakeExecutor::default().with(REG, vec![row(&[("real_name", Value::from("Bess"))])]),
        );
        let template = "{% block divider %}--{{ real_name }}--{% endblock %}\
                        {% block body %}[{{ real_name }}]{% endblock %}";
        let renderer = Arc::new(TemplateRenderer::from_source("report.html.j2", template).unwrap());
        let report = ReportGenerator::new(
            executor.clone(),
            renderer,
            definition(vec![
                Section::template_only("divider"),
                Section::new("body", vec![QuerySpec::new("row", ".", REG)]),
                Section::template_only("divider"),
            ]),
            RenderOptions::default(),
        )
        .render_report_on("42", today())
        .await;

        assert!(report.is_clean());
        assert_eq!(report.sections_rendered, 3);
        assert_eq!(report.document, "--Bess--[Bess]--Bess--");
        assert_eq!(executor.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_rendering_is_idempotent() {
        let executor = Arc::new(
            FakeExecutor::default()
                .with(REG, vec![row(&[("real_name", Value::from("Bess Miller"))])])
                .with(PHONES, vec![phone("555-0100"), phone("555-0101")]),
        );
        let template = "{% block header %}{{ real_name }}:{% for p in phone_no %}{{ p.phone_no }};{% endfor %}{% endblock %}\
                        {% block footer %}|{{ __today_ISO__ }}|{{ __nr__ }}{% endblock %}";
        let renderer = Arc::new(TemplateRenderer::from_source("report.html.j2", template).unwrap());
        let generator = ReportGenerator::new(
            executor,
            renderer,
            definition(vec![
                Section::new(
                    "header",
                    vec![
                        QuerySpec::new("row", ".", REG),
                        QuerySpec::new("table", "phone_no", PHONES),
                    ],
                ),
                Section::template_only("footer"),
            ]),
            RenderOptions::default(),
        );

        let first = generator.render_report_on("42", today()).await;
        let second = generator.render_report_on("42", today()).await;

        assert!(first.is_clean());
        assert_eq!(first.document, "Bess Miller:555-0100;555-0101;|2024.03.09|[1, 2]");
        assert_eq!(first.document, second.document);
    }
}
