use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
};
use std::sync::LazyLock;

pub static METER: LazyLock<Meter> = LazyLock::new(|| global::meter("section-report"));

pub static REPORT_GENERATION_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("report.generation.duration")
        .with_description("Total report generation duration in seconds")
        .with_unit("s")
        .build()
});

pub static REPORT_QUERIES_EXECUTED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("report.queries.executed")
        .with_description("Number of report queries issued to the database")
        .with_unit("{query}")
        .build()
});

pub static REPORT_QUERY_ERRORS: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("report.query.errors")
        .with_description("Number of report queries that failed and were skipped")
        .with_unit("{error}")
        .build()
});

pub static REPORT_SHAPE_VIOLATIONS: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("report.shape.violations")
        .with_description("Number of row queries that returned more than one row")
        .with_unit("{violation}")
        .build()
});

pub static REPORT_SECTIONS_RENDERED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("report.sections.rendered")
        .with_description("Number of template sections rendered")
        .with_unit("{section}")
        .build()
});
