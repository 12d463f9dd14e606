//! Common types for metric definitions.
//!
//! Each crate declares its metrics as `MetricDef` consts plus an
//! `ALL_METRICS` list, and emits them through the `counter!`/`gauge!`/
//! `histogram!` macros so every metric a crate can produce is discoverable
//! in one place.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "Counter",
            MetricKind::Gauge => "Gauge",
            MetricKind::Histogram => "Histogram",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub kind: MetricKind,
    pub description: &'static str,
}

/// Register the descriptions of `defs` with the installed recorder.
/// Harmless when no recorder is installed.
pub fn describe_all(defs: &[MetricDef]) {
    for def in defs {
        match def.kind {
            MetricKind::Counter => metrics::describe_counter!(def.name, def.description),
            MetricKind::Gauge => metrics::describe_gauge!(def.name, def.description),
            MetricKind::Histogram => metrics::describe_histogram!(def.name, def.description),
        }
    }
}

#[macro_export]
macro_rules! counter {
    ($def:expr) => {
        metrics::counter!($def.name)
    };
}

#[macro_export]
macro_rules! gauge {
    ($def:expr) => {
        metrics::gauge!($def.name)
    };
}

#[macro_export]
macro_rules! histogram {
    ($def:expr) => {
        metrics::histogram!($def.name)
    };
}
