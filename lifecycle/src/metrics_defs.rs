//! Metrics definitions for lifecycle operations.

use shared::metrics_defs::{MetricDef, MetricKind};

pub const ATTACHMENTS: MetricDef = MetricDef {
    name: "attach.completed",
    kind: MetricKind::Counter,
    description: "Number of attachment transactions that completed",
};

pub const ATTACHMENT_FAILURES: MetricDef = MetricDef {
    name: "attach.failed",
    kind: MetricKind::Counter,
    description: "Number of attachment transactions that failed after resolution",
};

pub const DOWNLOADS_RECLAIMED: MetricDef = MetricDef {
    name: "attach.downloads_reclaimed",
    kind: MetricKind::Counter,
    description: "Download-map entries removed by attachment compensation",
};

pub const RESCALE_REJECTIONS: MetricDef = MetricDef {
    name: "rescale.rejected",
    kind: MetricKind::Counter,
    description: "Scale or storage changes rejected by constraint validation",
};

pub const ALL_METRICS: &[MetricDef] = &[
    ATTACHMENTS,
    ATTACHMENT_FAILURES,
    DOWNLOADS_RECLAIMED,
    RESCALE_REJECTIONS,
];
