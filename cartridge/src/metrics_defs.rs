//! Metrics definitions for cartridge resolution.

use shared::metrics_defs::{MetricDef, MetricKind};

pub const CATALOG_CACHE_HIT: MetricDef = MetricDef {
    name: "catalog.cache.hit",
    kind: MetricKind::Counter,
    description: "Number of catalog lookups served from the cache",
};

pub const CATALOG_CACHE_MISS: MetricDef = MetricDef {
    name: "catalog.cache.miss",
    kind: MetricKind::Counter,
    description: "Number of catalog lookups that went to the backing catalog",
};

pub const MANIFEST_DOWNLOADS: MetricDef = MetricDef {
    name: "manifest.downloads",
    kind: MetricKind::Counter,
    description: "Number of cartridge manifests fetched from external urls",
};

pub const MANIFEST_DOWNLOAD_FAILURES: MetricDef = MetricDef {
    name: "manifest.download_failures",
    kind: MetricKind::Counter,
    description: "Number of cartridge manifest fetches that failed",
};

pub const ALL_METRICS: &[MetricDef] = &[
    CATALOG_CACHE_HIT,
    CATALOG_CACHE_MISS,
    MANIFEST_DOWNLOADS,
    MANIFEST_DOWNLOAD_FAILURES,
];
