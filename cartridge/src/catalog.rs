use crate::manifest::Manifest;
use crate::metrics_defs::{CATALOG_CACHE_HIT, CATALOG_CACHE_MISS};
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use shared::counter;
use std::sync::Arc;
use std::time::Duration;

const CACHE_SIZE: u64 = 1024;
const CACHE_TTL_SECS: u64 = 300;

/// Scale bounds a cartridge asks for when it is provisioned into a new
/// group. `max == -1` means unbounded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScaleRange {
    pub min: i64,
    pub max: i64,
}

impl Default for ScaleRange {
    fn default() -> Self {
        ScaleRange { min: 1, max: -1 }
    }
}

/// A concrete cartridge definition, resolved from the catalog or built
/// from a downloaded manifest.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct CartridgeDefinition {
    /// Unique identity. For downloaded cartridges this is the versioned
    /// name from the manifest.
    pub name: String,
    pub short_name: String,
    pub version: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Sparse cartridges cannot be scaled independently of their group.
    #[serde(default)]
    pub sparse: bool,
    #[serde(default)]
    pub scale: ScaleRange,
}

impl CartridgeDefinition {
    pub fn from_manifest(manifest: &Manifest) -> Self {
        CartridgeDefinition {
            name: manifest.versioned_name(),
            short_name: manifest.name.clone(),
            version: manifest.version.clone(),
            display_name: manifest.display_name.clone(),
            categories: manifest.categories.clone(),
            sparse: manifest.sparse(),
            scale: ScaleRange::default(),
        }
    }
}

/// The catalog of known cartridges. How definitions are stored and fetched
/// is the implementer's concern; the lifecycle only ever looks up by
/// identity.
pub trait CartridgeCatalog: Send + Sync {
    fn find(&self, name: &str) -> Option<Arc<CartridgeDefinition>>;
}

/// In-memory catalog, typically built from configuration. Lookup matches
/// the full (versioned) name first, then falls back to the short name.
pub struct StaticCatalog {
    entries: Vec<Arc<CartridgeDefinition>>,
}

impl StaticCatalog {
    pub fn new<I>(definitions: I) -> Self
    where
        I: IntoIterator<Item = CartridgeDefinition>,
    {
        StaticCatalog {
            entries: definitions.into_iter().map(Arc::new).collect(),
        }
    }
}

impl CartridgeCatalog for StaticCatalog {
    fn find(&self, name: &str) -> Option<Arc<CartridgeDefinition>> {
        self.entries
            .iter()
            .find(|d| d.name == name)
            .or_else(|| self.entries.iter().find(|d| d.short_name == name))
            .cloned()
    }
}

/// Caching wrapper so repeated lookups skip the backing catalog. Misses
/// are cached too, preventing repeated work for identities the catalog
/// does not know.
pub struct CachedCatalog {
    inner: Arc<dyn CartridgeCatalog>,
    cache: Cache<String, Option<Arc<CartridgeDefinition>>>,
}

impl CachedCatalog {
    pub fn new(inner: Arc<dyn CartridgeCatalog>) -> Self {
        let cache = Cache::builder()
            .max_capacity(CACHE_SIZE)
            .time_to_live(Duration::from_secs(CACHE_TTL_SECS))
            .build();

        CachedCatalog { inner, cache }
    }
}

impl CartridgeCatalog for CachedCatalog {
    fn find(&self, name: &str) -> Option<Arc<CartridgeDefinition>> {
        if let Some(cached) = self.cache.get(name) {
            counter!(CATALOG_CACHE_HIT).increment(1);
            return cached;
        }
        counter!(CATALOG_CACHE_MISS).increment(1);

        let found = self.inner.find(name);
        self.cache.insert(name.to_string(), found.clone());
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn definition(name: &str, version: &str) -> CartridgeDefinition {
        CartridgeDefinition {
            name: format!("{name}-{version}"),
            short_name: name.to_string(),
            version: version.to_string(),
            display_name: None,
            categories: Vec::new(),
            sparse: false,
            scale: ScaleRange::default(),
        }
    }

    #[test]
    fn test_static_catalog_lookup() {
        let catalog = StaticCatalog::new([definition("postgres", "9.2"), definition("redis", "2.6")]);

        assert_eq!(catalog.find("postgres-9.2").unwrap().short_name, "postgres");
        assert_eq!(catalog.find("redis").unwrap().name, "redis-2.6");
        assert!(catalog.find("mongodb").is_none());
    }

    struct CountingCatalog {
        inner: StaticCatalog,
        lookups: AtomicUsize,
    }

    impl CartridgeCatalog for CountingCatalog {
        fn find(&self, name: &str) -> Option<Arc<CartridgeDefinition>> {
            self.lookups.fetch_add(1, Ordering::Relaxed);
            self.inner.find(name)
        }
    }

    #[test]
    fn test_cached_catalog_serves_repeats_from_cache() {
        let counting = Arc::new(CountingCatalog {
            inner: StaticCatalog::new([definition("postgres", "9.2")]),
            lookups: AtomicUsize::new(0),
        });
        let cached = CachedCatalog::new(counting.clone());

        assert!(cached.find("postgres-9.2").is_some());
        assert!(cached.find("postgres-9.2").is_some());
        assert_eq!(counting.lookups.load(Ordering::Relaxed), 1);

        // Misses are cached as well.
        assert!(cached.find("unknown").is_none());
        assert!(cached.find("unknown").is_none());
        assert_eq!(counting.lookups.load(Ordering::Relaxed), 2);
    }
}
