use crate::model::Application;
use cartridge::resolver::{DownloadLedger, DownloadedCart};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Persistence seam for applications. The main body of a lifecycle request
/// runs under the caller-held per-application lock, so `find`/`save`
/// round-trips are safe there. `unset_downloaded_carts` is different: it
/// serves the attachment compensation path, which runs outside that lock,
/// so it must be an addressed removal on the stored document rather than a
/// save of a possibly-stale copy.
pub trait Directory: Send + Sync {
    fn find(&self, name: &str) -> Option<Application>;

    fn save(&self, app: &Application);

    /// Remove the given download-map keys from the stored application if
    /// still present, and report how many were actually removed. Absent
    /// keys are skipped, which makes the operation idempotent and safe to
    /// race against unrelated updates of the same application.
    fn unset_downloaded_carts(&self, name: &str, keys: &[String]) -> usize;

    /// Record a download entry on the stored application.
    fn record_download(&self, name: &str, key: &str, cart: DownloadedCart);
}

/// Directory backed by process memory; the tests' and dry-run tooling's
/// stand-in for the real store.
#[derive(Default)]
pub struct InMemoryDirectory {
    apps: RwLock<HashMap<String, Application>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        InMemoryDirectory::default()
    }

    pub fn with_app(app: Application) -> Self {
        let directory = InMemoryDirectory::new();
        directory.save(&app);
        directory
    }
}

impl Directory for InMemoryDirectory {
    fn find(&self, name: &str) -> Option<Application> {
        self.apps.read().get(name).cloned()
    }

    fn save(&self, app: &Application) {
        self.apps.write().insert(app.name.clone(), app.clone());
    }

    fn unset_downloaded_carts(&self, name: &str, keys: &[String]) -> usize {
        let mut apps = self.apps.write();
        let Some(app) = apps.get_mut(name) else {
            return 0;
        };
        let mut removed = 0;
        for key in keys {
            if app.downloaded_cart_map.shift_remove(key).is_some() {
                removed += 1;
            }
        }
        removed
    }

    fn record_download(&self, name: &str, key: &str, cart: DownloadedCart) {
        let mut apps = self.apps.write();
        if let Some(app) = apps.get_mut(name) {
            app.downloaded_cart_map.insert(key.to_string(), cart);
        }
    }
}

/// Ledger adapter the resolver writes through: download records land
/// directly on the stored application.
pub struct DirectoryLedger {
    directory: Arc<dyn Directory>,
    app_name: String,
}

impl DirectoryLedger {
    pub fn new(directory: Arc<dyn Directory>, app_name: impl Into<String>) -> Self {
        DirectoryLedger {
            directory,
            app_name: app_name.into(),
        }
    }
}

impl DownloadLedger for DirectoryLedger {
    fn record(&self, key: &str, cart: DownloadedCart) {
        self.directory.record_download(&self.app_name, key, cart);
    }
}
