//! The attachment transaction.
//!
//! Provisioning a cartridge set is one logical operation whose sub-steps
//! are not atomic: resolution may record download-map entries on the
//! application before the corresponding component instances exist. When a
//! later step fails, the recorded entries that never got an instance are
//! reclaimed, and the original failure is re-surfaced. Cleanup never
//! converts a failure into a success.

use crate::directory::{Directory, DirectoryLedger};
use crate::errors::LifecycleError;
use crate::metrics_defs::{ATTACHMENTS, ATTACHMENT_FAILURES, DOWNLOADS_RECLAIMED};
use crate::model::{overrides_for, ProvisionResult};
use crate::view::CartridgeView;
use cartridge::resolver::{CartridgeResolver, ResolvedCartridge};
use cartridge::spec::{CartridgeSpec, EnvVar};
use shared::counter;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug)]
pub struct AttachOutcome {
    /// One view per resolved cartridge, in request order.
    pub cartridges: Vec<CartridgeView>,
    pub result: ProvisionResult,
}

/// Provision `specs` onto the named application.
///
/// The caller is assumed to hold the per-application lock for the duration
/// of this call; the compensation path is the deliberate exception and
/// only uses the directory's addressed unset.
pub async fn attach_cartridges(
    directory: &Arc<dyn Directory>,
    resolver: &dyn CartridgeResolver,
    app_name: &str,
    specs: &[CartridgeSpec],
    env_vars: Option<&[EnvVar]>,
) -> Result<AttachOutcome, LifecycleError> {
    let app = directory
        .find(app_name)
        .ok_or_else(|| LifecycleError::not_found("application", app_name))?;
    if app.quarantined {
        return Err(LifecycleError::UpgradeInProgress);
    }

    // Resolution writes download records straight onto the stored
    // application; a failure here propagates without compensation, since
    // no instances were promised yet.
    let ledger = DirectoryLedger::new(directory.clone(), app_name);
    let resolved = resolver.resolve(specs, &ledger).await?;

    // Reload so the working copy carries the records just written.
    let mut app = directory
        .find(app_name)
        .ok_or_else(|| LifecycleError::not_found("application", app_name))?;

    let overrides = overrides_for(&resolved, &app);
    let provisioned = match app.validate_cartridge_instances(&resolved) {
        Ok(()) => app.add_features(&resolved, &overrides, env_vars),
        Err(err) => Err(err),
    };

    let result = match provisioned {
        Ok(result) => {
            directory.save(&app);
            result
        }
        Err(err) => {
            let removed = reclaim_orphaned_downloads(directory.as_ref(), app_name, &resolved);
            if removed > 0 {
                warn!(
                    application = app_name,
                    removed, "reclaimed orphaned download records after failed attachment"
                );
            }
            counter!(ATTACHMENT_FAILURES).increment(1);
            return Err(err);
        }
    };
    counter!(ATTACHMENTS).increment(1);

    let mut views = Vec::with_capacity(resolved.len());
    for cart in &resolved {
        let component = app
            .find_component(&cart.definition.name)
            .ok_or_else(|| LifecycleError::not_found("cartridge", cart.definition.name.clone()))?;
        let group = app
            .group_of(component)
            .ok_or_else(|| LifecycleError::not_found("group", component.group_name.clone()))?;
        views.push(CartridgeView::assemble(component, group));
    }

    Ok(AttachOutcome {
        cartridges: views,
        result,
    })
}

/// Remove download-map entries recorded for this request that never got a
/// component instance.
///
/// This runs from the failure path, outside any application lock, possibly
/// racing unrelated updates: the removal is addressed by application
/// identity and remove-if-present, so a second run (or a concurrent
/// unrelated write) leaves the same final state.
pub fn reclaim_orphaned_downloads(
    directory: &dyn Directory,
    app_name: &str,
    resolved: &[ResolvedCartridge],
) -> usize {
    let Some(app) = directory.find(app_name) else {
        return 0;
    };

    let mut orphaned = Vec::new();
    for (key, entry) in &app.downloaded_cart_map {
        let requested = resolved
            .iter()
            .any(|cart| cart.definition.name == entry.versioned_name);
        if !requested {
            continue;
        }
        let provisioned = app
            .components
            .iter()
            .any(|c| c.cartridge_name == entry.versioned_name);
        if !provisioned {
            orphaned.push(key.clone());
        }
    }

    if orphaned.is_empty() {
        return 0;
    }
    let removed = directory.unset_downloaded_carts(app_name, &orphaned);
    counter!(DOWNLOADS_RECLAIMED).increment(removed as u64);
    removed
}
