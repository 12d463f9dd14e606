use crate::catalog::{CartridgeCatalog, CartridgeDefinition};
use crate::manifest::{Manifest, ManifestError};
use crate::metrics_defs::{MANIFEST_DOWNLOADS, MANIFEST_DOWNLOAD_FAILURES};
use crate::spec::CartridgeSpec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::counter;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Invalid cartridge '{0}'")]
    UnknownCartridge(String),

    #[error("could not fetch cartridge manifest from {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("cartridge specification has neither name nor url")]
    Unsourced,
}

/// Metadata recorded for a cartridge fetched from an external url. Written
/// to the application's download map before the corresponding component
/// instance exists; the attachment compensation path reclaims the entry
/// when the instance never materializes.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct DownloadedCart {
    pub versioned_name: String,
    pub url: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Sink for download records. Implemented over the application store so
/// entries land on the stored application as a side effect of resolution.
pub trait DownloadLedger: Send + Sync {
    fn record(&self, key: &str, cart: DownloadedCart);
}

/// A resolved cartridge ready for provisioning.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedCartridge {
    pub definition: Arc<CartridgeDefinition>,
    /// Gear size the spec asked for, if any.
    pub gear_size: Option<String>,
    /// Download-map key, set for url-based cartridges.
    pub download_key: Option<String>,
}

/// Resolves specifications to concrete cartridge definitions. Url-based
/// specs are recorded in the ledger before later specs are processed, so a
/// failure partway leaves earlier records behind; callers own cleaning
/// those up.
#[async_trait]
pub trait CartridgeResolver: Send + Sync {
    async fn resolve(
        &self,
        specs: &[CartridgeSpec],
        ledger: &dyn DownloadLedger,
    ) -> Result<Vec<ResolvedCartridge>, ResolveError>;
}

/// Fetches manifest documents either over HTTP or from an in-process
/// fixture map (tests, dry runs).
#[derive(Clone)]
pub enum ManifestClient {
    Remote(reqwest::Client),
    Fixture(HashMap<String, String>),
}

impl ManifestClient {
    pub fn remote() -> Self {
        ManifestClient::Remote(reqwest::Client::new())
    }

    pub fn fixture<I, K, V>(manifests: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        ManifestClient::Fixture(
            manifests
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    async fn fetch(&self, url: &str) -> Result<String, ResolveError> {
        match self {
            ManifestClient::Remote(client) => {
                let response = client.get(url).send().await.map_err(|err| {
                    ResolveError::Fetch {
                        url: url.to_string(),
                        reason: err.to_string(),
                    }
                })?;
                if !response.status().is_success() {
                    return Err(ResolveError::Fetch {
                        url: url.to_string(),
                        reason: format!("status {}", response.status()),
                    });
                }
                response.text().await.map_err(|err| ResolveError::Fetch {
                    url: url.to_string(),
                    reason: err.to_string(),
                })
            }
            ManifestClient::Fixture(manifests) => {
                manifests
                    .get(url)
                    .cloned()
                    .ok_or_else(|| ResolveError::Fetch {
                        url: url.to_string(),
                        reason: "no fixture for url".to_string(),
                    })
            }
        }
    }
}

/// The default resolver: catalog lookup for named specs, manifest download
/// for url specs.
pub struct DownloadingResolver {
    catalog: Arc<dyn CartridgeCatalog>,
    client: ManifestClient,
}

impl DownloadingResolver {
    pub fn new(catalog: Arc<dyn CartridgeCatalog>, client: ManifestClient) -> Self {
        DownloadingResolver { catalog, client }
    }

    async fn download(
        &self,
        url: &str,
        ledger: &dyn DownloadLedger,
    ) -> Result<CartridgeDefinition, ResolveError> {
        counter!(MANIFEST_DOWNLOADS).increment(1);
        let text = match self.client.fetch(url).await {
            Ok(text) => text,
            Err(err) => {
                counter!(MANIFEST_DOWNLOAD_FAILURES).increment(1);
                return Err(err);
            }
        };
        let manifest = Manifest::from_yaml(&text)?;
        let definition = CartridgeDefinition::from_manifest(&manifest);

        // The record lands on the application before resolution finishes,
        // which is what makes partial failure visible to the caller.
        ledger.record(
            &definition.name,
            DownloadedCart {
                versioned_name: definition.name.clone(),
                url: url.to_string(),
                display_name: definition.display_name.clone(),
            },
        );
        debug!(url, cartridge = %definition.name, "downloaded cartridge manifest");
        Ok(definition)
    }
}

#[async_trait]
impl CartridgeResolver for DownloadingResolver {
    async fn resolve(
        &self,
        specs: &[CartridgeSpec],
        ledger: &dyn DownloadLedger,
    ) -> Result<Vec<ResolvedCartridge>, ResolveError> {
        let mut resolved = Vec::with_capacity(specs.len());
        for spec in specs {
            if let Some(url) = &spec.url {
                let definition = self.download(url, ledger).await?;
                resolved.push(ResolvedCartridge {
                    download_key: Some(definition.name.clone()),
                    definition: Arc::new(definition),
                    gear_size: spec.gear_size.clone(),
                });
            } else if let Some(name) = &spec.name {
                let definition = self
                    .catalog
                    .find(name)
                    .ok_or_else(|| ResolveError::UnknownCartridge(name.clone()))?;
                resolved.push(ResolvedCartridge {
                    definition,
                    gear_size: spec.gear_size.clone(),
                    download_key: None,
                });
            } else {
                return Err(ResolveError::Unsourced);
            }
        }
        Ok(resolved)
    }
}
