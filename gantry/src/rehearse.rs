//! Dry-run an attachment request against an application snapshot, without
//! touching any real infrastructure. Useful for checking what a request
//! would do to an application before submitting it.

use crate::config::Config;
use cartridge::catalog::{CartridgeCatalog, StaticCatalog};
use cartridge::resolver::{DownloadingResolver, ManifestClient};
use cartridge::spec::AttachRequest;
use lifecycle::directory::InMemoryDirectory;
use lifecycle::model::Application;
use lifecycle::service::{AllowAll, CartridgeService};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

/// A rehearsal scenario: the application snapshot, the request to run
/// against it, and fixture manifests standing in for downloadable
/// cartridges (keyed by url).
#[derive(Deserialize)]
struct Scenario {
    application: Application,
    request: AttachRequest,
    #[serde(default)]
    manifests: HashMap<String, String>,
}

pub fn run(config: &Config, path: &Path) -> ExitCode {
    match rehearse(config, path) {
        Ok(output) => {
            print!("{output}");
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("gantry: {message}");
            ExitCode::FAILURE
        }
    }
}

fn rehearse(config: &Config, path: &Path) -> Result<String, String> {
    let text = std::fs::read_to_string(path).map_err(|err| err.to_string())?;
    let scenario: Scenario = serde_yaml::from_str(&text).map_err(|err| err.to_string())?;

    let app_name = scenario.application.name.clone();
    let catalog: Arc<dyn CartridgeCatalog> = Arc::new(StaticCatalog::new(config.catalog.clone()));
    let resolver = DownloadingResolver::new(
        catalog.clone(),
        ManifestClient::fixture(scenario.manifests),
    );
    let service = CartridgeService::new(
        Arc::new(InMemoryDirectory::with_app(scenario.application)),
        Arc::new(resolver),
        catalog,
        Arc::new(AllowAll),
        config.gear_size_policy(),
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| err.to_string())?;
    let reply = runtime
        .block_on(service.attach(&app_name, scenario.request))
        .map_err(|err| err.to_string())?;

    let rendered = serde_yaml::to_string(&reply.payload).map_err(|err| err.to_string())?;
    Ok(format!("{}\n{rendered}", reply.message))
}
