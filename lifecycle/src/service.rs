//! The lifecycle operations callers invoke: list, show, attach, detach,
//! rescale. The HTTP layer in front of this is a thin wrapper; everything
//! interesting happens here and below.

use crate::attach::attach_cartridges;
use crate::directory::Directory;
use crate::errors::LifecycleError;
use crate::metrics_defs::RESCALE_REJECTIONS;
use crate::model::{check_name, Application, ProvisionResult};
use crate::scaling::{validate_limit_change, LimitChange, RawLimitChange};
use crate::view::CartridgeView;
use cartridge::catalog::CartridgeCatalog;
use cartridge::policy::GearSizePolicy;
use cartridge::resolver::CartridgeResolver;
use cartridge::spec::{
    check_determined, check_env_vars, check_specs, requested_gear_sizes, AttachRequest,
};
use shared::counter;
use std::sync::Arc;

/// Actions a caller must be authorized for before an application is
/// mutated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    CreateCartridge,
    DestroyCartridge,
    ScaleCartridge,
    ChangeGearQuota,
}

impl Action {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Action::CreateCartridge => "create cartridge",
            Action::DestroyCartridge => "destroy cartridge",
            Action::ScaleCartridge => "scale cartridge",
            Action::ChangeGearQuota => "change gear quota",
        }
    }
}

/// Authorization seam. Policy evaluation lives outside this crate; the
/// lifecycle only asks yes-or-no questions.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, action: Action, app: &Application) -> Result<(), LifecycleError>;
}

/// Grants everything. The default for tooling and tests.
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _action: Action, _app: &Application) -> Result<(), LifecycleError> {
        Ok(())
    }
}

/// Reply from a lifecycle operation: the payload plus the human-readable
/// message and provisioning result the presentation layer forwards. The
/// wire status code is the presentation layer's call.
#[derive(Clone, Debug, PartialEq)]
pub struct Reply<T> {
    pub payload: T,
    pub message: String,
    pub result: ProvisionResult,
}

impl<T> Reply<T> {
    fn new(payload: T, message: String) -> Self {
        Reply {
            payload,
            message,
            result: ProvisionResult::default(),
        }
    }

    fn with_result(payload: T, message: String, result: ProvisionResult) -> Self {
        Reply {
            payload,
            message,
            result,
        }
    }
}

pub struct CartridgeService {
    directory: Arc<dyn Directory>,
    resolver: Arc<dyn CartridgeResolver>,
    catalog: Arc<dyn CartridgeCatalog>,
    authorizer: Arc<dyn Authorizer>,
    gear_sizes: GearSizePolicy,
}

impl CartridgeService {
    pub fn new(
        directory: Arc<dyn Directory>,
        resolver: Arc<dyn CartridgeResolver>,
        catalog: Arc<dyn CartridgeCatalog>,
        authorizer: Arc<dyn Authorizer>,
        gear_sizes: GearSizePolicy,
    ) -> Self {
        CartridgeService {
            directory,
            resolver,
            catalog,
            authorizer,
            gear_sizes,
        }
    }

    fn load(&self, app_name: &str) -> Result<Application, LifecycleError> {
        self.directory
            .find(app_name)
            .ok_or_else(|| LifecycleError::not_found("application", app_name))
    }

    pub fn list(&self, app_name: &str) -> Result<Reply<Vec<CartridgeView>>, LifecycleError> {
        let app = self.load(app_name)?;
        let mut views = Vec::with_capacity(app.components.len());
        for component in &app.components {
            let group = app
                .group_of(component)
                .ok_or_else(|| LifecycleError::not_found("group", component.group_name.clone()))?;
            views.push(CartridgeView::assemble(component, group));
        }
        Ok(Reply::new(
            views,
            format!(
                "Listing cartridges for application {} under namespace {}",
                app.name, app.namespace
            ),
        ))
    }

    pub fn show(&self, app_name: &str, id: &str) -> Result<Reply<CartridgeView>, LifecycleError> {
        let app = self.load(app_name)?;
        // Shorthand identities go through the catalog; downloaded
        // cartridges the catalog does not know fall back to the raw id.
        let cartname = self
            .catalog
            .find(id)
            .map(|d| d.name.clone())
            .unwrap_or_else(|| id.to_string());
        let cartname = check_name(&cartname)?;

        let component = app
            .find_component(cartname)
            .ok_or_else(|| LifecycleError::not_found("cartridge", id))?;
        let group = app
            .group_of(component)
            .ok_or_else(|| LifecycleError::not_found("group", component.group_name.clone()))?;

        Ok(Reply::new(
            CartridgeView::assemble(component, group),
            format!(
                "Showing cartridge {id} for application {} under namespace {}",
                app.name, app.namespace
            ),
        ))
    }

    pub async fn attach(
        &self,
        app_name: &str,
        request: AttachRequest,
    ) -> Result<Reply<Vec<CartridgeView>>, LifecycleError> {
        self.attach_inner(app_name, request)
            .await
            .map_err(LifecycleError::generalize_cartridge_field)
    }

    async fn attach_inner(
        &self,
        app_name: &str,
        request: AttachRequest,
    ) -> Result<Reply<Vec<CartridgeView>>, LifecycleError> {
        let app = self.load(app_name)?;
        if app.quarantined {
            return Err(LifecycleError::UpgradeInProgress);
        }
        self.authorizer.authorize(Action::CreateCartridge, &app)?;

        let env_vars = request.environment_variables.clone();
        if let Some(vars) = &env_vars {
            check_env_vars(vars)?;
        }

        let specs = request.normalize();
        check_specs(&specs)?;
        check_determined(&specs)?;
        self.gear_sizes.check(requested_gear_sizes(&specs))?;

        let outcome = attach_cartridges(
            &self.directory,
            self.resolver.as_ref(),
            app_name,
            &specs,
            env_vars.as_deref(),
        )
        .await?;

        let names: Vec<&str> = outcome
            .cartridges
            .iter()
            .map(|view| view.name.as_str())
            .collect();
        let message = format!("Added {} to application {app_name}", names.join(", "));
        Ok(Reply::with_result(outcome.cartridges, message, outcome.result))
    }

    pub fn detach(&self, app_name: &str, id: &str) -> Result<Reply<()>, LifecycleError> {
        let mut app = self.load(app_name)?;
        if app.quarantined {
            return Err(LifecycleError::UpgradeInProgress);
        }
        self.authorizer.authorize(Action::DestroyCartridge, &app)?;

        let id = check_name(id)?;
        let component = app
            .find_component(id)
            .ok_or_else(|| LifecycleError::not_found("cartridge", id))?;
        let feature = component.cartridge_name.clone();

        let result = app.remove_features(&[feature])?;
        self.directory.save(&app);

        Ok(Reply::with_result(
            (),
            format!("Removed {id} from application {}", app.name),
            result,
        ))
    }

    pub fn rescale(
        &self,
        app_name: &str,
        id: &str,
        raw: &RawLimitChange,
    ) -> Result<Reply<CartridgeView>, LifecycleError> {
        self.rescale_inner(app_name, id, raw).inspect_err(|_| {
            counter!(RESCALE_REJECTIONS).increment(1);
        })
    }

    fn rescale_inner(
        &self,
        app_name: &str,
        id: &str,
        raw: &RawLimitChange,
    ) -> Result<Reply<CartridgeView>, LifecycleError> {
        let id = check_name(id)?;
        let mut app = self.load(app_name)?;

        let (scales_from, scales_to) = raw.scale_factors();
        if scales_from.is_none() && scales_to.is_none() && raw.additional_storage.is_none() {
            return Err(LifecycleError::validation(
                "No update parameters specified. Valid update parameters are: scales_from, \
                 scales_to, additional_storage",
                None,
            ));
        }

        if scales_from.is_some() || scales_to.is_some() {
            self.authorizer.authorize(Action::ScaleCartridge, &app)?;
        }
        if raw.additional_storage.is_some() {
            self.authorizer.authorize(Action::ChangeGearQuota, &app)?;
        }

        let change = LimitChange {
            scales_from,
            scales_to,
            additional_storage: raw.storage()?,
        };
        validate_limit_change(&app, id, &change)?;

        let result = app.update_component_limits(
            id,
            change.scales_from,
            change.scales_to,
            change.additional_storage,
        )?;
        self.directory.save(&app);

        let component = app
            .find_component(id)
            .ok_or_else(|| LifecycleError::not_found("cartridge", id))?;
        let group = app
            .group_of(component)
            .ok_or_else(|| LifecycleError::not_found("group", component.group_name.clone()))?;

        Ok(Reply::with_result(
            CartridgeView::assemble(component, group),
            format!(
                "Showing cartridge {id} for application {} under namespace {}",
                app.name, app.namespace
            ),
            result,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use cartridge::catalog::{CartridgeDefinition, ScaleRange, StaticCatalog};
    use cartridge::resolver::{DownloadingResolver, ManifestClient};

    fn definition(name: &str, version: &str, sparse: bool) -> CartridgeDefinition {
        CartridgeDefinition {
            name: format!("{name}-{version}"),
            short_name: name.to_string(),
            version: version.to_string(),
            display_name: None,
            categories: Vec::new(),
            sparse,
            scale: ScaleRange::default(),
        }
    }

    struct DenyScaling;

    impl Authorizer for DenyScaling {
        fn authorize(&self, action: Action, _app: &Application) -> Result<(), LifecycleError> {
            match action {
                Action::ScaleCartridge => Err(LifecycleError::Forbidden(action.as_str())),
                _ => Ok(()),
            }
        }
    }

    fn service_with(app: Application, authorizer: Arc<dyn Authorizer>) -> CartridgeService {
        let catalog: Arc<dyn CartridgeCatalog> = Arc::new(StaticCatalog::new([
            definition("postgres", "9.2", false),
            definition("ruby", "1.9", false),
            definition("sidecar", "1.0", true),
        ]));
        let resolver = DownloadingResolver::new(
            catalog.clone(),
            ManifestClient::fixture([(
                "https://carts.example.com/kickstand.yml",
                "name: kickstand\nversion: '0.3'",
            )]),
        );
        CartridgeService::new(
            Arc::new(InMemoryDirectory::with_app(app)),
            Arc::new(resolver),
            catalog,
            authorizer,
            GearSizePolicy::new(["small", "medium"]),
        )
    }

    fn scalable_app() -> Application {
        let mut app = Application::new("scribble", "rhymes");
        app.scalable = true;
        app
    }

    fn attach_request(json: serde_json::Value) -> AttachRequest {
        serde_json::from_value(json).unwrap()
    }

    #[tokio::test]
    async fn test_attach_then_list_show_detach_roundtrip() {
        let service = service_with(scalable_app(), Arc::new(AllowAll));

        let reply = service
            .attach(
                "scribble",
                attach_request(serde_json::json!({"cartridges": ["postgres", "ruby"]})),
            )
            .await
            .unwrap();
        assert_eq!(reply.payload.len(), 2);
        assert_eq!(reply.payload[0].name, "postgres-9.2");
        assert_eq!(
            reply.message,
            "Added postgres-9.2, ruby-1.9 to application scribble"
        );
        assert_eq!(reply.result.gear_delta, 2);

        let listed = service.list("scribble").unwrap();
        assert_eq!(listed.payload.len(), 2);

        // Show resolves the short name through the catalog.
        let shown = service.show("scribble", "postgres").unwrap();
        assert_eq!(shown.payload.name, "postgres-9.2");

        let removed = service.detach("scribble", "postgres-9.2").unwrap();
        assert_eq!(
            removed.result.removed_components,
            vec!["postgres-9.2".to_string()]
        );
        assert_eq!(service.list("scribble").unwrap().payload.len(), 1);
    }

    #[tokio::test]
    async fn test_attach_rejects_disallowed_gear_size_before_side_effects() {
        let service = service_with(scalable_app(), Arc::new(AllowAll));

        let err = service
            .attach(
                "scribble",
                attach_request(serde_json::json!({
                    "cartridge": {"name": "postgres", "gear_size": "colossal"}
                })),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LifecycleError::Validation { ref field, .. } if field.as_deref() == Some("gear_size")
        ));
        assert!(service.list("scribble").unwrap().payload.is_empty());
    }

    #[tokio::test]
    async fn test_attach_generalizes_the_cartridge_field() {
        let service = service_with(scalable_app(), Arc::new(AllowAll));

        let err = service
            .attach(
                "scribble",
                attach_request(serde_json::json!({"cartridges": ["postgres", "postgres"]})),
            )
            .await
            .unwrap_err();

        // The rejection is field-less: `cartridge` could mean either spec.
        assert!(matches!(
            err,
            LifecycleError::Validation { ref field, .. } if field.is_none()
        ));
    }

    #[tokio::test]
    async fn test_attach_rejects_spec_without_source() {
        let service = service_with(scalable_app(), Arc::new(AllowAll));

        let err = service
            .attach(
                "scribble",
                attach_request(serde_json::json!({"gear_size": "small"})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_rescale_applies_and_reports_the_new_view() {
        let service = service_with(scalable_app(), Arc::new(AllowAll));
        service
            .attach(
                "scribble",
                attach_request(serde_json::json!({"cartridge": "ruby"})),
            )
            .await
            .unwrap();

        let raw = RawLimitChange {
            scales_from: Some("2".into()),
            scales_to: Some("5".into()),
            additional_storage: Some("3".into()),
        };
        let reply = service.rescale("scribble", "ruby-1.9", &raw).unwrap();

        assert_eq!(reply.payload.scales_from, 2);
        assert_eq!(reply.payload.scales_to, 5);
        assert_eq!(reply.payload.additional_storage, 3);
    }

    #[tokio::test]
    async fn test_rescale_without_parameters_is_rejected() {
        let service = service_with(scalable_app(), Arc::new(AllowAll));

        let err = service
            .rescale("scribble", "ruby-1.9", &RawLimitChange::default())
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Validation { ref message, .. }
                if message.starts_with("No update parameters")
        ));
    }

    #[tokio::test]
    async fn test_rescale_quarantine_allows_storage_only() {
        let service = service_with(scalable_app(), Arc::new(AllowAll));
        service
            .attach(
                "scribble",
                attach_request(serde_json::json!({"cartridge": "ruby"})),
            )
            .await
            .unwrap();

        let mut app = service.load("scribble").unwrap();
        app.quarantined = true;
        service.directory.save(&app);

        let scale = RawLimitChange {
            scales_to: Some("3".into()),
            ..Default::default()
        };
        assert_eq!(
            service.rescale("scribble", "ruby-1.9", &scale).unwrap_err(),
            LifecycleError::UpgradeInProgress
        );

        let storage_only = RawLimitChange {
            additional_storage: Some("2".into()),
            ..Default::default()
        };
        let reply = service.rescale("scribble", "ruby-1.9", &storage_only).unwrap();
        assert_eq!(reply.payload.additional_storage, 2);
    }

    #[tokio::test]
    async fn test_rescale_authorization_split() {
        let service = service_with(scalable_app(), Arc::new(DenyScaling));
        service
            .attach(
                "scribble",
                attach_request(serde_json::json!({"cartridge": "ruby"})),
            )
            .await
            .unwrap();

        let scale = RawLimitChange {
            scales_to: Some("3".into()),
            ..Default::default()
        };
        assert!(matches!(
            service.rescale("scribble", "ruby-1.9", &scale).unwrap_err(),
            LifecycleError::Forbidden(_)
        ));

        // Storage-only changes need the quota permission, not scaling.
        let storage_only = RawLimitChange {
            additional_storage: Some("1".into()),
            ..Default::default()
        };
        assert!(service.rescale("scribble", "ruby-1.9", &storage_only).is_ok());
    }

    #[tokio::test]
    async fn test_quarantined_app_rejects_attach_and_detach() {
        let mut app = scalable_app();
        app.quarantined = true;
        let service = service_with(app, Arc::new(AllowAll));

        let err = service
            .attach(
                "scribble",
                attach_request(serde_json::json!({"cartridge": "ruby"})),
            )
            .await
            .unwrap_err();
        assert_eq!(err, LifecycleError::UpgradeInProgress);

        assert_eq!(
            service.detach("scribble", "ruby-1.9").unwrap_err(),
            LifecycleError::UpgradeInProgress
        );
    }

    #[tokio::test]
    async fn test_unknown_application_is_not_found() {
        let service = service_with(scalable_app(), Arc::new(AllowAll));
        assert_eq!(
            service.list("ghost").unwrap_err(),
            LifecycleError::not_found("application", "ghost")
        );
    }
}
