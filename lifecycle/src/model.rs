//! The application topology: component instances grouped into scaling
//! domains, plus the download map tracking url-fetched cartridges.

use crate::errors::LifecycleError;
use cartridge::catalog::ScaleRange;
use cartridge::resolver::{DownloadedCart, ResolvedCartridge};
use cartridge::spec::EnvVar;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

/// Sentinel for "no upper bound" in scale maxima.
pub const UNBOUNDED: i64 = -1;

const MAX_NAME_LEN: usize = 64;

fn default_gear_limit() -> i64 {
    16
}

/// Validate a caller-supplied cartridge identity before any lookup
/// happens. Malformed identifiers are a structured rejection, not a miss.
pub fn check_name(id: &str) -> Result<&str, LifecycleError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_NAME_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(id)
    } else {
        Err(LifecycleError::validation(
            format!("Invalid cartridge identifier '{id}'"),
            Some("id"),
        ))
    }
}

/// A provisioned attachment of one cartridge to one application.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ComponentInstance {
    /// Unique within the application; the versioned name for downloaded
    /// cartridges.
    pub cartridge_name: String,
    pub component_name: String,
    /// Sparse components ride along with their group and cannot be scaled
    /// independently.
    #[serde(default)]
    pub sparse: bool,
    pub group_name: String,
    /// Dedicated storage (GB) on top of the gear default.
    #[serde(default)]
    pub additional_storage: i64,
}

/// A scaling domain: every component in the group scales together under
/// shared bounds.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct GroupInstance {
    pub name: String,
    pub min: i64,
    /// `-1` means unbounded.
    pub max: i64,
    /// Gears currently allocated to the group.
    pub current: i64,
    #[serde(default)]
    pub gear_size: Option<String>,
}

/// Requested placement and scale adjustments for one resolved cartridge,
/// relative to the application's existing topology.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupOverride {
    pub cartridge_name: String,
    /// Existing group the component joins instead of founding its own.
    pub colocate_with: Option<String>,
    pub gear_size: Option<String>,
    pub scale: ScaleRange,
}

/// What a provisioning operation actually changed; forwarded to the caller
/// alongside the payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProvisionResult {
    pub created_components: Vec<String>,
    pub removed_components: Vec<String>,
    pub gear_delta: i64,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Application {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub scalable: bool,
    /// Set while an upgrade runs; most mutating operations are rejected.
    #[serde(default)]
    pub quarantined: bool,
    #[serde(default = "default_gear_limit")]
    pub gear_limit: i64,
    #[serde(default)]
    pub components: Vec<ComponentInstance>,
    #[serde(default)]
    pub groups: Vec<GroupInstance>,
    #[serde(default)]
    pub downloaded_cart_map: IndexMap<String, DownloadedCart>,
    #[serde(default)]
    pub env_vars: Vec<EnvVar>,
}

impl Application {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Application {
            name: name.into(),
            namespace: namespace.into(),
            scalable: false,
            quarantined: false,
            gear_limit: default_gear_limit(),
            components: Vec::new(),
            groups: Vec::new(),
            downloaded_cart_map: IndexMap::new(),
            env_vars: Vec::new(),
        }
    }

    pub fn find_component(&self, cartridge_name: &str) -> Option<&ComponentInstance> {
        self.components
            .iter()
            .find(|c| c.cartridge_name == cartridge_name)
    }

    pub fn group_of(&self, component: &ComponentInstance) -> Option<&GroupInstance> {
        self.groups.iter().find(|g| g.name == component.group_name)
    }

    pub fn gears_in_use(&self) -> i64 {
        self.groups.iter().map(|g| g.current).sum()
    }

    /// The group sparse cartridges ride along with: the oldest one.
    pub fn primary_group(&self) -> Option<&GroupInstance> {
        self.groups.first()
    }

    /// Reject a proposed cartridge set that conflicts with itself or with
    /// what is already installed.
    pub fn validate_cartridge_instances(
        &self,
        carts: &[ResolvedCartridge],
    ) -> Result<(), LifecycleError> {
        let mut seen = HashSet::new();
        for cart in carts {
            let name = cart.definition.name.as_str();
            if !seen.insert(name) {
                return Err(LifecycleError::validation(
                    format!("Cartridge '{name}' is requested more than once"),
                    Some("cartridge"),
                ));
            }
            if self.find_component(name).is_some() {
                return Err(LifecycleError::validation(
                    format!(
                        "Cartridge '{name}' is already installed on application '{}'",
                        self.name
                    ),
                    Some("cartridge"),
                ));
            }
        }
        Ok(())
    }

    /// Provision `carts` as components, creating groups as needed and
    /// honoring `overrides`. The whole request is planned before anything
    /// is created so the gear quota check sees the full cost.
    pub fn add_features(
        &mut self,
        carts: &[ResolvedCartridge],
        overrides: &[GroupOverride],
        env_vars: Option<&[EnvVar]>,
    ) -> Result<ProvisionResult, LifecycleError> {
        let mut new_groups: Vec<GroupInstance> = Vec::new();
        let mut placements: Vec<(&ResolvedCartridge, String)> = Vec::new();

        for cart in carts {
            let name = cart.definition.name.as_str();
            let overridden = overrides.iter().find(|o| o.cartridge_name == name);

            let mut target = overridden.and_then(|o| o.colocate_with.clone());
            if target.is_none() && !self.scalable {
                // Fixed-scale applications keep everything in one group.
                target = self
                    .groups
                    .first()
                    .or(new_groups.first())
                    .map(|g| g.name.clone());
            }

            match target {
                Some(group_name) => placements.push((cart, group_name)),
                None if cart.definition.sparse => {
                    return Err(LifecycleError::validation(
                        format!("Cartridge '{name}' requires an existing group to join"),
                        Some("cartridge"),
                    ));
                }
                None => {
                    let scale = overridden.map(|o| o.scale).unwrap_or(cart.definition.scale);
                    let gear_size = overridden
                        .and_then(|o| o.gear_size.clone())
                        .or_else(|| cart.gear_size.clone());
                    let group = GroupInstance {
                        name: name.to_string(),
                        min: scale.min.max(1),
                        max: scale.max,
                        current: scale.min.max(1),
                        gear_size,
                    };
                    placements.push((cart, group.name.clone()));
                    new_groups.push(group);
                }
            }
        }

        let added_gears: i64 = new_groups.iter().map(|g| g.current).sum();
        if self.gears_in_use() + added_gears > self.gear_limit {
            return Err(LifecycleError::GearLimitReached(format!(
                "application '{}' would exceed its limit of {} gears",
                self.name, self.gear_limit
            )));
        }

        if let Some(vars) = env_vars {
            for var in vars {
                match self.env_vars.iter_mut().find(|v| v.name == var.name) {
                    Some(existing) => existing.value = var.value.clone(),
                    None => self.env_vars.push(var.clone()),
                }
            }
        }

        self.groups.extend(new_groups);

        let mut result = ProvisionResult {
            gear_delta: added_gears,
            ..Default::default()
        };
        for (cart, group_name) in placements {
            let component = ComponentInstance {
                cartridge_name: cart.definition.name.clone(),
                component_name: cart.definition.short_name.clone(),
                sparse: cart.definition.sparse,
                group_name,
                additional_storage: 0,
            };
            info!(
                application = %self.name,
                cartridge = %component.cartridge_name,
                group = %component.group_name,
                "adding component instance"
            );
            result
                .created_components
                .push(component.cartridge_name.clone());
            self.components.push(component);
        }
        Ok(result)
    }

    /// Remove the named features, collapsing groups whose last member
    /// leaves and dropping matching download-map entries.
    pub fn remove_features(&mut self, names: &[String]) -> Result<ProvisionResult, LifecycleError> {
        let mut result = ProvisionResult::default();
        for name in names {
            let index = self
                .components
                .iter()
                .position(|c| &c.cartridge_name == name)
                .ok_or_else(|| LifecycleError::not_found("cartridge", name.clone()))?;
            let component = self.components.remove(index);

            let group_emptied = !self
                .components
                .iter()
                .any(|c| c.group_name == component.group_name);
            if group_emptied
                && let Some(gidx) = self
                    .groups
                    .iter()
                    .position(|g| g.name == component.group_name)
            {
                let group = self.groups.remove(gidx);
                result.gear_delta -= group.current;
            }

            self.downloaded_cart_map
                .retain(|_, cart| cart.versioned_name != component.cartridge_name);

            info!(
                application = %self.name,
                cartridge = %component.cartridge_name,
                "removed component instance"
            );
            result.removed_components.push(component.cartridge_name);
        }
        Ok(result)
    }

    /// Apply already-validated scale-bound and storage changes to the
    /// component and its owning group.
    pub fn update_component_limits(
        &mut self,
        cartridge_name: &str,
        scales_from: Option<i64>,
        scales_to: Option<i64>,
        additional_storage: Option<i64>,
    ) -> Result<ProvisionResult, LifecycleError> {
        let component = self
            .components
            .iter_mut()
            .find(|c| c.cartridge_name == cartridge_name)
            .ok_or_else(|| LifecycleError::not_found("cartridge", cartridge_name))?;

        if let Some(storage) = additional_storage {
            component.additional_storage = storage;
        }
        let group_name = component.group_name.clone();

        let group = self
            .groups
            .iter_mut()
            .find(|g| g.name == group_name)
            .ok_or_else(|| LifecycleError::not_found("group", group_name.clone()))?;

        if let Some(from) = scales_from {
            group.min = from;
            if group.current < from {
                group.current = from;
            }
        }
        if let Some(to) = scales_to {
            group.max = to;
            if to >= 1 && group.current > to {
                group.current = to;
            }
        }

        Ok(ProvisionResult::default())
    }
}

/// Compute placement overrides for `carts` relative to `app`'s existing
/// topology: sparse cartridges ride with the primary group, and every
/// cartridge of a fixed-scale application shares the single group.
pub fn overrides_for(carts: &[ResolvedCartridge], app: &Application) -> Vec<GroupOverride> {
    let mut overrides = Vec::new();
    for cart in carts {
        let colocate_with = if !app.scalable || cart.definition.sparse {
            app.primary_group().map(|g| g.name.clone())
        } else {
            None
        };
        let scale = if app.scalable {
            cart.definition.scale
        } else {
            ScaleRange { min: 1, max: 1 }
        };
        if colocate_with.is_some() || scale != cart.definition.scale || cart.gear_size.is_some() {
            overrides.push(GroupOverride {
                cartridge_name: cart.definition.name.clone(),
                colocate_with,
                gear_size: cart.gear_size.clone(),
                scale,
            });
        }
    }
    overrides
}
