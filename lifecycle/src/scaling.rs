//! Validation of scale-bound and storage changes.
//!
//! The rejection order is a contract: callers assert on specific reasons,
//! and the later checks read state (the owning group's current bounds)
//! that is only meaningful once the structural checks have passed.

use crate::errors::LifecycleError;
use crate::model::{Application, UNBOUNDED};
use serde::Deserialize;

/// A requested change to a component's scale bounds or storage allotment,
/// as submitted. Numeric fields arrive as strings; parsing them is part of
/// validation, never allowed to surface as a raw parse failure.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct RawLimitChange {
    #[serde(default)]
    pub scales_from: Option<String>,
    #[serde(default)]
    pub scales_to: Option<String>,
    #[serde(default)]
    pub additional_storage: Option<String>,
}

impl RawLimitChange {
    /// Lenient reading of the scale factors; garbage degrades to absent,
    /// which the historical clients depend on.
    pub fn scale_factors(&self) -> (Option<i64>, Option<i64>) {
        (
            self.scales_from.as_deref().and_then(lenient_int),
            self.scales_to.as_deref().and_then(lenient_int),
        )
    }

    /// Strict reading of the storage allotment.
    pub fn storage(&self) -> Result<Option<i64>, LifecycleError> {
        match &self.additional_storage {
            None => Ok(None),
            Some(text) => text.trim().parse::<i64>().map(Some).map_err(|_| {
                LifecycleError::validation(
                    "Invalid storage value provided.",
                    Some("additional_storage"),
                )
            }),
        }
    }

    /// True when the request carries nothing usable at all.
    pub fn is_empty(&self) -> bool {
        let (from, to) = self.scale_factors();
        from.is_none() && to.is_none() && self.additional_storage.is_none()
    }
}

fn lenient_int(text: &str) -> Option<i64> {
    text.trim().parse().ok()
}

/// The fully-parsed change.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LimitChange {
    pub scales_from: Option<i64>,
    pub scales_to: Option<i64>,
    pub additional_storage: Option<i64>,
}

impl LimitChange {
    pub fn scaling_requested(&self) -> bool {
        self.scales_from.is_some() || self.scales_to.is_some()
    }
}

/// Ordered rejection ladder for a scale/storage change against the
/// application's current state. Returns the first failing check.
pub fn validate_limit_change(
    app: &Application,
    id: &str,
    change: &LimitChange,
) -> Result<(), LifecycleError> {
    // Fixed-scale applications only ever accept a scale of exactly one.
    if !app.scalable {
        let from_conflicts = change.scales_from.is_some_and(|from| from != 1);
        let to_conflicts = change
            .scales_to
            .is_some_and(|to| to != 1 && to != UNBOUNDED);
        if from_conflicts || to_conflicts {
            return Err(LifecycleError::validation(
                format!("Application '{}' is not scalable", app.name),
                Some("name"),
            ));
        }
    }

    if let Some(from) = change.scales_from
        && from < 1
    {
        return Err(LifecycleError::validation(
            format!("Invalid scales_from factor {from} provided"),
            Some("scales_from"),
        ));
    }

    if let Some(to) = change.scales_to
        && (to == 0 || to < UNBOUNDED)
    {
        return Err(LifecycleError::validation(
            format!("Invalid scales_to factor {to} provided"),
            Some("scales_to"),
        ));
    }

    if let (Some(from), Some(to)) = (change.scales_from, change.scales_to)
        && to >= 1
        && to < from
    {
        return Err(LifecycleError::validation(
            "Invalid scales_(from|to) factor provided",
            Some("scales_to"),
        ));
    }

    // Upgrades block rescaling; storage-only changes stay permitted.
    if app.quarantined && change.scaling_requested() {
        return Err(LifecycleError::UpgradeInProgress);
    }

    let Some(component) = app.find_component(id) else {
        return Err(LifecycleError::validation(
            format!("Invalid cartridge {id} for application {}", app.name),
            Some("cartridge"),
        ));
    };

    // Sparse components scale with their group only.
    if component.sparse {
        if let Some(to) = change.scales_to
            && to != 1
        {
            return Err(LifecycleError::validation(
                format!("The cartridge {id} cannot be scaled."),
                Some("scales_to"),
            ));
        }
        if let Some(from) = change.scales_from
            && from != 1
        {
            return Err(LifecycleError::validation(
                format!("The cartridge {id} cannot be scaled."),
                Some("scales_from"),
            ));
        }
    }

    let group = app
        .group_of(component)
        .ok_or_else(|| LifecycleError::not_found("group", component.group_name.clone()))?;

    // Lowering the ceiling below the standing floor requires restating
    // both bounds together.
    if let Some(to) = change.scales_to
        && change.scales_from.is_none()
        && to >= 1
        && to < group.min
    {
        return Err(LifecycleError::validation(
            "The scales_to factor currently provided cannot be lower than the scales_from \
             factor previously provided. Please specify both scales_(from|to) factors together \
             to override.",
            Some("scales_to"),
        ));
    }

    // Likewise for raising the floor above a standing, bounded ceiling.
    if let Some(from) = change.scales_from
        && change.scales_to.is_none()
        && group.max >= 1
        && group.max < from
    {
        return Err(LifecycleError::validation(
            "The scales_from factor currently provided cannot be higher than the scales_to \
             factor previously provided. Please specify both scales_(from|to) factors together \
             to override.",
            Some("scales_from"),
        ));
    }

    Ok(())
}
