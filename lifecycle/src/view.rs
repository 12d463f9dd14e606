use crate::model::{ComponentInstance, GroupInstance};
use serde::Serialize;

/// Caller-facing projection of one attached cartridge. The wire encoding
/// is owned by the presentation layer; this is the payload it serializes.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CartridgeView {
    pub name: String,
    pub gear_size: Option<String>,
    pub scales_from: i64,
    pub scales_to: i64,
    pub current_scale: i64,
    pub additional_storage: i64,
    pub sparse: bool,
}

impl CartridgeView {
    pub fn assemble(component: &ComponentInstance, group: &GroupInstance) -> Self {
        CartridgeView {
            name: component.cartridge_name.clone(),
            gear_size: group.gear_size.clone(),
            // Sparse components always report a fixed scale of one; the
            // group bounds belong to the components that drive scaling.
            scales_from: if component.sparse { 1 } else { group.min },
            scales_to: if component.sparse { 1 } else { group.max },
            current_scale: group.current,
            additional_storage: component.additional_storage,
            sparse: component.sparse,
        }
    }
}
