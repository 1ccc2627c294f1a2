//! Health reports of extension controllers.
//!
//! Extensions report their own view of the cluster's health as conditions on
//! their objects. Each report is attributed to the extension instance that
//! emitted it and routed to the parent condition of the same type.

use crate::crd::{
    CONTROL_PLANE_HEALTHY, Condition, EVERY_NODE_READY, ExtensionObject, SYSTEM_COMPONENTS_HEALTHY,
};

/// A condition reported by one extension object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionCondition {
    pub condition: Condition,
    pub extension_kind: String,
    pub extension_name: String,
    pub extension_namespace: String,
}

/// Extension conditions grouped by the parent condition they contribute to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtensionConditions {
    pub control_plane: Vec<ExtensionCondition>,
    pub every_node_ready: Vec<ExtensionCondition>,
    pub system_components: Vec<ExtensionCondition>,
}

impl ExtensionConditions {
    /// Route the conditions of all objects to their parent condition.
    ///
    /// Conditions of other types are ignored.
    pub fn collect<'a>(objects: impl IntoIterator<Item = &'a ExtensionObject>) -> Self {
        let mut grouped = Self::default();
        for object in objects {
            for condition in &object.conditions {
                let target = match condition.r#type.as_str() {
                    CONTROL_PLANE_HEALTHY => &mut grouped.control_plane,
                    EVERY_NODE_READY => &mut grouped.every_node_ready,
                    SYSTEM_COMPONENTS_HEALTHY => &mut grouped.system_components,
                    _ => continue,
                };
                target.push(ExtensionCondition {
                    condition: condition.clone(),
                    extension_kind: object.kind.clone(),
                    extension_name: object.name.clone(),
                    extension_namespace: object.namespace.clone(),
                });
            }
        }
        grouped
    }

    pub fn is_empty(&self) -> bool {
        self.control_plane.is_empty()
            && self.every_node_ready.is_empty()
            && self.system_components.is_empty()
    }
}
