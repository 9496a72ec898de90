//! StaticCapabilities - 親リンク付きの固定権限ツリー

use std::collections::BTreeMap;

use crate::ports::{Capability, CapabilityManager};

#[derive(Debug, Clone, Default)]
pub struct StaticCapabilities {
    caps: BTreeMap<String, Capability>,
}

impl StaticCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. `parent` must already exist for the hierarchy to be walkable.
    pub fn with(mut self, name: &str, parent: Option<&str>, description: &str) -> Self {
        self.caps.insert(
            name.to_string(),
            Capability {
                name: name.to_string(),
                description: description.to_string(),
                parent: parent.map(str::to_string),
            },
        );
        self
    }

    /// The tree the platform ships with.
    pub fn builtin() -> Self {
        Self::new()
            .with("admin", None, "full platform access")
            .with("resource", Some("admin"), "manage resources")
            .with("resource.dns", Some("resource"), "manage DNS records")
            .with("resource.certificate", Some("resource"), "manage TLS certificates")
            .with("apps", Some("admin"), "manage other apps")
            .with("apps.read", Some("apps"), "list other apps")
    }
}

impl CapabilityManager for StaticCapabilities {
    fn resolve(&self, name: &str) -> Option<Capability> {
        self.caps.get(name).cloned()
    }

    /// Satisfied when `capability` is `granted` itself or one of its ancestors.
    fn validate(&self, capability: &str, granted: &str) -> bool {
        let mut current = Some(granted.to_string());
        while let Some(name) = current {
            if name == capability {
                return true;
            }
            current = self.caps.get(&name).and_then(|c| c.parent.clone());
        }
        false
    }
}
