//! CapabilityManager port - 権限ツリー（アルゴリズムはコラボレータ側）

use serde::{Deserialize, Serialize};

/// A named node in the permission tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub parent: Option<String>,
}

pub trait CapabilityManager: Send + Sync {
    /// Look up a capability by name.
    fn resolve(&self, name: &str) -> Option<Capability>;

    /// Is `capability` satisfied by the single `granted` capability name?
    fn validate(&self, capability: &str, granted: &str) -> bool;
}
