//! Installer metadata: what an app store entry says about an app.

use serde::{Deserialize, Serialize};

/// Transport protocol of an exposed port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

/// A port the app wants reachable from outside the instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicPort {
    pub port: u16,
    pub protocol: Protocol,
}

impl PublicPort {
    pub fn tcp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Tcp,
        }
    }
}

/// Metadata resolved for one installer version.
///
/// In dev mode the caller may pass this inline instead of having it resolved
/// from the app store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallerMetadata {
    /// Sandbox image reference (e.g. `registry.local/notes:1.2`).
    pub image: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Capability names the app asks to be granted.
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// Whether the app needs a persistent volume.
    #[serde(default)]
    pub persistence: bool,

    #[serde(default)]
    pub public_ports: Vec<PublicPort>,

    /// Resource types this app provides to other apps (e.g. `dns`).
    #[serde(default)]
    pub provides: Vec<String>,
}

impl InstallerMetadata {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            description: None,
            capabilities: Vec::new(),
            persistence: false,
            public_ports: Vec::new(),
            provides: Vec::new(),
        }
    }

    pub fn with_capability(mut self, name: impl Into<String>) -> Self {
        self.capabilities.push(name.into());
        self
    }

    pub fn with_persistence(mut self) -> Self {
        self.persistence = true;
        self
    }

    pub fn with_public_port(mut self, port: PublicPort) -> Self {
        self.public_ports.push(port);
        self
    }

    pub fn providing(mut self, resource_type: impl Into<String>) -> Self {
        self.provides.push(resource_type.into());
        self
    }
}
