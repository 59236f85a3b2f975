use serde::{Deserialize, Serialize};

/// Normalized device inventory document produced by the BMC collection
/// collaborator. Beyond the identity scalars the interesting content is
/// the component list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub serial: String,
    #[serde(default)]
    pub components: Vec<Component>,
}

/// One hardware sub-unit of a server (BIOS, NIC, drive, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Human readable component type, e.g. "bios", "nic".
    pub slug: String,
    /// Server-scoped identifier, stable across collection cycles.
    pub serial: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub model: String,
    /// Raw JSON document of attributes that change with firmware installs
    /// (installed version, status). Content equality of this document
    /// decides whether the component counts as updated.
    #[serde(default)]
    pub versioned_attributes: String,
}

impl Component {
    pub fn identity(&self) -> ComponentIdentity {
        ComponentIdentity::new(&self.slug, &self.serial)
    }
}

/// Stable identity key matching a component across collection cycles.
///
/// Two records describe the same logical component iff they share the
/// component slug and the (case-folded) server-scoped serial. Serials are
/// case-folded because BMC vendors are not consistent about casing between
/// firmware revisions.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct ComponentIdentity {
    slug: String,
    serial: String,
}

impl ComponentIdentity {
    pub fn new(slug: &str, serial: &str) -> Self {
        Self {
            slug: slug.to_string(),
            serial: serial.to_ascii_lowercase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_folds_serial_case() {
        let a = ComponentIdentity::new("nic", "ABC123");
        let b = ComponentIdentity::new("nic", "abc123");
        assert_eq!(a, b);
    }

    #[test]
    fn identity_distinguishes_slug() {
        let a = ComponentIdentity::new("nic", "0");
        let b = ComponentIdentity::new("drive", "0");
        assert_ne!(a, b);
    }
}
