//! Reconciliation between the store's current component records and a
//! freshly collected inventory.
//!
//! [`compute_change_list`] partitions the collected components into the
//! minimal add/update/remove sets; [`merge_scalar_attributes`] decides
//! whether the vendor/model/serial scalars need a write at all. Both are
//! pure functions so the collector can decide to skip the store write
//! entirely when nothing changed.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use asset_model::{Component, ComponentIdentity, UNKNOWN};

/// The minimal set of component writes needed to bring the store in line
/// with a collected inventory. Computed fresh per cycle, never persisted.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// Present in the collected inventory, absent from the store.
    pub add: Vec<Component>,
    /// Present in both, versioned attribute content differs.
    pub update: Vec<Component>,
    /// Present in the store, absent from the collected inventory.
    pub remove: Vec<Component>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.update.is_empty() && self.remove.is_empty()
    }

    pub fn len(&self) -> usize {
        self.add.len() + self.update.len() + self.remove.len()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("malformed versioned attributes on component {slug}/{serial}: {source}")]
    Decode {
        slug: String,
        serial: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Parse a component's versioned attribute payload for content
/// comparison. An empty payload is valid and compares as null; byte
/// differences from re-serialization (field order) do not matter.
fn versioned_doc(component: &Component) -> Result<Value, ReconcileError> {
    if component.versioned_attributes.is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&component.versioned_attributes).map_err(|source| {
        ReconcileError::Decode {
            slug: component.slug.clone(),
            serial: component.serial.clone(),
            source,
        }
    })
}

/// Compare the store's current component records against a freshly
/// collected set and compute the change list.
///
/// Output ordering follows the iteration order of `new` for add/update
/// and of `current` for remove. A malformed versioned attribute payload
/// on either side aborts the whole computation so no partial change set
/// can be applied.
pub fn compute_change_list(
    current: &[Component],
    new: &[Component],
) -> Result<ChangeSet, ReconcileError> {
    let mut lookup: HashMap<ComponentIdentity, &Component> =
        HashMap::with_capacity(current.len());
    for component in current {
        lookup.insert(component.identity(), component);
    }

    let mut change_set = ChangeSet::default();
    let mut matched: HashSet<ComponentIdentity> = HashSet::with_capacity(new.len());

    for incoming in new {
        let identity = incoming.identity();
        match lookup.get(&identity) {
            None => change_set.add.push(incoming.clone()),
            Some(existing) => {
                matched.insert(identity);
                if versioned_doc(existing)? != versioned_doc(incoming)? {
                    change_set.update.push(incoming.clone());
                }
            }
        }
    }

    for existing in current {
        if !matched.contains(&existing.identity()) {
            change_set.remove.push(existing.clone());
        }
    }

    Ok(change_set)
}

/// Merge freshly collected scalar attributes (vendor/model/serial) over
/// the store's current values.
///
/// A collected value is only adopted where the store has no value, an
/// empty value, or the `"unknown"` placeholder; an existing confirmed
/// value always wins. Returns `None` when nothing would change, in which
/// case the caller must skip the write.
pub fn merge_scalar_attributes(
    new: &HashMap<String, String>,
    current: &HashMap<String, String>,
) -> Option<HashMap<String, String>> {
    let mut updated = current.clone();
    let mut changed = false;

    for (key, value) in new {
        // A blank collected value never clobbers anything.
        if value.is_empty() {
            continue;
        }

        let placeholder = updated
            .get(key)
            .map_or(true, |cur| cur.is_empty() || cur == UNKNOWN);

        if placeholder && updated.get(key) != Some(value) {
            updated.insert(key.clone(), value.clone());
            changed = true;
        }
    }

    changed.then_some(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(slug: &str, serial: &str, versioned: &str) -> Component {
        Component {
            slug: slug.to_string(),
            serial: serial.to_string(),
            vendor: "acme".to_string(),
            model: "x".to_string(),
            versioned_attributes: versioned.to_string(),
        }
    }

    fn firmware(version: &str) -> String {
        format!(r#"{{"firmware":{{"installed":"{version}"}}}}"#)
    }

    /// Apply a change set the way a store backend would, for the
    /// idempotence test below.
    fn apply(current: &[Component], change_set: &ChangeSet) -> Vec<Component> {
        let removed: HashSet<ComponentIdentity> = change_set
            .remove
            .iter()
            .chain(change_set.update.iter())
            .map(Component::identity)
            .collect();

        let mut next: Vec<Component> = current
            .iter()
            .filter(|c| !removed.contains(&c.identity()))
            .cloned()
            .collect();
        next.extend(change_set.update.iter().cloned());
        next.extend(change_set.add.iter().cloned());
        next
    }

    #[test]
    fn disjoint_sets_add_all_remove_all() {
        let current = vec![component("bios", "0", &firmware("1.0"))];
        let new = vec![
            component("nic", "n1", &firmware("7.1")),
            component("drive", "d1", &firmware("3.3")),
        ];

        let cs = compute_change_list(&current, &new).unwrap();
        assert_eq!(cs.add, new);
        assert_eq!(cs.remove, current);
        assert!(cs.update.is_empty());
    }

    #[test]
    fn identical_sets_produce_empty_change_set() {
        let set = vec![
            component("bios", "0", &firmware("2.2.5")),
            component("nic", "n1", &firmware("7.1")),
        ];

        let cs = compute_change_list(&set, &set).unwrap();
        assert!(cs.is_empty());
        assert_eq!(cs.len(), 0);
    }

    #[test]
    fn firmware_bump_is_an_update() {
        let current = vec![component("bios", "0", &firmware("2.2.5"))];
        let new = vec![component("bios", "0", &firmware("2.2.6"))];

        let cs = compute_change_list(&current, &new).unwrap();
        assert!(cs.add.is_empty());
        assert!(cs.remove.is_empty());
        assert_eq!(cs.update, new);
    }

    #[test]
    fn new_component_is_an_add() {
        let current = vec![component("bios", "0", &firmware("2.2.5"))];
        let new = vec![
            component("bios", "0", &firmware("2.2.5")),
            component("nic", "n1", &firmware("7.1")),
        ];

        let cs = compute_change_list(&current, &new).unwrap();
        assert_eq!(cs.add.len(), 1);
        assert_eq!(cs.add[0].slug, "nic");
        assert!(cs.update.is_empty());
        assert!(cs.remove.is_empty());
    }

    #[test]
    fn missing_component_is_a_remove() {
        let current = vec![
            component("bios", "0", &firmware("2.2.5")),
            component("nic", "n1", &firmware("7.1")),
        ];
        let new = vec![component("bios", "0", &firmware("2.2.5"))];

        let cs = compute_change_list(&current, &new).unwrap();
        assert_eq!(cs.remove.len(), 1);
        assert_eq!(cs.remove[0].slug, "nic");
        assert!(cs.add.is_empty());
        assert!(cs.update.is_empty());
    }

    #[test]
    fn comparison_ignores_field_order() {
        let current = vec![component(
            "bios",
            "0",
            r#"{"firmware":{"installed":"2.2.5"},"status":"ok"}"#,
        )];
        let new = vec![component(
            "bios",
            "0",
            r#"{"status":"ok","firmware":{"installed":"2.2.5"}}"#,
        )];

        let cs = compute_change_list(&current, &new).unwrap();
        assert!(cs.is_empty());
    }

    #[test]
    fn output_preserves_input_order() {
        let current = vec![
            component("drive", "d1", &firmware("1")),
            component("drive", "d2", &firmware("1")),
        ];
        let new = vec![
            component("nic", "n2", &firmware("1")),
            component("nic", "n1", &firmware("1")),
        ];

        let cs = compute_change_list(&current, &new).unwrap();
        assert_eq!(cs.add[0].serial, "n2");
        assert_eq!(cs.add[1].serial, "n1");
        assert_eq!(cs.remove[0].serial, "d1");
        assert_eq!(cs.remove[1].serial, "d2");
    }

    #[test]
    fn malformed_payload_aborts_with_decode_error() {
        let current = vec![component("bios", "0", "{not json")];
        let new = vec![component("bios", "0", &firmware("2.2.5"))];

        let err = compute_change_list(&current, &new).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("bios"));
        assert!(msg.contains("0"));
    }

    #[test]
    fn reapplying_a_change_set_is_idempotent() {
        let current = vec![
            component("bios", "0", &firmware("2.2.5")),
            component("drive", "d1", &firmware("1.0")),
        ];
        let new = vec![
            component("bios", "0", &firmware("2.2.6")),
            component("nic", "n1", &firmware("7.1")),
        ];

        let cs = compute_change_list(&current, &new).unwrap();
        let applied = apply(&current, &cs);
        let second = compute_change_list(&applied, &new).unwrap();
        assert!(second.is_empty());
    }

    fn attrs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn merge_keeps_confirmed_values() {
        let current = attrs(&[("vendor", "dell"), ("serial", "S1"), ("model", "r640")]);
        let new = attrs(&[("vendor", "hp"), ("serial", "S2"), ("model", "dl360")]);

        assert!(merge_scalar_attributes(&new, &current).is_none());
    }

    #[test]
    fn merge_populates_empty_current() {
        let new = attrs(&[("vendor", "dell"), ("serial", "S1")]);
        let merged = merge_scalar_attributes(&new, &HashMap::new()).unwrap();
        assert_eq!(merged, new);
    }

    #[test]
    fn merge_of_two_empty_maps_is_no_change() {
        assert!(merge_scalar_attributes(&HashMap::new(), &HashMap::new()).is_none());
    }

    #[test]
    fn merge_replaces_unknown_keeps_known() {
        let current = attrs(&[("serial", "unknown"), ("vendor", "foo")]);
        let new = attrs(&[("serial", "01234"), ("vendor", "bar")]);

        let merged = merge_scalar_attributes(&new, &current).unwrap();
        assert_eq!(merged.get("serial").unwrap(), "01234");
        assert_eq!(merged.get("vendor").unwrap(), "foo");
    }

    #[test]
    fn merge_ignores_blank_collected_values() {
        let current = attrs(&[("serial", "S1")]);
        let new = attrs(&[("serial", ""), ("vendor", "")]);

        assert!(merge_scalar_attributes(&new, &current).is_none());
    }

    #[test]
    fn merge_is_idempotent() {
        let current = attrs(&[("serial", "unknown")]);
        let new = attrs(&[("serial", "01234")]);

        let merged = merge_scalar_attributes(&new, &current).unwrap();
        assert!(merge_scalar_attributes(&new, &merged).is_none());
    }
}
