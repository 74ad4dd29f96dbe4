//! Ordered resource maps and merging of device resources into them

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Quantity contributed by each network that resolves to a resource
pub const UNIT_QUANTITY: u64 = 1;

/// Resource name to quantity map that keeps insertion order.
///
/// Serialization writes entries in order and deserialization keeps the order
/// of the source document, so patches are byte-for-byte reproducible.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceMap {
    entries: Vec<(String, String)>,
}

impl ResourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set a quantity, keeping the position of an existing key
    pub fn insert(&mut self, key: impl Into<String>, quantity: impl Into<String>) {
        let key = key.into();
        let quantity = quantity.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = quantity,
            None => self.entries.push((key, quantity)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ResourceMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = ResourceMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl Serialize for ResourceMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ResourceMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ResourceMapVisitor;

        impl<'de> Visitor<'de> for ResourceMapVisitor {
            type Value = ResourceMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of resource names to quantity strings")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ResourceMap, A::Error> {
                let mut map = ResourceMap::new();
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    map.insert(k, v);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(ResourceMapVisitor)
    }
}

/// How a resource already present in a container map is combined with the
/// quantity requested by the pod's networks
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MergePolicy {
    /// Set the entry to the number of networks requesting it. Re-running the
    /// merge with the same networks leaves the map unchanged.
    ///
    /// A quantity the pod already declares for an injected device resource is
    /// overwritten, so a declared `"4"` becomes `"1"` for a single network.
    /// Entries for resources no network resolves to are left alone.
    #[default]
    Replace,
    /// Add the number of networks requesting it to an existing integer
    /// quantity. Not idempotent: every admission adds again.
    Accumulate,
}

impl FromStr for MergePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "replace" => Ok(MergePolicy::Replace),
            "accumulate" => Ok(MergePolicy::Accumulate),
            _ => Err(format!(
                "Invalid merge policy: {}. Must be replace or accumulate",
                s
            )),
        }
    }
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergePolicy::Replace => f.write_str("replace"),
            MergePolicy::Accumulate => f.write_str("accumulate"),
        }
    }
}

/// Native Kubernetes resources (`cpu`, `memory`, `hugepages-2Mi`, ...) have no
/// domain prefix or live in the kubernetes.io domain
pub fn is_native_resource(name: &str) -> bool {
    match name.split_once('/') {
        None => true,
        Some((domain, _)) => domain == "kubernetes.io" || domain.ends_with(".kubernetes.io"),
    }
}

/// Count identifiers in first-seen order
fn count_identifiers(identifiers: &[String]) -> Vec<(&str, u64)> {
    let mut counts: Vec<(&str, u64)> = Vec::new();
    for id in identifiers {
        match counts.iter_mut().find(|(k, _)| *k == id.as_str()) {
            Some(entry) => entry.1 += UNIT_QUANTITY,
            None => counts.push((id.as_str(), UNIT_QUANTITY)),
        }
    }
    counts
}

/// Merge device resource identifiers into a copy of `existing`.
///
/// Existing entries keep their position and encoding; new resources are
/// appended in the order they were first requested. Native resources are
/// never modified.
pub fn merge(existing: &ResourceMap, identifiers: &[String], policy: MergePolicy) -> ResourceMap {
    let mut merged = existing.clone();

    for (resource, count) in count_identifiers(identifiers) {
        if is_native_resource(resource) {
            warn!(resource = %resource, "Refusing to inject native resource");
            continue;
        }

        let quantity = match (policy, merged.get(resource)) {
            (MergePolicy::Accumulate, Some(current)) => match current.parse::<u64>() {
                Ok(current) => current.saturating_add(count),
                Err(_) => {
                    debug!(
                        resource = %resource,
                        quantity = %current,
                        "Existing quantity is not an integer, replacing it"
                    );
                    count
                }
            },
            _ => count,
        };

        merged.insert(resource, quantity.to_string());
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRIOV: &str = "openshift.io/intel_sriov";

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_merge_into_empty() {
        let merged = merge(&ResourceMap::new(), &ids(&[SRIOV]), MergePolicy::Replace);
        assert_eq!(merged, ResourceMap::from_iter([(SRIOV, "1")]));
    }

    #[test]
    fn test_merge_preserves_existing_entries_and_order() {
        let existing = ResourceMap::from_iter([("memory", "12345"), ("cpu", "100m")]);
        let merged = merge(&existing, &ids(&[SRIOV]), MergePolicy::Replace);

        let entries: Vec<_> = merged.iter().collect();
        assert_eq!(
            entries,
            vec![("memory", "12345"), ("cpu", "100m"), (SRIOV, "1")]
        );
        // Input untouched
        assert_eq!(existing.len(), 2);
    }

    #[test]
    fn test_merge_duplicates_each_contribute() {
        let merged = merge(
            &ResourceMap::new(),
            &ids(&["intel.com/b", SRIOV, "intel.com/b"]),
            MergePolicy::Replace,
        );
        let entries: Vec<_> = merged.iter().collect();
        assert_eq!(entries, vec![("intel.com/b", "2"), (SRIOV, "1")]);
    }

    #[test]
    fn test_replace_policy_is_idempotent() {
        let once = merge(&ResourceMap::new(), &ids(&[SRIOV]), MergePolicy::Replace);
        let twice = merge(&once, &ids(&[SRIOV]), MergePolicy::Replace);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_replace_policy_overwrites_existing_device_quantity() {
        let existing = ResourceMap::from_iter([(SRIOV, "4")]);
        let merged = merge(&existing, &ids(&[SRIOV]), MergePolicy::Replace);
        assert_eq!(merged.get(SRIOV), Some("1"));
    }

    #[test]
    fn test_accumulate_policy_sums() {
        let existing = ResourceMap::from_iter([(SRIOV, "2")]);
        let merged = merge(&existing, &ids(&[SRIOV, SRIOV]), MergePolicy::Accumulate);
        assert_eq!(merged.get(SRIOV), Some("4"));
    }

    #[test]
    fn test_accumulate_policy_replaces_non_integer() {
        let existing = ResourceMap::from_iter([(SRIOV, "1k")]);
        let merged = merge(&existing, &ids(&[SRIOV]), MergePolicy::Accumulate);
        assert_eq!(merged.get(SRIOV), Some("1"));
    }

    #[test]
    fn test_native_resources_are_never_touched() {
        let existing = ResourceMap::from_iter([("cpu", "100"), ("memory", "12345")]);
        let merged = merge(
            &existing,
            &ids(&["cpu", "hugepages-2Mi", "kubernetes.io/batch"]),
            MergePolicy::Accumulate,
        );
        assert_eq!(merged, existing);
    }

    #[test]
    fn test_is_native_resource() {
        assert!(is_native_resource("cpu"));
        assert!(is_native_resource("ephemeral-storage"));
        assert!(is_native_resource("kubernetes.io/foo"));
        assert!(is_native_resource("node.kubernetes.io/foo"));
        assert!(!is_native_resource(SRIOV));
        assert!(!is_native_resource("intel.com/sriov_netdevice"));
    }

    #[test]
    fn test_serde_keeps_document_order() {
        let json = r#"{"memory":"12345","cpu":"100"}"#;
        let map: ResourceMap = serde_json::from_str(json).unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["memory", "cpu"]);
        assert_eq!(serde_json::to_string(&map).unwrap(), json);
    }

    #[test]
    fn test_merge_policy_from_str() {
        assert_eq!("replace".parse::<MergePolicy>(), Ok(MergePolicy::Replace));
        assert_eq!("Accumulate".parse::<MergePolicy>(), Ok(MergePolicy::Accumulate));
        assert!("sum".parse::<MergePolicy>().is_err());
        assert_eq!(MergePolicy::default().to_string(), "replace");
    }
}
