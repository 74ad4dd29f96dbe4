//! Parsing of the pod network attachment annotation
//!
//! Two encodings are accepted, matching what Multus understands:
//! - a JSON array of network selection objects
//!   (`[{"name":"sriov","namespace":"net","interface":"net1"}]`)
//! - the comma separated shorthand (`sriov, net/other@net2`)

use serde::Deserialize;

use crate::{InjectorError, Result};

/// A network requested by a pod
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NetworkReference {
    pub name: String,
    pub namespace: String,
    pub interface_request: Option<String>,
}

impl NetworkReference {
    /// `namespace/name` key used in logs and errors
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// One element of the JSON form of the annotation
#[derive(Debug, Deserialize)]
struct NetworkSelectionElement {
    name: String,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default, rename = "interface", alias = "interfaceRequest")]
    interface: Option<String>,
}

/// Parse the networks annotation value into references.
///
/// A missing or blank annotation yields no networks. Namespaces default to
/// `default_namespace`.
pub fn parse_networks(
    annotation: Option<&str>,
    default_namespace: &str,
) -> Result<Vec<NetworkReference>> {
    let value = match annotation.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => return Ok(Vec::new()),
    };

    if value.starts_with('[') {
        parse_json(value, default_namespace)
    } else {
        parse_shorthand(value, default_namespace)
    }
}

fn parse_json(value: &str, default_namespace: &str) -> Result<Vec<NetworkReference>> {
    let elements: Vec<NetworkSelectionElement> = serde_json::from_str(value)
        .map_err(|e| InjectorError::MalformedAnnotation(e.to_string()))?;

    elements
        .into_iter()
        .enumerate()
        .map(|(idx, element)| {
            let name = element.name.trim();
            if name.is_empty() {
                return Err(InjectorError::MalformedAnnotation(format!(
                    "network at index {} has an empty name",
                    idx
                )));
            }

            let namespace = element
                .namespace
                .as_deref()
                .map(str::trim)
                .filter(|ns| !ns.is_empty())
                .unwrap_or(default_namespace);

            Ok(NetworkReference {
                name: name.to_string(),
                namespace: namespace.to_string(),
                interface_request: element.interface.filter(|i| !i.is_empty()),
            })
        })
        .collect()
}

fn parse_shorthand(value: &str, default_namespace: &str) -> Result<Vec<NetworkReference>> {
    value
        .split(',')
        .map(str::trim)
        .map(|item| parse_shorthand_item(item, default_namespace))
        .collect()
}

/// Parse `[namespace/]name[@interface]`
fn parse_shorthand_item(item: &str, default_namespace: &str) -> Result<NetworkReference> {
    let malformed = |reason: &str| {
        InjectorError::MalformedAnnotation(format!("invalid network \"{}\": {}", item, reason))
    };

    if item.is_empty() {
        return Err(malformed("empty network entry"));
    }

    let (object, interface) = match item.split_once('@') {
        Some((object, interface)) => {
            if interface.contains('@') {
                return Err(malformed("more than one '@'"));
            }
            if interface.is_empty() {
                return Err(malformed("empty interface name"));
            }
            (object, Some(interface.to_string()))
        }
        None => (item, None),
    };

    let (namespace, name) = match object.split_once('/') {
        Some((namespace, name)) => {
            if name.contains('/') {
                return Err(malformed("more than one '/'"));
            }
            if !is_dns_label(namespace) {
                return Err(malformed("namespace is not a valid DNS-1123 label"));
            }
            (namespace, name)
        }
        None => (default_namespace, object),
    };

    if !is_dns_subdomain(name) {
        return Err(malformed("name is not a valid DNS-1123 subdomain"));
    }

    Ok(NetworkReference {
        name: name.to_string(),
        namespace: namespace.to_string(),
        interface_request: interface,
    })
}

fn is_dns_label(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 63
        && s.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && !s.starts_with('-')
        && !s.ends_with('-')
}

fn is_dns_subdomain(s: &str) -> bool {
    !s.is_empty() && s.len() <= 253 && s.split('.').all(is_dns_label)
}
