//! Kubernetes API types consumed by the network resources injector
//!
//! This library defines:
//! - NetworkAttachmentDefinition: the Multus secondary network custom resource
//! - The well-known annotation keys shared with Multus and the SR-IOV device plugin

pub mod network_attachment;

pub use network_attachment::{NetworkAttachmentDefinition, NetworkAttachmentDefinitionSpec};

/// API group of NetworkAttachmentDefinition
pub const API_GROUP: &str = "k8s.cni.cncf.io";
/// API version of NetworkAttachmentDefinition
pub const API_VERSION: &str = "v1";

/// Pod annotation listing the secondary networks a pod attaches to
pub const NETWORKS_ANNOTATION: &str = "k8s.v1.cni.cncf.io/networks";

/// NetworkAttachmentDefinition annotation naming the device resource backing the network
pub const RESOURCE_NAME_ANNOTATION: &str = "k8s.v1.cni.cncf.io/resourceName";
