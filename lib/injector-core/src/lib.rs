//! Patch computation for the network resources injector
//!
//! This library provides:
//! - Parsing of the pod network attachment annotation
//! - Resolution of networks to device resource names
//! - Ordered merging of resource names into container resource maps
//! - JSON Patch generation for pod containers

pub mod annotation;
pub mod engine;
pub mod error;
pub mod patch;
pub mod resolver;
pub mod resources;

pub use annotation::{parse_networks, NetworkReference};
pub use engine::PatchEngine;
pub use error::{InjectorError, LookupError, Result};
pub use patch::{build_patch, PatchOperation, PodSpecView};
pub use resolver::{KubeNetworkLookup, NetworkDefinitionLookup, NetworkResolver};
pub use resources::{merge, MergePolicy, ResourceMap};
