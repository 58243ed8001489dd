//! Synthesis of Kubernetes and OpenShift objects from a normalized service model.

pub mod controller;
pub mod env;
pub mod error;
pub mod grouping;
pub mod hpa;
pub mod model;
pub mod naming;
pub mod network;
pub mod network_policy;
pub mod objects;
pub mod podspec;
pub mod postprocess;
pub mod service;
pub mod transformer;
pub mod volumes;

pub use error::{TransformError, TransformResult};
pub use model::{ControllerKind, ConvertOptions, Provider, ServiceConfig, VolumeMode};
pub use objects::{K8sObject, ObjectKey};
pub use transformer::transform;
