//! Pod descriptors as delivered by the control plane.
//!
//! The worker subsystem only ever reads [`Pod::uid`]; everything else is
//! carried through untouched to the container runtime.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use minik8s_id::PodUid;
use serde::{Deserialize, Serialize};

/// Desired configuration of a pod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub metadata: PodMetadata,
    #[serde(default)]
    pub spec: PodSpec,
}

impl Pod {
    /// Create a pod with the given identity and name and no containers.
    pub fn new(uid: PodUid, name: impl Into<String>) -> Self {
        Self {
            metadata: PodMetadata {
                uid,
                name: name.into(),
                namespace: default_namespace(),
                labels: BTreeMap::new(),
                creation_timestamp: None,
            },
            spec: PodSpec::default(),
        }
    }

    /// Add a container to the pod spec.
    pub fn with_container(mut self, container: ContainerSpec) -> Self {
        self.spec.containers.push(container);
        self
    }

    /// Identity used to route lifecycle work for this pod.
    pub fn uid(&self) -> &PodUid {
        &self.metadata.uid
    }

    /// `namespace/name`, for log lines.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.metadata.namespace, self.metadata.name)
    }
}

/// Pod metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodMetadata {
    pub uid: PodUid,
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

fn default_namespace() -> String {
    "default".to_string()
}

/// Containers making up a pod.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,
}

/// Configuration for a single container, passed to the runtime on create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub image_pull_policy: ImagePullPolicy,
    /// Arguments handed to the entrypoint.
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub entrypoint: Vec<String>,
    /// `KEY=value` pairs.
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub tty: bool,
    #[serde(default)]
    pub volumes: BTreeSet<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            image_pull_policy: ImagePullPolicy::default(),
            command: Vec::new(),
            entrypoint: Vec::new(),
            env: Vec::new(),
            tty: false,
            volumes: BTreeSet::new(),
            labels: BTreeMap::new(),
        }
    }
}

/// When the runtime should pull a container image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImagePullPolicy {
    Always,
    Never,
    #[default]
    IfNotPresent,
}
