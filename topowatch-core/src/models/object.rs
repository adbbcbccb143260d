//! Watched objects and their owner references
//!
//! Objects arrive from upstream as shared unstructured JSON documents. The
//! typed view here parses the handful of fields the pipeline needs and keeps
//! the original document behind an `Arc` so it is never copied or mutated.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::{Error, Result};

/// Unstructured object document as delivered by a subscription.
///
/// The same instance may be held by other observers of the subscription, so
/// it is only ever read.
pub type RawObject = Arc<Value>;

/// Typed pointer-by-name from an object to a putative parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<bool>,
}

impl OwnerReference {
    #[must_use]
    pub fn new(api_version: impl Into<String>, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            name: name.into(),
            uid: String::new(),
            controller: None,
        }
    }

    /// Key used to compare references across object versions.
    ///
    /// References carry no reliable UID, so two references are the same
    /// reference when apiVersion, kind and name all match.
    #[must_use]
    pub fn unique_key(&self) -> String {
        format!("{}/{}/{}", self.api_version, self.kind, self.name)
    }
}

impl fmt::Display for OwnerReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.api_version, self.kind, self.name)
    }
}

/// Split an apiVersion into `(group, version)`; the core group is `""`.
#[must_use]
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    api_version
        .rsplit_once('/')
        .unwrap_or(("", api_version))
}

/// Globally unique identity of a live object
///
/// Rendered as `group/version/kind/namespace/name`. Cluster-scoped objects have
/// an empty namespace segment; the kind segment keeps them from colliding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    #[must_use]
    pub fn new(
        api_version: &str,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let (group, version) = split_api_version(api_version);
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of the object an owner reference points at, assuming the owner
    /// lives in `namespace` (empty for cluster-scoped owners).
    #[must_use]
    pub fn for_owner(reference: &OwnerReference, namespace: &str) -> Self {
        Self::new(&reference.api_version, reference.kind.clone(), namespace, reference.name.clone())
    }

    #[must_use]
    pub fn is_cluster_scoped(&self) -> bool {
        self.namespace.is_empty()
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.group, self.version, self.kind, self.namespace, self.name
        )
    }
}

impl FromStr for ObjectKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        let [group, version, kind, namespace, name] = parts.as_slice() else {
            return Err(Error::InvalidKey(format!(
                "expected 5 '/'-separated segments, got {}: {s}",
                parts.len()
            )));
        };

        if version.is_empty() || kind.is_empty() || name.is_empty() {
            return Err(Error::InvalidKey(format!(
                "version, kind and name must be non-empty: {s}"
            )));
        }

        Ok(Self {
            group: (*group).to_string(),
            version: (*version).to_string(),
            kind: (*kind).to_string(),
            namespace: (*namespace).to_string(),
            name: (*name).to_string(),
        })
    }
}

/// Read-only typed view over an unstructured object document
#[derive(Debug, Clone)]
pub struct WatchedObject {
    api_version: String,
    kind: String,
    name: String,
    namespace: Option<String>,
    owner_references: Vec<OwnerReference>,
    body: RawObject,
}

impl WatchedObject {
    /// Parse the identity and owner references out of a raw document.
    ///
    /// Fails when the document is not an object or lacks `apiVersion`, `kind`
    /// or `metadata.name`.
    pub fn from_raw(body: RawObject) -> Result<Self> {
        let root = body
            .as_object()
            .ok_or_else(|| Error::InvalidObject("document is not a JSON object".to_string()))?;

        let api_version = required_str(root, "apiVersion")?;
        let kind = required_str(root, "kind")?;

        let metadata = root
            .get("metadata")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::InvalidObject(format!("{kind} has no metadata")))?;
        let name = required_str(metadata, "name")
            .map_err(|_| Error::InvalidObject(format!("{kind} has no metadata.name")))?;
        let namespace = metadata
            .get("namespace")
            .and_then(Value::as_str)
            .filter(|ns| !ns.is_empty())
            .map(str::to_string);

        let owner_references = match metadata.get("ownerReferences") {
            None | Some(Value::Null) => Vec::new(),
            Some(refs) => Vec::<OwnerReference>::deserialize(refs)?,
        };

        Ok(Self {
            api_version,
            kind,
            name,
            namespace,
            owner_references,
            body,
        })
    }

    /// Convenience for owned documents.
    pub fn from_value(value: Value) -> Result<Self> {
        Self::from_raw(Arc::new(value))
    }

    #[must_use]
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    #[must_use]
    pub fn group(&self) -> &str {
        split_api_version(&self.api_version).0
    }

    #[must_use]
    pub fn version(&self) -> &str {
        split_api_version(&self.api_version).1
    }

    #[must_use]
    pub fn owner_references(&self) -> &[OwnerReference] {
        &self.owner_references
    }

    /// The untouched upstream document
    #[must_use]
    pub fn body(&self) -> &RawObject {
        &self.body
    }

    #[must_use]
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(
            &self.api_version,
            self.kind.clone(),
            self.namespace.clone().unwrap_or_default(),
            self.name.clone(),
        )
    }
}

fn required_str(map: &Map<String, Value>, field: &str) -> Result<String> {
    map.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidObject(format!("missing field {field}")))
}
