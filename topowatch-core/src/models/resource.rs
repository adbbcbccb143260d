use std::fmt;
use std::str::FromStr;

use crate::Error;

/// A watchable resource type, written as `resource.version.group`
///
/// `deployments.v1.apps`, `events.v1.events.k8s.io`, and `pods.v1.` for the
/// core group. Partially qualified forms are rejected since the version
/// cannot be guessed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceType {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl ResourceType {
    /// `group/version`, or just `version` for the core group
    #[must_use]
    pub fn group_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.resource, self.version, self.group)
    }
}

impl FromStr for ResourceType {
    type Err = Error;

    fn from_str(arg: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| Error::InvalidResource {
            arg: arg.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = arg.splitn(3, '.');
        let (Some(resource), Some(version), Some(group)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("expected resource.version.group"));
        };

        if resource.is_empty() || version.is_empty() {
            return Err(invalid("resource and version must be non-empty"));
        }

        Ok(Self {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
        })
    }
}
