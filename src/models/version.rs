//! # models::version
//!
//! Resource versions reported by the backend's freshness endpoint.
//!
//! A token is a file mtime, a counter or any other scalar the backend picks.
//! The core never interprets it; two tokens are only ever compared for
//! equality.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque version marker for one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(pub Value);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceVersion {
    pub resource_key: String,
    pub token:        VersionToken,
}

/// Wire shape of the resource-version endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct VersionsPayload {
    #[serde(default)]
    pub versions: HashMap<String, Value>,
}

impl VersionsPayload {
    /// Null tokens are treated as "resource unknown" and dropped.
    pub fn into_versions(self) -> Vec<ResourceVersion> {
        self.versions
            .into_iter()
            .filter(|(_, token)| !token.is_null())
            .map(|(resource_key, token)| ResourceVersion {
                resource_key,
                token: VersionToken(token),
            })
            .collect()
    }
}
