//! Core identifier types for the virtual directory engine.

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// NodeId: process-unique, stable identifier assigned to a node at creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Mint a fresh random id.
    pub fn generate() -> Self {
        NodeId(random_opaque(16))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

/// ShareToken: opaque capability granting read-only access to a folder subtree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShareToken(String);

impl ShareToken {
    /// Mint a fresh token. Tokens are never derived from node ids.
    pub fn generate() -> Self {
        ShareToken(random_opaque(32))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShareToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShareToken {
    fn from(s: &str) -> Self {
        ShareToken(s.to_string())
    }
}

/// Random alphanumeric string from the OS entropy source.
fn random_opaque(len: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
