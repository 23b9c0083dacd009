//! Shared types for kdev
//!
//! This crate contains data structures used across multiple kdev crates.

mod description;
mod error;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use description::{ContainerSummary, PodDescription, PortSummary, VolumeKind, VolumeSummary};
pub use error::{KdevError, Result};

// ============================================================================
// Cache Types
// ============================================================================

const CONTEXTS_KEY: &str = "contexts";
const NAMESPACES_PREFIX: &str = "ns";
const PODS_PREFIX: &str = "pods";
const KEY_SEPARATOR: &str = "::";

/// Scope of a cached listing
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// All contexts known to the tool
    Contexts,
    /// Namespaces of one context
    Namespaces { context: String },
    /// Pods of one context + namespace
    Pods { context: String, namespace: String },
}

impl CacheKey {
    pub fn namespaces(context: impl Into<String>) -> Self {
        Self::Namespaces {
            context: context.into(),
        }
    }

    pub fn pods(context: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::Pods {
            context: context.into(),
            namespace: namespace.into(),
        }
    }

    /// Short label for the kind of resource this key lists
    pub fn resource(&self) -> &'static str {
        match self {
            Self::Contexts => "contexts",
            Self::Namespaces { .. } => "namespaces",
            Self::Pods { .. } => "pods",
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contexts => f.write_str(CONTEXTS_KEY),
            Self::Namespaces { context } => {
                write!(f, "{NAMESPACES_PREFIX}{KEY_SEPARATOR}{context}")
            }
            Self::Pods { context, namespace } => write!(
                f,
                "{PODS_PREFIX}{KEY_SEPARATOR}{context}{KEY_SEPARATOR}{namespace}"
            ),
        }
    }
}

impl FromStr for CacheKey {
    type Err = KdevError;

    fn from_str(s: &str) -> Result<Self> {
        if s == CONTEXTS_KEY {
            return Ok(Self::Contexts);
        }

        let parts: Vec<&str> = s.split(KEY_SEPARATOR).collect();
        match parts.as_slice() {
            [NAMESPACES_PREFIX, context] if !context.is_empty() => Ok(Self::namespaces(*context)),
            [PODS_PREFIX, context, namespace] if !context.is_empty() && !namespace.is_empty() => {
                Ok(Self::pods(*context, *namespace))
            }
            _ => Err(KdevError::InvalidInput(format!("unrecognized cache key '{s}'"))),
        }
    }
}

/// A persisted listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Reserved for expiry; always written as 0
    #[serde(default, alias = "ts")]
    pub timestamp: u64,

    /// Identifiers returned by the most recent successful listing
    #[serde(default)]
    pub value: Vec<String>,
}

impl CacheEntry {
    pub fn new(value: Vec<String>) -> Self {
        Self {
            timestamp: 0,
            value,
        }
    }
}

// ============================================================================
// Pod Operation Types
// ============================================================================

/// Direction of a file copy between the host and a pod
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CopyDirection {
    /// Local file into the pod
    Upload,
    /// File in the pod to the local filesystem
    Download,
}

impl CopyDirection {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
        }
    }
}

/// A `local:remote` port pair for port forwarding
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortMapping {
    pub local: u16,
    pub remote: u16,
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.local, self.remote)
    }
}

impl FromStr for PortMapping {
    type Err = KdevError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || KdevError::InvalidInput(format!("expected local:remote ports, got '{s}'"));

        let (local, remote) = s.trim().split_once(':').ok_or_else(invalid)?;
        let local: u16 = local.trim().parse().map_err(|_| invalid())?;
        let remote: u16 = remote.trim().parse().map_err(|_| invalid())?;
        if local == 0 || remote == 0 {
            return Err(invalid());
        }

        Ok(Self { local, remote })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_format() {
        assert_eq!(CacheKey::Contexts.to_string(), "contexts");
        assert_eq!(CacheKey::namespaces("c1").to_string(), "ns::c1");
        assert_eq!(CacheKey::pods("c1", "n1").to_string(), "pods::c1::n1");
    }

    #[test]
    fn test_cache_key_parse() {
        assert_eq!("contexts".parse::<CacheKey>().unwrap(), CacheKey::Contexts);
        assert_eq!(
            "pods::prod::kube-system".parse::<CacheKey>().unwrap(),
            CacheKey::pods("prod", "kube-system")
        );
        assert!("pods::prod".parse::<CacheKey>().is_err());
        assert!("ns::".parse::<CacheKey>().is_err());
        assert!("bogus".parse::<CacheKey>().is_err());
    }

    #[test]
    fn test_cache_entry_accepts_short_timestamp() {
        let entry: CacheEntry = serde_json::from_str(r#"{"ts": 0, "value": ["a", "b"]}"#).unwrap();
        assert_eq!(entry, CacheEntry::new(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn test_port_mapping() {
        let mapping: PortMapping = "8080:80".parse().unwrap();
        assert_eq!(mapping, PortMapping { local: 8080, remote: 80 });
        assert_eq!(mapping.to_string(), "8080:80");

        assert!("8080".parse::<PortMapping>().is_err());
        assert!("0:80".parse::<PortMapping>().is_err());
        assert!("http:80".parse::<PortMapping>().is_err());
        assert!("70000:80".parse::<PortMapping>().is_err());
    }
}
