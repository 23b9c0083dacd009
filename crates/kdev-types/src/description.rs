//! Human-readable pod details

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Environment variables shown per container
const MAX_ENV_VARS: usize = 10;

/// Annotations shown per pod
const MAX_ANNOTATIONS: usize = 5;

const NOT_AVAILABLE: &str = "N/A";

/// Summary of a single pod, built from its full document
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PodDescription {
    pub name: String,
    pub namespace: String,
    pub created: Option<DateTime<Utc>>,
    pub phase: Option<String>,
    pub host_ip: Option<String>,
    pub pod_ip: Option<String>,
    pub containers: Vec<ContainerSummary>,
    pub volumes: Vec<VolumeSummary>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContainerSummary {
    pub name: String,
    pub image: Option<String>,
    pub ports: Vec<PortSummary>,
    /// Name/value pairs; values injected from references read `[from reference]`
    pub env: Vec<(String, String)>,
    pub limits: BTreeMap<String, String>,
    pub requests: BTreeMap<String, String>,
}

impl ContainerSummary {
    pub fn new(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    /// Tag part of the image reference, if it carries one
    pub fn image_tag(&self) -> Option<&str> {
        let image = self.image.as_deref()?;
        let (_, tag) = image.rsplit_once(':')?;
        // "registry:5000/app" has a port, not a tag
        if tag.contains('/') || tag.is_empty() {
            None
        } else {
            Some(tag)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortSummary {
    pub container_port: i32,
    pub protocol: String,
    pub name: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VolumeKind {
    PersistentVolumeClaim,
    ConfigMap,
    Secret,
    EmptyDir,
    HostPath,
    Other,
}

impl VolumeKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::PersistentVolumeClaim => "PersistentVolumeClaim",
            Self::ConfigMap => "ConfigMap",
            Self::Secret => "Secret",
            Self::EmptyDir => "EmptyDir",
            Self::HostPath => "HostPath",
            Self::Other => "Other",
        }
    }

    /// Label for the object the volume points at
    fn source_label(&self) -> Option<&'static str> {
        match self {
            Self::PersistentVolumeClaim => Some("PVC name"),
            Self::ConfigMap => Some("ConfigMap name"),
            Self::Secret => Some("Secret name"),
            Self::HostPath => Some("Host path"),
            Self::EmptyDir | Self::Other => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeSummary {
    pub name: String,
    pub kind: VolumeKind,
    /// Claim, config map, secret name or host path
    pub source: Option<String>,
}

fn or_na(value: Option<&str>) -> &str {
    value.unwrap_or(NOT_AVAILABLE)
}

impl PodDescription {
    /// Render a sectioned plain-text report
    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.write_report(&mut out);
        out
    }

    fn write_report(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "=== Pod ===")?;
        writeln!(out, "Name: {}", self.name)?;
        writeln!(out, "Namespace: {}", self.namespace)?;
        let created = self.created.map(|t| t.to_rfc3339());
        writeln!(out, "Created: {}", or_na(created.as_deref()))?;
        writeln!(out, "Phase: {}", or_na(self.phase.as_deref()))?;
        writeln!(out, "Node: {}", or_na(self.host_ip.as_deref()))?;
        writeln!(out, "Pod IP: {}", or_na(self.pod_ip.as_deref()))?;

        writeln!(out, "\n=== Containers ===")?;
        for (i, container) in self.containers.iter().enumerate() {
            write_container(out, i + 1, container)?;
        }

        if !self.volumes.is_empty() {
            writeln!(out, "\n=== Volumes ===")?;
            for volume in &self.volumes {
                writeln!(out, "\nVolume: {}", volume.name)?;
                writeln!(out, "  Type: {}", volume.kind.label())?;
                if let Some(label) = volume.kind.source_label() {
                    writeln!(out, "  {}: {}", label, or_na(volume.source.as_deref()))?;
                }
            }
        }

        if !self.labels.is_empty() {
            writeln!(out, "\n=== Labels ===")?;
            for (key, value) in &self.labels {
                writeln!(out, "{key}: {value}")?;
            }
        }

        if !self.annotations.is_empty() {
            writeln!(out, "\n=== Annotations ===")?;
            for (key, value) in self.annotations.iter().take(MAX_ANNOTATIONS) {
                writeln!(out, "{key}: {value}")?;
            }
            if self.annotations.len() > MAX_ANNOTATIONS {
                writeln!(
                    out,
                    "... {} more annotations",
                    self.annotations.len() - MAX_ANNOTATIONS
                )?;
            }
        }

        Ok(())
    }
}

fn write_container(out: &mut String, index: usize, c: &ContainerSummary) -> std::fmt::Result {
    writeln!(out, "\n--- Container {}: {} ---", index, c.name)?;
    writeln!(out, "  Image: {}", or_na(c.image.as_deref()))?;
    if let Some(tag) = c.image_tag() {
        writeln!(out, "  Image tag: {tag}")?;
    }

    if c.ports.is_empty() {
        writeln!(out, "  Ports: none exposed")?;
    } else {
        writeln!(out, "  Ports:")?;
        for port in &c.ports {
            writeln!(
                out,
                "    - {}/{} {}",
                port.container_port,
                port.protocol,
                port.name.as_deref().unwrap_or_default()
            )?;
        }
    }

    if !c.env.is_empty() {
        writeln!(out, "  Environment:")?;
        for (name, value) in c.env.iter().take(MAX_ENV_VARS) {
            writeln!(out, "    - {name}={value}")?;
        }
        if c.env.len() > MAX_ENV_VARS {
            writeln!(
                out,
                "    ... {} more environment variables",
                c.env.len() - MAX_ENV_VARS
            )?;
        }
    }

    if !c.limits.is_empty() || !c.requests.is_empty() {
        writeln!(out, "  Resources:")?;
        for (heading, values) in [("Limits", &c.limits), ("Requests", &c.requests)] {
            if values.is_empty() {
                continue;
            }
            writeln!(out, "    {heading}:")?;
            for (key, value) in values {
                writeln!(out, "      {key}: {value}")?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PodDescription {
        let mut container = ContainerSummary::new("web".into());
        container.image = Some("nginx:1.27".into());
        container.ports.push(PortSummary {
            container_port: 80,
            protocol: "TCP".into(),
            name: Some("http".into()),
        });
        container.env = (0..12)
            .map(|i| (format!("VAR{i}"), format!("v{i}")))
            .collect();
        container.limits.insert("cpu".into(), "500m".into());

        PodDescription {
            name: "web-1".into(),
            namespace: "default".into(),
            phase: Some("Running".into()),
            containers: vec![container],
            volumes: vec![VolumeSummary {
                name: "data".into(),
                kind: VolumeKind::PersistentVolumeClaim,
                source: Some("data-claim".into()),
            }],
            annotations: (0..7).map(|i| (format!("a{i}"), "x".into())).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_image_tag() {
        let mut c = ContainerSummary::new("c".into());
        assert_eq!(c.image_tag(), None);
        c.image = Some("nginx:1.27".into());
        assert_eq!(c.image_tag(), Some("1.27"));
        c.image = Some("registry:5000/app".into());
        assert_eq!(c.image_tag(), None);
    }

    #[test]
    fn test_render_report() {
        let report = sample().render();

        assert!(report.contains("Name: web-1"));
        assert!(report.contains("Created: N/A"));
        assert!(report.contains("Image tag: 1.27"));
        assert!(report.contains("- 80/TCP http"));
        assert!(report.contains("VAR9=v9"));
        assert!(!report.contains("VAR10="));
        assert!(report.contains("... 2 more environment variables"));
        assert!(report.contains("cpu: 500m"));
        assert!(report.contains("PVC name: data-claim"));
        assert!(report.contains("... 2 more annotations"));
    }
}
