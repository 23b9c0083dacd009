//! Turning kubectl stdout into kdev types

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, Pod, Volume};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

use kdev_types::{
    ContainerSummary, KdevError, PodDescription, PortSummary, Result, VolumeKind, VolumeSummary,
};

const FROM_REFERENCE: &str = "[from reference]";
const DEFAULT_PROTOCOL: &str = "TCP";

/// `kubectl get <kind> -o json` list document, reduced to item metadata
#[derive(Deserialize)]
struct ItemList {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Deserialize)]
struct Item {
    metadata: ObjectMeta,
}

/// Newline-separated identifiers, blank lines dropped
pub fn parse_names(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Names of every item in a list document
pub fn parse_item_names(stdout: &str) -> Result<Vec<String>> {
    let list: ItemList = serde_json::from_str(stdout)?;
    list.items
        .into_iter()
        .map(|item| {
            item.metadata
                .name
                .ok_or_else(|| KdevError::Parse("list item without metadata.name".into()))
        })
        .collect()
}

pub fn parse_pod(stdout: &str) -> Result<Pod> {
    Ok(serde_json::from_str(stdout)?)
}

/// Names of the pod's regular containers
pub fn container_names(pod: &Pod) -> Vec<String> {
    pod.spec
        .as_ref()
        .map(|spec| spec.containers.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default()
}

/// Build the report model for a pod document
pub fn describe(pod: &Pod) -> PodDescription {
    let meta = &pod.metadata;
    let status = pod.status.as_ref();
    let spec = pod.spec.as_ref();

    PodDescription {
        name: meta.name.clone().unwrap_or_default(),
        namespace: meta.namespace.clone().unwrap_or_default(),
        created: meta.creation_timestamp.as_ref().map(|t| t.0),
        phase: status.and_then(|s| s.phase.clone()),
        host_ip: status.and_then(|s| s.host_ip.clone()),
        pod_ip: status.and_then(|s| s.pod_ip.clone()),
        containers: spec
            .map(|s| s.containers.iter().map(summarize_container).collect())
            .unwrap_or_default(),
        volumes: spec
            .and_then(|s| s.volumes.as_ref())
            .map(|volumes| volumes.iter().map(summarize_volume).collect())
            .unwrap_or_default(),
        labels: meta.labels.clone().unwrap_or_default(),
        annotations: meta.annotations.clone().unwrap_or_default(),
    }
}

fn summarize_container(container: &Container) -> ContainerSummary {
    let mut summary = ContainerSummary::new(container.name.clone());
    summary.image = container.image.clone();

    summary.ports = container
        .ports
        .iter()
        .flatten()
        .map(|p| PortSummary {
            container_port: p.container_port,
            protocol: p.protocol.clone().unwrap_or_else(|| DEFAULT_PROTOCOL.to_string()),
            name: p.name.clone(),
        })
        .collect();

    summary.env = container
        .env
        .iter()
        .flatten()
        .map(|var| {
            let value = match (&var.value, &var.value_from) {
                (Some(value), _) if !value.is_empty() => value.clone(),
                (_, Some(_)) => FROM_REFERENCE.to_string(),
                _ => String::new(),
            };
            (var.name.clone(), value)
        })
        .collect();

    if let Some(resources) = &container.resources {
        summary.limits = quantities(resources.limits.as_ref());
        summary.requests = quantities(resources.requests.as_ref());
    }

    summary
}

fn quantities(map: Option<&BTreeMap<String, Quantity>>) -> BTreeMap<String, String> {
    map.into_iter()
        .flatten()
        .map(|(k, q)| (k.clone(), q.0.clone()))
        .collect()
}

fn summarize_volume(volume: &Volume) -> VolumeSummary {
    let (kind, source) = if let Some(pvc) = &volume.persistent_volume_claim {
        (VolumeKind::PersistentVolumeClaim, Some(pvc.claim_name.clone()))
    } else if let Some(cm) = &volume.config_map {
        (VolumeKind::ConfigMap, referenced_name(cm))
    } else if let Some(secret) = &volume.secret {
        (VolumeKind::Secret, secret.secret_name.clone())
    } else if volume.empty_dir.is_some() {
        (VolumeKind::EmptyDir, None)
    } else if let Some(host_path) = &volume.host_path {
        (VolumeKind::HostPath, Some(host_path.path.clone()))
    } else {
        (VolumeKind::Other, None)
    };

    VolumeSummary {
        name: volume.name.clone(),
        kind,
        source,
    }
}

/// The `name` field of a volume source, read through its serialized form
fn referenced_name<T: Serialize>(source: &T) -> Option<String> {
    serde_json::to_value(source)
        .ok()?
        .get("name")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PODS_JSON: &str = r#"{
        "apiVersion": "v1",
        "kind": "List",
        "items": [
            {"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "web-1"}},
            {"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "web-2"}}
        ]
    }"#;

    const POD_JSON: &str = r#"{
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": "web-1",
            "namespace": "shop",
            "creationTimestamp": "2024-05-01T10:00:00Z",
            "labels": {"app": "web"}
        },
        "spec": {
            "containers": [
                {
                    "name": "app",
                    "image": "shop/web:2.1.0",
                    "ports": [{"containerPort": 8080, "name": "http"}],
                    "env": [
                        {"name": "MODE", "value": "prod"},
                        {"name": "TOKEN", "valueFrom": {"secretKeyRef": {"name": "s", "key": "t"}}}
                    ],
                    "resources": {"limits": {"memory": "256Mi"}, "requests": {"cpu": "100m"}}
                },
                {"name": "sidecar", "image": "envoy"}
            ],
            "volumes": [
                {"name": "cfg", "configMap": {"name": "web-config"}},
                {"name": "scratch", "emptyDir": {}},
                {"name": "creds", "secret": {"secretName": "web-creds"}}
            ]
        },
        "status": {"phase": "Running", "hostIP": "10.0.0.5", "podIP": "10.1.2.3"}
    }"#;

    #[test]
    fn test_parse_names() {
        assert_eq!(parse_names("c1\n\n  c2 \n"), vec!["c1", "c2"]);
        assert!(parse_names("").is_empty());
    }

    #[test]
    fn test_parse_item_names() {
        assert_eq!(parse_item_names(PODS_JSON).unwrap(), vec!["web-1", "web-2"]);
        assert_eq!(parse_item_names(r#"{"items": []}"#).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_parse_item_names_rejects_garbage() {
        assert!(matches!(parse_item_names("not json"), Err(KdevError::Parse(_))));
        assert!(matches!(
            parse_item_names(r#"{"items": [{"metadata": {}}]}"#),
            Err(KdevError::Parse(_))
        ));
    }

    #[test]
    fn test_container_names() {
        let pod = parse_pod(POD_JSON).unwrap();
        assert_eq!(container_names(&pod), vec!["app", "sidecar"]);
    }

    #[test]
    fn test_describe() {
        let pod = parse_pod(POD_JSON).unwrap();
        let description = describe(&pod);

        assert_eq!(description.name, "web-1");
        assert_eq!(description.namespace, "shop");
        assert_eq!(description.phase.as_deref(), Some("Running"));
        assert_eq!(description.pod_ip.as_deref(), Some("10.1.2.3"));
        assert!(description.created.is_some());

        let app = &description.containers[0];
        assert_eq!(app.image_tag(), Some("2.1.0"));
        assert_eq!(app.ports[0].protocol, "TCP");
        assert_eq!(
            app.env,
            vec![
                ("MODE".to_string(), "prod".to_string()),
                ("TOKEN".to_string(), FROM_REFERENCE.to_string()),
            ]
        );
        assert_eq!(app.limits.get("memory").map(String::as_str), Some("256Mi"));
        assert_eq!(app.requests.get("cpu").map(String::as_str), Some("100m"));

        let kinds: Vec<_> = description.volumes.iter().map(|v| (v.kind, v.source.clone())).collect();
        assert_eq!(
            kinds,
            vec![
                (VolumeKind::ConfigMap, Some("web-config".to_string())),
                (VolumeKind::EmptyDir, None),
                (VolumeKind::Secret, Some("web-creds".to_string())),
            ]
        );
    }
}
