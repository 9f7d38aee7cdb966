//! Magnetar Core - Fundamental types for the Magnetar scheduling pipeline
//!
//! This crate provides:
//! - Pod and Node type re-exports (k8s-openapi)
//! - Error types with miette diagnostics
//! - Identity helpers for pods and nodes
//! - Serialization helpers

pub mod error;
pub mod types;

// Re-export commonly used types
pub use error::{MagnetarError, Result};
pub use types::{node_name, PodRef};

// Re-export k8s-openapi types for convenience
pub use k8s_openapi;
pub use k8s_openapi::api::core::v1::{Node, Pod};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Serialize a resource to JSON
pub fn to_json<T: serde::Serialize>(resource: &T) -> Result<String> {
    serde_json::to_string(resource).map_err(|e| {
        MagnetarError::serialization_error(
            format!("Failed to serialize to JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Deserialize a resource from JSON
pub fn from_json<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<T> {
    serde_json::from_str(data).map_err(|e| {
        MagnetarError::serialization_error(
            format!("Failed to deserialize from JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Serialize a resource to YAML
pub fn to_yaml<T: serde::Serialize>(resource: &T) -> Result<String> {
    serde_yaml::to_string(resource).map_err(|e| {
        MagnetarError::serialization_error(
            format!("Failed to serialize to YAML: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Deserialize a resource from YAML
pub fn from_yaml<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<T> {
    serde_yaml::from_str(data).map_err(|e| {
        MagnetarError::serialization_error(
            format!("Failed to deserialize from YAML: {}", e),
            Some(Box::new(e)),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_serialization() {
        let mut pod = Pod::default();
        pod.metadata.name = Some("worker".to_string());

        let json = to_json(&pod).unwrap();
        assert!(json.contains("worker"));

        let deserialized: Pod = from_json(&json).unwrap();
        assert_eq!(deserialized.metadata.name, Some("worker".to_string()));
    }

    #[test]
    fn test_yaml_serialization() {
        let mut pod = Pod::default();
        pod.metadata.name = Some("worker".to_string());

        let yaml = to_yaml(&pod).unwrap();
        assert!(yaml.contains("worker"));

        let deserialized: Pod = from_yaml(&yaml).unwrap();
        assert_eq!(deserialized.metadata.name, Some("worker".to_string()));
    }
}
