// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Handles service names, cluster names and image refs.

use serde::Deserialize;

use crate::types::{ClusterName, ImageRef, ServiceName};

pub fn deserialize_service_name<'de, D>(deserializer: D) -> Result<ServiceName, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    ServiceName::new(&s).map_err(serde::de::Error::custom)
}

pub fn deserialize_cluster_name<'de, D>(deserializer: D) -> Result<ClusterName, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    ClusterName::new(&s).map_err(serde::de::Error::custom)
}

pub fn deserialize_cluster_name_option<'de, D>(
    deserializer: D,
) -> Result<Option<ClusterName>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|s| ClusterName::new(&s).map_err(serde::de::Error::custom))
        .transpose()
}

pub fn deserialize_image_ref<'de, D>(deserializer: D) -> Result<ImageRef, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    ImageRef::parse(&s).map_err(|e| serde::de::Error::custom(format!("image: {}", e)))
}
