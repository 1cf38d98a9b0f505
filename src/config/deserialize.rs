// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Handles service names, image refs, and the promotion order.

use nonempty::NonEmpty;
use serde::Deserialize;

use crate::types::{EnvironmentName, ImageRef, ServiceName};

pub fn deserialize_service_name<'de, D>(deserializer: D) -> Result<ServiceName, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    ServiceName::new(&s).map_err(serde::de::Error::custom)
}

pub fn deserialize_image_ref<'de, D>(deserializer: D) -> Result<ImageRef, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    ImageRef::parse(&s).map_err(serde::de::Error::custom)
}

pub fn deserialize_promotion_order<'de, D>(
    deserializer: D,
) -> Result<Option<NonEmpty<EnvironmentName>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<EnvironmentName> = Vec::deserialize(deserializer)?;

    for (i, env) in values.iter().enumerate() {
        if values[..i].contains(env) {
            return Err(serde::de::Error::custom(format!(
                "environment '{}' appears more than once in promotion order",
                env
            )));
        }
    }

    NonEmpty::from_vec(values)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom("promotion order cannot be empty"))
}
