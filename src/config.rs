use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How a field path that names a missing dictionary key is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingKey {
    /// Render the missing value as empty text.
    #[default]
    Empty,
    /// Fail the render with an execution error.
    Error,
}

/// Per-document rendering options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Upper bound for one table range normalization pass.
    #[serde(with = "millis")]
    pub range_timeout: Duration,
    pub missing_key: MissingKey,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            range_timeout: Duration::from_millis(500),
            missing_key: MissingKey::Empty,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
