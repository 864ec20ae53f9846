use fsorm_error::Result;
use serde::{Deserialize, Serialize};

/// Tuning knobs for a [`RecordCache`](crate::RecordCache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackingConfig {
    /// Number of records the cache index pre-allocates room for.
    pub initial_capacity: usize,
    /// Checkpoint every record the cache creates, so a freshly tracked
    /// object reports no changes until it is modified.
    pub checkpoint_on_create: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 64,
            checkpoint_on_create: false,
        }
    }
}

impl TrackingConfig {
    /// Parse a JSON document; missing keys take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use fsorm_error::{ErrorKind, OrmError};

    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrackingConfig::default();
        assert_eq!(config.initial_capacity, 64);
        assert!(!config.checkpoint_on_create);
        assert_eq!(TrackingConfig::from_json("{}").unwrap(), config);
    }

    #[test]
    fn test_partial_document() {
        let config = TrackingConfig::from_json(r#"{"checkpoint_on_create": true}"#).unwrap();
        assert!(config.checkpoint_on_create);
        assert_eq!(config.initial_capacity, 64);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = TrackingConfig::from_json(r#"{"capacity": 8}"#).unwrap_err();
        assert!(matches!(err, OrmError::Config(_)));
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_serialize_round_trip() {
        let config = TrackingConfig {
            initial_capacity: 8,
            checkpoint_on_create: true,
        };
        let text = serde_json::to_string(&config).unwrap();
        assert_eq!(TrackingConfig::from_json(&text).unwrap(), config);
    }
}
