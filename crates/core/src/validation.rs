//! Configuration validation support

use config::ConfigError;
use serde::{Deserialize, Serialize};

/// Trait for validating configuration values
pub trait ValidateConfig: Serialize + for<'de> Deserialize<'de> {
    /// Validate the configuration
    ///
    /// Returns Ok(()) if valid, or an error describing what's wrong
    fn validate(&self) -> Result<(), ConfigError>;

    /// Validate after overriding one dotted path with `value`.
    fn validate_path(&self, path: &str, value: &serde_json::Value) -> Result<(), ConfigError> {
        self.with_path_update(path, value).map(drop)
    }

    /// Copy of the configuration with one dotted path set to `value`.
    ///
    /// The default implementation serializes the current config, applies the
    /// override, deserializes and validates the result.
    fn with_path_update(&self, path: &str, value: &serde_json::Value) -> Result<Self, ConfigError> {
        let mut current_value = serde_json::to_value(self)
            .map_err(|e| ConfigError::Message(format!("Failed to serialize config: {e}")))?;

        if path.is_empty() {
            current_value = value.clone();
        } else {
            apply_path_update(&mut current_value, path, value.clone())?;
        }

        let updated: Self = serde_json::from_value(current_value)
            .map_err(|e| ConfigError::Message(format!("Invalid config after update: {e}")))?;

        updated.validate()?;
        Ok(updated)
    }
}

fn apply_path_update(
    target: &mut serde_json::Value,
    path: &str,
    value: serde_json::Value,
) -> Result<(), ConfigError> {
    let segments: Vec<&str> = path.split('.').collect();
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| ConfigError::Message("empty path".into()))?;

    let mut current = target;
    for (i, segment) in parents.iter().enumerate() {
        current = current
            .as_object_mut()
            .and_then(|obj| obj.get_mut(*segment))
            .ok_or_else(|| {
                ConfigError::Message(format!("Path '{}' not found", segments[..=i].join(".")))
            })?;
    }

    let obj = current.as_object_mut().ok_or_else(|| {
        ConfigError::Message(format!(
            "Cannot set '{last}' on non-object at path '{}'",
            parents.join(".")
        ))
    })?;
    obj.insert((*last).to_string(), value);
    Ok(())
}

/// Common validation helpers
pub mod validators {
    use config::ConfigError;

    /// Validate that a string is not empty
    pub fn validate_not_empty(value: &str, field: &str) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::Message(format!("{field}: cannot be empty")));
        }
        Ok(())
    }

    /// Validate URL format
    pub fn validate_url(url: &str, field: &str) -> Result<(), ConfigError> {
        url::Url::parse(url)
            .map_err(|e| ConfigError::Message(format!("{field}: invalid URL - {e}")))?;
        Ok(())
    }

    /// Validate that a value is within range
    pub fn validate_range<T: PartialOrd + std::fmt::Display>(
        value: T,
        min: T,
        max: T,
        field: &str,
    ) -> Result<(), ConfigError> {
        if value < min || value > max {
            return Err(ConfigError::Message(format!(
                "{field}: must be between {min} and {max}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::validators::*;
    use super::*;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize)]
    struct Sample {
        name: String,
        limits: Limits,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Limits {
        retries: u32,
    }

    impl ValidateConfig for Sample {
        fn validate(&self) -> Result<(), ConfigError> {
            validate_not_empty(&self.name, "name")?;
            validate_range(self.limits.retries, 1, 10, "limits.retries")
        }
    }

    #[test]
    fn test_validators() {
        assert!(validate_not_empty("  ", "field").is_err());
        assert!(validate_url("http://127.0.0.1:8000/api", "url").is_ok());
        assert!(validate_url("not a url", "url").is_err());
        assert!(validate_range(0, 1, 3, "n").is_err());
    }

    #[test]
    fn test_validate_path_applies_override() {
        let sample = Sample {
            name: "console".into(),
            limits: Limits { retries: 3 },
        };
        assert!(sample.validate_path("limits.retries", &json!(5)).is_ok());
        assert!(sample.validate_path("limits.retries", &json!(0)).is_err());
        assert!(sample.validate_path("missing.retries", &json!(1)).is_err());
    }

    #[test]
    fn test_with_path_update_returns_updated_copy() {
        let sample = Sample {
            name: "console".into(),
            limits: Limits { retries: 3 },
        };
        let updated = sample.with_path_update("limits.retries", &json!(7)).unwrap();
        assert_eq!(updated.limits.retries, 7);
        assert_eq!(sample.limits.retries, 3);
        assert!(sample.with_path_update("name", &json!("")).is_err());
    }
}
