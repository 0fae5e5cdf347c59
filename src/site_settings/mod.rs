//! Site settings registry
//!
//! Admin-configurable named values with static defaults. The schema (key,
//! default, label, tooltip, kind) is immutable and built once at startup; an
//! admin can persist overrides through [`SettingsRegistry::set`], which
//! validates against the declared kind before writing. Reads fall back to the
//! static default when no override exists. The registry is a constructed
//! dependency: it is cloned into the services that need it, never reached
//! through a global.

use serde::Serialize;
use std::sync::Arc;

use crate::config::Config;
use crate::database::Database;
use crate::database::repositories::SiteSettingRepository;
use crate::errors::SettingsError;
use crate::utils::human_size::parse_byte_size;

pub const DOMAIN: &str = "domain";
pub const MAX_FILE_SIZE: &str = "max_file_size";
pub const DEFAULT_EXPIRY_OFFSET: &str = "default_expiry_offset";
pub const MAX_EXPIRY_OFFSET: &str = "max_expiry_offset";

/// Value kind a setting is validated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SettingKind {
    /// Free-form text
    Text,
    /// Size with unit, e.g. "5120MB"
    ByteSize,
    /// Non-negative whole hours
    IntegerHours,
}

/// One entry of the static settings schema
#[derive(Debug, Clone, Serialize)]
pub struct SettingEntry {
    pub key: &'static str,
    pub label: &'static str,
    pub tooltip: &'static str,
    pub kind: SettingKind,
    pub default: String,
}

/// A schema entry together with its effective value, for the settings UI
#[derive(Debug, Clone, Serialize)]
pub struct SettingView {
    pub key: &'static str,
    pub label: &'static str,
    pub tooltip: &'static str,
    pub kind: SettingKind,
    pub default: String,
    pub value: String,
}

fn schema(config: &Config) -> Vec<SettingEntry> {
    vec![
        SettingEntry {
            key: DOMAIN,
            label: "Full Domain",
            tooltip: "Prepended to the download URL. Include the protocol (e.g. https://) \
                      and the port if it is not standard.",
            kind: SettingKind::Text,
            default: config.site.full_domain.clone(),
        },
        SettingEntry {
            key: MAX_FILE_SIZE,
            label: "Maximum File Size",
            tooltip: "A number followed by either KB for kilobytes or MB for megabytes.",
            kind: SettingKind::ByteSize,
            default: "5120MB".to_string(), // 5GB
        },
        SettingEntry {
            key: DEFAULT_EXPIRY_OFFSET,
            label: "Default Expiry Offset (hours)",
            tooltip: "Applied when an upload does not request an explicit expiry.",
            kind: SettingKind::IntegerHours,
            default: (24 * 14).to_string(), // 2 weeks
        },
        SettingEntry {
            key: MAX_EXPIRY_OFFSET,
            label: "Maximum Expiry Offset (hours)",
            tooltip: "Upper bound on any expiry offset; longer requests are capped to it.",
            kind: SettingKind::IntegerHours,
            default: (24 * 365 * 5).to_string(), // 5 years
        },
    ]
}

#[derive(Clone)]
pub struct SettingsRegistry {
    entries: Arc<Vec<SettingEntry>>,
    repo: SiteSettingRepository,
}

impl SettingsRegistry {
    pub fn new(config: &Config, database: &Database) -> Self {
        Self {
            entries: Arc::new(schema(config)),
            repo: SiteSettingRepository::new(database.connection()),
        }
    }

    /// Schema entry for `key`; unknown keys are a programmer error.
    pub fn describe(&self, key: &str) -> Result<&SettingEntry, SettingsError> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .ok_or_else(|| SettingsError::unknown_key(key))
    }

    /// Effective value: the persisted override if present, else the default.
    pub async fn get(&self, key: &str) -> Result<String, SettingsError> {
        let entry = self.describe(key)?;
        let override_value = self.repo.get(entry.key).await?;
        Ok(override_value.unwrap_or_else(|| entry.default.clone()))
    }

    /// Validate `value` against the entry's kind and persist it as the new
    /// override. On validation failure nothing is written, so the prior value
    /// keeps being served.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        let entry = self.describe(key)?;
        let value = value.trim();
        self.validate(entry, value).await?;
        self.repo.upsert(entry.key, value).await?;
        Ok(())
    }

    async fn validate(&self, entry: &SettingEntry, value: &str) -> Result<(), SettingsError> {
        match entry.kind {
            SettingKind::Text => {
                if value.is_empty() {
                    return Err(SettingsError::invalid_value(entry.key, "must not be empty"));
                }
                if entry.key == DOMAIN && value.contains("://") {
                    url::Url::parse(value).map_err(|e| {
                        SettingsError::invalid_value(entry.key, format!("invalid URL: {e}"))
                    })?;
                }
            }
            SettingKind::ByteSize => {
                parse_byte_size(value)
                    .map_err(|e| SettingsError::invalid_value(entry.key, e))?;
            }
            SettingKind::IntegerHours => {
                let hours: i64 = value.parse().map_err(|_| {
                    SettingsError::invalid_value(entry.key, "must be a whole number of hours")
                })?;
                if hours < 0 {
                    return Err(SettingsError::invalid_value(entry.key, "must not be negative"));
                }
                // The default offset must stay within the maximum, whichever
                // side of the pair is being edited.
                if entry.key == DEFAULT_EXPIRY_OFFSET {
                    let max = self.get_hours(MAX_EXPIRY_OFFSET).await?;
                    if hours > max {
                        return Err(SettingsError::invalid_value(
                            entry.key,
                            format!("must not exceed {MAX_EXPIRY_OFFSET} ({max} hours)"),
                        ));
                    }
                } else if entry.key == MAX_EXPIRY_OFFSET {
                    let default = self.get_hours(DEFAULT_EXPIRY_OFFSET).await?;
                    if hours < default {
                        return Err(SettingsError::invalid_value(
                            entry.key,
                            format!("must not drop below {DEFAULT_EXPIRY_OFFSET} ({default} hours)"),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Effective value of an hours-kind setting.
    pub async fn get_hours(&self, key: &str) -> Result<i64, SettingsError> {
        let raw = self.get(key).await?;
        raw.parse().map_err(|_| {
            SettingsError::invalid_value(key, format!("stored value '{raw}' is not a number"))
        })
    }

    pub async fn max_file_size_bytes(&self) -> Result<u64, SettingsError> {
        let raw = self.get(MAX_FILE_SIZE).await?;
        parse_byte_size(&raw).map_err(|e| SettingsError::invalid_value(MAX_FILE_SIZE, e))
    }

    pub async fn default_expiry_offset(&self) -> Result<chrono::Duration, SettingsError> {
        Ok(chrono::Duration::hours(
            self.get_hours(DEFAULT_EXPIRY_OFFSET).await?,
        ))
    }

    pub async fn max_expiry_offset(&self) -> Result<chrono::Duration, SettingsError> {
        Ok(chrono::Duration::hours(
            self.get_hours(MAX_EXPIRY_OFFSET).await?,
        ))
    }

    /// Every entry with its effective value, in schema order.
    pub async fn list(&self) -> Result<Vec<SettingView>, SettingsError> {
        let mut views = Vec::with_capacity(self.entries.len());
        for entry in self.entries.iter() {
            let value = self.get(entry.key).await?;
            views.push(SettingView {
                key: entry.key,
                label: entry.label,
                tooltip: entry.tooltip,
                kind: entry.kind,
                default: entry.default.clone(),
                value,
            });
        }
        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registry() -> SettingsRegistry {
        let database = Database::connect_with_url("sqlite::memory:", 1)
            .await
            .unwrap();
        database.migrate().await.unwrap();
        SettingsRegistry::new(&Config::default(), &database)
    }

    #[tokio::test]
    async fn defaults_apply_before_any_override() {
        let registry = registry().await;
        assert_eq!(registry.get(DOMAIN).await.unwrap(), "localhost:1337");
        assert_eq!(registry.get_hours(DEFAULT_EXPIRY_OFFSET).await.unwrap(), 336);
        assert_eq!(registry.get_hours(MAX_EXPIRY_OFFSET).await.unwrap(), 43800);
        assert_eq!(
            registry.max_file_size_bytes().await.unwrap(),
            5120 * 1024 * 1024
        );
    }

    #[tokio::test]
    async fn get_returns_the_persisted_override() {
        let registry = registry().await;
        registry.set(DOMAIN, "https://files.example.com").await.unwrap();
        assert_eq!(
            registry.get(DOMAIN).await.unwrap(),
            "https://files.example.com"
        );

        registry.set(MAX_FILE_SIZE, "200KB").await.unwrap();
        assert_eq!(registry.max_file_size_bytes().await.unwrap(), 200 * 1024);
    }

    #[tokio::test]
    async fn invalid_override_is_rejected_and_prior_value_retained() {
        let registry = registry().await;
        registry.set(MAX_FILE_SIZE, "100MB").await.unwrap();

        let err = registry.set(MAX_FILE_SIZE, "lots").await.unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue { .. }));
        assert_eq!(registry.get(MAX_FILE_SIZE).await.unwrap(), "100MB");

        let err = registry.set(DEFAULT_EXPIRY_OFFSET, "-1").await.unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue { .. }));
        assert_eq!(registry.get_hours(DEFAULT_EXPIRY_OFFSET).await.unwrap(), 336);
    }

    #[tokio::test]
    async fn unknown_keys_are_a_configuration_error() {
        let registry = registry().await;
        assert!(matches!(
            registry.get("retention_policy").await,
            Err(SettingsError::UnknownKey { .. })
        ));
        assert!(matches!(
            registry.set("retention_policy", "forever").await,
            Err(SettingsError::UnknownKey { .. })
        ));
        assert!(registry.describe("retention_policy").is_err());
    }

    #[tokio::test]
    async fn expiry_offset_pair_stays_consistent() {
        let registry = registry().await;

        // default may not exceed the maximum
        let err = registry.set(DEFAULT_EXPIRY_OFFSET, "50000").await.unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue { .. }));

        // and the maximum may not drop below the default
        registry.set(DEFAULT_EXPIRY_OFFSET, "720").await.unwrap();
        let err = registry.set(MAX_EXPIRY_OFFSET, "100").await.unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue { .. }));

        registry.set(MAX_EXPIRY_OFFSET, "720").await.unwrap();
        assert_eq!(registry.get_hours(MAX_EXPIRY_OFFSET).await.unwrap(), 720);
    }

    #[tokio::test]
    async fn domain_with_scheme_must_be_a_valid_url() {
        let registry = registry().await;
        assert!(registry.set(DOMAIN, "https://files example.com").await.is_err());
        registry.set(DOMAIN, "files.example.com:8443").await.unwrap();
    }

    #[tokio::test]
    async fn list_preserves_schema_order_and_effective_values() {
        let registry = registry().await;
        registry.set(MAX_FILE_SIZE, "1024MB").await.unwrap();

        let views = registry.list().await.unwrap();
        let keys: Vec<&str> = views.iter().map(|v| v.key).collect();
        assert_eq!(
            keys,
            vec![DOMAIN, MAX_FILE_SIZE, DEFAULT_EXPIRY_OFFSET, MAX_EXPIRY_OFFSET]
        );
        assert_eq!(views[1].value, "1024MB");
        assert_eq!(views[1].default, "5120MB");
    }
}
