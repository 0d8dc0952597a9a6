use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RentbookError, Result};
use crate::models::{DeliveryChannel, Id};
use crate::reminders::ReminderPolicy;
use crate::store::StorageKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_data_dir_string")]
    pub data_dir: String,
    #[serde(default)]
    pub storage: StorageKind,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// The landlord whose books the CLI operates on.
    #[serde(default = "default_user_id")]
    pub user_id: Id,
    #[serde(default = "default_grace_days")]
    pub reminder_grace_days: u32,
    #[serde(default)]
    pub reminder_channel: DeliveryChannel,
    /// Percent, 0 to 100.
    #[serde(default)]
    pub default_tax_rate: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_user_id() -> Id {
    1
}

fn default_grace_days() -> u32 {
    5
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_data_dir_string() -> String {
    default_data_dir().to_string_lossy().to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir_string(),
            storage: StorageKind::default(),
            log_level: default_log_level(),
            user_id: default_user_id(),
            reminder_grace_days: default_grace_days(),
            reminder_channel: DeliveryChannel::default(),
            default_tax_rate: None,
            currency: default_currency(),
        }
    }
}

impl Settings {
    pub fn reminder_policy(&self) -> ReminderPolicy {
        ReminderPolicy {
            grace_days: self.reminder_grace_days,
            channel: self.reminder_channel,
        }
    }

    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(shellexpand_path(&self.data_dir))
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("rentbook")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("rentbook")
}

/// Missing file means defaults; a file that does not parse is an error.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| RentbookError::Settings(format!("{}: {e}", path.display())))
}

pub fn load_settings() -> Result<Settings> {
    load_settings_from(&settings_path())
}

pub fn save_settings_to(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| RentbookError::Settings(e.to_string()))?;
    std::fs::write(path, format!("{json}\n"))?;
    Ok(())
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    save_settings_to(&settings_path(), settings)
}

pub fn shellexpand_path(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings {
            data_dir: "/tmp/books".to_string(),
            storage: StorageKind::Memory,
            reminder_grace_days: 3,
            reminder_channel: DeliveryChannel::Sms,
            default_tax_rate: Some(22.0),
            ..Settings::default()
        };
        save_settings_to(&path, &settings).unwrap();
        let loaded = load_settings_from(&path).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.reminder_policy().grace_days, 3);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = load_settings_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(s.storage, StorageKind::Sqlite);
        assert_eq!(s.reminder_grace_days, 5);
        assert_eq!(s.reminder_channel, DeliveryChannel::Email);
        assert_eq!(s.currency, "USD");
        assert!(!s.data_dir.is_empty());
    }

    #[test]
    fn test_partial_file_merges_with_defaults() {
        let json = r#"{"data_dir": "/tmp/test", "storage": "memory"}"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(s.storage, StorageKind::Memory);
        assert_eq!(s.log_level, "info");
        assert_eq!(s.user_id, 1);
        assert_eq!(s.default_tax_rate, None);
    }

    #[test]
    fn test_invalid_file_is_a_settings_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_settings_from(&path), Err(RentbookError::Settings(_))));
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep").join("nested").join("settings.json");
        save_settings_to(&path, &Settings::default()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_tilde_expansion() {
        assert_eq!(shellexpand_path("/abs/path"), "/abs/path");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(shellexpand_path("~/books"), format!("{}/books", home.to_string_lossy()));
        }
    }
}
