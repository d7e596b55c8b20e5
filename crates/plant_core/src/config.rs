use std::path::PathBuf;

use anyhow::Result;
use tracing::info;

use crate::store::DEFAULT_STORAGE_KEY;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReminderConfig {
    pub data_dir: PathBuf,
    pub storage_key: String,
    pub notification_title: String,
    /// `{name}` is replaced by the plant name.
    pub notification_body: String,
}

impl ReminderConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_lookup(|key| std::env::var(key).ok()))
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(dir) = lookup("PLANT_DATA_DIR") {
            let dir = dir.trim();
            if !dir.is_empty() {
                info!(path = %dir, "using plant data directory");
                config.data_dir = PathBuf::from(dir);
            }
        }
        if let Some(key) = lookup("PLANT_STORAGE_KEY") {
            if !key.trim().is_empty() {
                config.storage_key = key.trim().to_string();
            }
        }
        if let Some(title) = lookup("PLANT_NOTIFICATION_TITLE") {
            if !title.trim().is_empty() {
                config.notification_title = title;
            }
        }
        if let Some(body) = lookup("PLANT_NOTIFICATION_BODY") {
            if !body.trim().is_empty() {
                config.notification_body = body;
            }
        }
        config
    }

    pub fn render_body(&self, plant_name: &str) -> String {
        self.notification_body.replace("{name}", plant_name)
    }
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".plantmanager"),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            notification_title: "Heeey, 🌱".to_string(),
            notification_body: "It's time to take care of your {name}".to_string(),
        }
    }
}
