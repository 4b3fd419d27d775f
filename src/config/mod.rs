pub mod bluetooth_config;

use std::path::Path;

use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

pub use crate::config::bluetooth_config::{BluetoothConfig, ServiceConfig};
use crate::core::session::{ServiceCatalog, ServiceTag};
use crate::utils::ensure_directory_exists;

pub const CONFIG_FILE_NAME: &str = "ble_session_config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// One of error, warn, info, debug, trace
    pub log_level: String,
    pub bluetooth: BluetoothConfig,
    /// Tags of the catalog services to scan for and discover
    pub active_services: Vec<ServiceTag>,
    /// The service catalog
    pub services: Vec<ServiceConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            log_level: "info".to_string(),
            bluetooth: BluetoothConfig::default(),
            active_services: vec![ServiceTag::test()],
            services: vec![ServiceConfig::test_service()],
        }
    }
}

impl AppConfig {
    /// Loads the config from a configuration file, falling back to the
    /// defaults when the file does not exist.
    pub async fn load_config(file_path: &Path) -> Result<Self> {
        if !file_path.exists() {
            warn!("Config file not found at {:?}, using default.", file_path);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;

        info!("Config loaded from {:?}", file_path);
        Ok(config)
    }

    /// Saves the config to a configuration file.
    pub async fn save_config(&self, file_path: &Path) -> Result<()> {
        if let Some(config_dir) = file_path.parent() {
            ensure_directory_exists(config_dir).await?;
        }

        let config_json = match serde_json::to_string_pretty(&self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(file_path, config_json).await?;

        info!("Config saved to {:?}.", file_path);
        Ok(())
    }

    /// Builds the service catalog and checks the active services against it.
    pub fn catalog(&self) -> Result<ServiceCatalog> {
        let catalog = ServiceCatalog::from_config(&self.services)?;
        catalog.resolve(&self.active_services)?;
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::UUID_TEST_SERVICE;

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_config(&dir.path().join(CONFIG_FILE_NAME))
            .await
            .unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[tokio::test]
    async fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let mut config = AppConfig::default();
        config.bluetooth.connect_timeout_secs = 3;
        config.log_level = "debug".into();

        config.save_config(&path).await.unwrap();
        let loaded = AppConfig::load_config(&path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, r#"{ "bluetooth": { "connect_timeout_secs": 4 } }"#).unwrap();

        let config = AppConfig::load_config(&path).await.unwrap();
        assert_eq!(config.bluetooth.connect_timeout_secs, 4);
        assert_eq!(config.bluetooth.operation_timeout_secs, 10);
        assert_eq!(config.active_services, vec![ServiceTag::test()]);
    }

    #[test]
    fn catalog_accepts_defaults_and_rejects_unknown_active_service() {
        let config = AppConfig::default();
        let catalog = config.catalog().unwrap();
        assert_eq!(catalog.uuid(&ServiceTag::test()), Some(UUID_TEST_SERVICE));

        let broken = AppConfig {
            active_services: vec![ServiceTag::new("auth")],
            ..AppConfig::default()
        };
        assert!(broken.catalog().is_err());
    }

    #[test]
    fn service_uuids_parse_from_strings() {
        let json = r#"{
            "tag": "auth",
            "uuid": "06600000-e844-4e43-8ab5-8930f76b0fed"
        }"#;
        let service: ServiceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(service.tag, ServiceTag::new("auth"));
        assert!(service.characteristics.is_empty());
    }
}
