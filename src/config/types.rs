use crate::paths::{AppPaths, ONLINE_URL, StorageTarget};
use serde::{Deserialize, Serialize};

/// Ordering applied to save lists after they are read.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    Disabled,
    #[default]
    ByName,
    ByTitleId,
    ByType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub sort: SortMode,
    /// Device holding the user's saves and exports (`ms0` or `ef0`).
    pub storage: StorageTarget,
    pub update_check: bool,
    /// Online save database root, always ends with `/`.
    pub save_db: String,
    /// FTP mirror root; empty when not configured.
    pub ftp_url: String,
    pub debug_log: bool,
    pub account_id: u64,
    pub psid: [u64; 2],
    pub web_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sort: SortMode::ByName,
            storage: StorageTarget::Ms0,
            update_check: true,
            save_db: ONLINE_URL.to_string(),
            ftp_url: String::new(),
            debug_log: false,
            account_id: 0,
            psid: [0, 0],
            web_port: 8080,
        }
    }
}

impl AppConfig {
    pub fn uses_default_db(&self) -> bool {
        self.save_db == ONLINE_URL
    }

    /// Remote directory of this account on the FTP mirror.
    pub fn ftp_user_root(&self) -> Option<String> {
        if self.ftp_url.is_empty() {
            return None;
        }
        Some(format!("{}{:016X}/", self.ftp_url, self.account_id))
    }

    pub fn psid_hex(&self) -> String {
        format!("{:016X}{:016X}", self.psid[0], self.psid[1])
    }
}

/// Configuration plus resolved paths, handed to every component.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: AppConfig,
    pub paths: AppPaths,
}

impl AppContext {
    pub fn new(config: AppConfig, paths: AppPaths) -> Self {
        Self { config, paths }
    }

    pub fn user_storage(&self) -> StorageTarget {
        self.config.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let cfg: AppConfig = serde_json::from_str(r#"{"debug_log": true}"#).unwrap();
        assert!(cfg.debug_log);
        assert_eq!(cfg.save_db, ONLINE_URL);
        assert_eq!(cfg.web_port, 8080);
    }

    #[test]
    fn test_ftp_user_root() {
        let mut cfg = AppConfig::default();
        assert_eq!(cfg.ftp_user_root(), None);
        cfg.ftp_url = "ftp://host/saves/".into();
        cfg.account_id = 0xABCD;
        assert_eq!(cfg.ftp_user_root().unwrap(), "ftp://host/saves/000000000000ABCD/");
    }
}
