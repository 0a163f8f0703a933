use crate::config::types::AppConfig;

use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub fn load_cfg(path: &Path) -> AppConfig {
    if let Ok(file) = File::open(path) {
        match serde_json::from_reader::<_, AppConfig>(BufReader::new(file)) {
            Ok(mut config) => {
                // Older files stored the URL without the trailing slash
                if !config.save_db.ends_with('/') {
                    config.save_db.push('/');
                }
                return config;
            }
            Err(e) => log::warn!("[config] Ignoring unreadable {}: {}", path.display(), e),
        }
    }

    // Return default settings if file doesn't exist or has error
    AppConfig::default()
}

pub fn save_cfg(path: &Path, config: &AppConfig) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, config)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_cfg(&dir.path().join("settings.json"));
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut cfg = AppConfig::default();
        cfg.account_id = 42;
        cfg.save_db = "http://mirror.local/db".into();
        save_cfg(&path, &cfg).unwrap();

        let loaded = load_cfg(&path);
        assert_eq!(loaded.account_id, 42);
        assert_eq!(loaded.save_db, "http://mirror.local/db/");
    }

    #[test]
    fn test_garbage_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_cfg(&path), AppConfig::default());
    }
}
