//! The only mutation path for `AppConfig`.
//!
//! Every setter persists the file immediately.

use crate::archive;
use crate::config::operations::io::save_cfg;
use crate::config::types::{AppContext, SortMode};
use crate::error::{IoContext, SaveError, SaveResult};
use crate::net::Transport;
use crate::paths::{ONLINE_PATCH_URL, StorageTarget, UPDATE_URL};

use std::error::Error;
use std::fs;
use std::path::PathBuf;

pub struct Settings<'a> {
    ctx: &'a mut AppContext,
}

fn with_slash(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() || url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

impl<'a> Settings<'a> {
    pub fn new(ctx: &'a mut AppContext) -> Self {
        Self { ctx }
    }

    fn persist(&self) -> Result<(), Box<dyn Error>> {
        save_cfg(&self.ctx.paths.settings_file(), &self.ctx.config)
    }

    pub fn set_storage(&mut self, target: StorageTarget) -> Result<(), Box<dyn Error>> {
        if target == StorageTarget::Ms0Psp {
            return Err("user storage must be ms0 or ef0".into());
        }
        self.ctx.config.storage = target;
        self.persist()
    }

    pub fn set_sort(&mut self, mode: SortMode) -> Result<(), Box<dyn Error>> {
        self.ctx.config.sort = mode;
        self.persist()
    }

    pub fn set_save_db_url(&mut self, url: &str) -> Result<(), Box<dyn Error>> {
        let url = with_slash(url);
        if url.is_empty() {
            return Err("database URL cannot be empty".into());
        }
        self.ctx.config.save_db = url;
        self.persist()
    }

    /// Point the FTP mirror at `url` after checking it answers.
    ///
    /// The mirror root must serve `apollo.txt`, the list of registered
    /// accounts; this account is appended when missing.
    pub fn set_ftp_url(&mut self, url: &str, transport: &dyn Transport) -> Result<(), Box<dyn Error>> {
        let url = with_slash(url);
        if url.is_empty() {
            self.ctx.config.ftp_url.clear();
            return self.persist();
        }

        let index = self.ctx.paths.cache.join("users.ftp");
        fs::create_dir_all(&self.ctx.paths.cache)?;
        transport.download(&url, "apollo.txt", &index)?;

        let account = format!("{:016X}", self.ctx.config.account_id);
        let mut users = fs::read_to_string(&index).unwrap_or_default();
        if !users.lines().any(|l| l.trim() == account) {
            if !users.is_empty() && !users.ends_with('\n') {
                users.push('\n');
            }
            users.push_str(&account);
            users.push('\n');
            fs::write(&index, &users)?;
            transport.upload(&index, &url, "apollo.txt")?;
        }
        fs::remove_file(&index).ok();

        self.ctx.config.ftp_url = url;
        self.persist()
    }

    /// Toggle debug logging; returns the log file when enabled.
    pub fn set_debug_log(&mut self, on: bool) -> Result<Option<PathBuf>, Box<dyn Error>> {
        self.ctx.config.debug_log = on;
        log::set_max_level(if on {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        });
        self.persist()?;
        Ok(on.then(|| self.ctx.paths.log_file(self.ctx.config.storage)))
    }

    pub fn set_update_check(&mut self, on: bool) -> Result<(), Box<dyn Error>> {
        self.ctx.config.update_check = on;
        self.persist()
    }

    /// Remove everything under the cache directory; returns the entry count.
    pub fn clear_cache(&mut self) -> SaveResult<usize> {
        let cache = &self.ctx.paths.cache;
        if !cache.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in fs::read_dir(cache).at(cache)? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path).at(&path)?;
            } else {
                fs::remove_file(&path).at(&path)?;
            }
            removed += 1;
        }
        log::info!("[config] Cleared {} cache entries", removed);
        Ok(removed)
    }

    /// Refresh patches and keystore from the patch repository.
    pub fn update_app_data(&mut self, transport: &dyn Transport) -> SaveResult<usize> {
        let tmp = self.ctx.paths.cache.join("appdata.zip");
        fs::create_dir_all(&self.ctx.paths.cache).at(&self.ctx.paths.cache)?;
        transport.download(ONLINE_PATCH_URL, "apollo-psp-update.zip", &tmp)?;
        let count = archive::extract_zip(&tmp, &self.ctx.paths.data);
        fs::remove_file(&tmp).ok();
        count
    }

    /// Compare the latest published release with this build.
    /// Returns the download URL when a newer version exists.
    pub fn check_update(&self, transport: &dyn Transport) -> SaveResult<Option<String>> {
        let tmp = self.ctx.paths.cache.join("ver_check.json");
        fs::create_dir_all(&self.ctx.paths.cache).at(&self.ctx.paths.cache)?;
        transport.download(UPDATE_URL, "", &tmp)?;
        let text = fs::read_to_string(&tmp).at(&tmp)?;
        fs::remove_file(&tmp).ok();
        newer_release(&text, env!("CARGO_PKG_VERSION"))
    }
}

/// Parse a release JSON and return its first asset URL if newer than `current`.
pub(crate) fn newer_release(json: &str, current: &str) -> SaveResult<Option<String>> {
    let release: serde_json::Value = serde_json::from_str(json)?;
    let tag = release["tag_name"]
        .as_str()
        .ok_or_else(|| SaveError::format("release has no tag_name"))?;
    let latest = tag.strip_prefix('v').unwrap_or(tag);

    let (Ok(latest_semver), Ok(current_semver)) =
        (semver::Version::parse(latest), semver::Version::parse(current))
    else {
        return Err(SaveError::format(format!("unparseable version {}", tag)));
    };
    if latest_semver <= current_semver {
        return Ok(None);
    }

    let url = release["assets"][0]["browser_download_url"]
        .as_str()
        .or_else(|| release["html_url"].as_str())
        .unwrap_or_default()
        .to_string();
    log::info!("[config] New version available: {}", latest_semver);
    Ok(Some(url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::AppConfig;
    use crate::config::load_cfg;
    use crate::net::mock::MockTransport;
    use crate::paths::AppPaths;

    fn ctx(root: &std::path::Path) -> AppContext {
        AppContext::new(AppConfig::default(), AppPaths::new(root))
    }

    // ── set_save_db_url ──

    #[test]
    fn test_db_url_gets_trailing_slash_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = ctx(dir.path());
        Settings::new(&mut c).set_save_db_url("http://mirror/db").unwrap();
        assert_eq!(c.config.save_db, "http://mirror/db/");
        assert_eq!(load_cfg(&c.paths.settings_file()).save_db, "http://mirror/db/");
    }

    #[test]
    fn test_storage_rejects_ms0_psp() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = ctx(dir.path());
        assert!(Settings::new(&mut c).set_storage(StorageTarget::Ms0Psp).is_err());
        Settings::new(&mut c).set_storage(StorageTarget::Ef0).unwrap();
        assert_eq!(c.config.storage, StorageTarget::Ef0);
    }

    // ── set_ftp_url ──

    #[test]
    fn test_ftp_registers_account() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = ctx(dir.path());
        c.config.account_id = 0x10;
        let t = MockTransport::default().serve("http://ftp.local/apollo.txt", b"0000000000000001\n");

        Settings::new(&mut c).set_ftp_url("http://ftp.local", &t).unwrap();

        assert_eq!(c.config.ftp_url, "http://ftp.local/");
        let uploads = t.uploads.borrow();
        assert_eq!(uploads.len(), 1);
        assert_eq!(
            String::from_utf8_lossy(&uploads[0].1),
            "0000000000000001\n0000000000000010\n"
        );
    }

    #[test]
    fn test_ftp_unreachable_keeps_old_url() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = ctx(dir.path());
        let t = MockTransport::default();
        assert!(Settings::new(&mut c).set_ftp_url("http://nowhere", &t).is_err());
        assert!(c.config.ftp_url.is_empty());
    }

    // ── clear_cache ──

    #[test]
    fn test_clear_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = ctx(dir.path());
        fs::create_dir_all(c.paths.cache.join("sub")).unwrap();
        fs::write(c.paths.cache.join("a.txt"), b"1").unwrap();
        assert_eq!(Settings::new(&mut c).clear_cache().unwrap(), 2);
        assert_eq!(fs::read_dir(&c.paths.cache).unwrap().count(), 0);
    }

    // ── check_update ──

    #[test]
    fn test_newer_release() {
        let json = r#"{"tag_name":"v99.0.0","assets":[{"browser_download_url":"http://x/app.zip"}]}"#;
        assert_eq!(newer_release(json, "1.0.0").unwrap(), Some("http://x/app.zip".into()));
        let old = r#"{"tag_name":"v0.1.0"}"#;
        assert_eq!(newer_release(old, "1.0.0").unwrap(), None);
    }

    #[test]
    fn test_check_update_through_transport() {
        let dir = tempfile::tempdir().unwrap();
        let c = ctx(dir.path());
        let t = MockTransport::default().serve(UPDATE_URL, br#"{"tag_name":"v0.0.1"}"#);
        let mut c2 = c.clone();
        assert_eq!(Settings::new(&mut c2).check_update(&t).unwrap(), None);
        assert_eq!(t.download_count(), 1);
    }
}
