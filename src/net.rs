//! Blocking network transport for catalog, save and update downloads.
//!
//! The HTTP client is built on first use and kept for the process lifetime.
//! A TLS handshake failure gets exactly one retry with certificate checks
//! relaxed. `ftp://` URLs go through a fresh FTP session per call.

mod ftp;

pub use ftp::FtpUrl;

use crate::error::{IoContext, SaveError, SaveResult};
use crate::paths::ONLINE_CACHE_TIMEOUT;
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use std::cell::OnceCell;
use std::error::Error;
use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime};

const USER_AGENT: &str = concat!("savetool/", env!("CARGO_PKG_VERSION"));

/// Download/upload contract used by providers, the dispatcher and settings.
pub trait Transport {
    /// Fetch `url` + `file` into `dest`, replacing it. A missing remote file
    /// is `NotFound`.
    fn download(&self, url: &str, file: &str, dest: &Path) -> SaveResult<()>;

    /// Store `local` as `url` + `name`.
    fn upload(&self, local: &Path, url: &str, name: &str) -> SaveResult<()>;
}

#[derive(Default)]
pub struct NetTransport {
    strict: OnceCell<Client>,
    relaxed: OnceCell<Client>,
}

impl NetTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self, relaxed: bool) -> SaveResult<&Client> {
        let cell = if relaxed { &self.relaxed } else { &self.strict };
        if let Some(client) = cell.get() {
            return Ok(client);
        }
        log::debug!("[net] Bringing network up (relaxed tls: {})", relaxed);
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(20))
            .danger_accept_invalid_certs(relaxed)
            .build()?;
        Ok(cell.get_or_init(|| client))
    }

    fn get(&self, url: &str) -> SaveResult<Response> {
        match self.client(false)?.get(url).send() {
            Ok(response) => Ok(response),
            Err(e) if is_tls_failure(&e) => {
                log::warn!("[net] TLS failure on {}, retrying without certificate checks", url);
                Ok(self.client(true)?.get(url).send()?)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Transport for NetTransport {
    fn download(&self, url: &str, file: &str, dest: &Path) -> SaveResult<()> {
        let full = format!("{}{}", url, file);
        let scheme = check_scheme(&full)?;
        log::info!("[net] Downloading {} -> {}", full, dest.display());
        if scheme == Scheme::Ftp {
            return ftp::download(&full, dest);
        }

        let mut response = self.get(&full)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(SaveError::not_found(full));
        }
        if !response.status().is_success() {
            return Err(SaveError::network(format!("HTTP {} for {}", response.status(), full)));
        }

        let mut out = File::create(dest).at(dest)?;
        if let Err(e) = response.copy_to(&mut out) {
            drop(out);
            fs::remove_file(dest).ok();
            return Err(e.into());
        }
        Ok(())
    }

    fn upload(&self, local: &Path, url: &str, name: &str) -> SaveResult<()> {
        let full = format!("{}{}", url, name);
        let scheme = check_scheme(&full)?;
        log::info!("[net] Uploading {} -> {}", local.display(), full);
        if scheme == Scheme::Ftp {
            return ftp::upload(local, &full);
        }

        let body = fs::read(local).at(local)?;
        let response = self.client(false)?.put(&full).body(body).send()?;
        if !response.status().is_success() {
            return Err(SaveError::network(format!("HTTP {} for {}", response.status(), full)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheme {
    Http,
    Ftp,
}

fn check_scheme(url: &str) -> SaveResult<Scheme> {
    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(Scheme::Http);
    }
    if url.starts_with("ftp://") {
        return Ok(Scheme::Ftp);
    }
    Err(SaveError::network(format!("unsupported scheme: {}", url)))
}

/// Walk the error chain looking for a certificate / handshake failure.
fn is_tls_failure(e: &reqwest::Error) -> bool {
    if !e.is_connect() {
        return false;
    }
    let mut source: Option<&dyn Error> = e.source();
    while let Some(err) = source {
        let text = err.to_string().to_lowercase();
        if text.contains("certificate") || text.contains("tls") || text.contains("handshake") {
            return true;
        }
        source = err.source();
    }
    false
}

/// Last path segment of a URL, used as the local file name.
pub fn url_file_name(url: &str) -> String {
    let trimmed = url.split(['?', '#']).next().unwrap_or(url);
    match trimmed.rsplit('/').next() {
        Some(name) if !name.is_empty() && !trimmed.ends_with("://") => name.to_string(),
        _ => "download.bin".to_string(),
    }
}

/// A cache file last written at `modified` can still be used at `now`.
pub fn is_cache_fresh(modified: SystemTime, now: SystemTime) -> bool {
    now.duration_since(modified)
        .map(|age| age.as_secs() < ONLINE_CACHE_TIMEOUT)
        .unwrap_or(true)
}

/// Fetch `url` + `file` into `cache`, skipping the network when `reuse` is
/// set and the cached copy is fresh. Returns true when a download happened.
pub fn fetch_cached(transport: &dyn Transport, url: &str, file: &str, cache: &Path, reuse: bool) -> SaveResult<bool> {
    if reuse {
        if let Ok(modified) = fs::metadata(cache).and_then(|m| m.modified()) {
            if is_cache_fresh(modified, SystemTime::now()) {
                log::debug!("[net] Using cached {}", cache.display());
                return Ok(false);
            }
        }
    }
    if let Some(parent) = cache.parent() {
        fs::create_dir_all(parent).at(parent)?;
    }
    transport.download(url, file, cache)?;
    Ok(true)
}

#[cfg(test)]
pub mod mock {
    use super::Transport;
    use crate::error::{SaveError, SaveResult};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::path::Path;

    /// In-memory transport: serves registered URLs and records every call.
    #[derive(Default)]
    pub struct MockTransport {
        pub files: HashMap<String, Vec<u8>>,
        pub broken: Vec<String>,
        pub downloads: RefCell<Vec<String>>,
        pub uploads: RefCell<Vec<(String, Vec<u8>)>>,
    }

    impl MockTransport {
        pub fn serve(mut self, url: &str, body: &[u8]) -> Self {
            self.files.insert(url.to_string(), body.to_vec());
            self
        }

        /// Downloads of `url` fail with a network error instead of not-found.
        pub fn break_url(mut self, url: &str) -> Self {
            self.broken.push(url.to_string());
            self
        }

        pub fn download_count(&self) -> usize {
            self.downloads.borrow().len()
        }
    }

    impl Transport for MockTransport {
        fn download(&self, url: &str, file: &str, dest: &Path) -> SaveResult<()> {
            let full = format!("{}{}", url, file);
            self.downloads.borrow_mut().push(full.clone());
            if self.broken.contains(&full) {
                return Err(SaveError::network(format!("connection reset on {}", full)));
            }
            let body = self.files.get(&full).ok_or_else(|| SaveError::not_found(full.clone()))?;
            std::fs::write(dest, body)?;
            Ok(())
        }

        fn upload(&self, local: &Path, url: &str, name: &str) -> SaveResult<()> {
            let body = std::fs::read(local)?;
            self.uploads.borrow_mut().push((format!("{}{}", url, name), body));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schemes() {
        assert_eq!(check_scheme("https://h/x").unwrap(), Scheme::Http);
        assert_eq!(check_scheme("ftp://h/x").unwrap(), Scheme::Ftp);
        assert!(matches!(check_scheme("gopher://h/x"), Err(SaveError::Network(_))));
    }

    #[test]
    fn test_unsupported_scheme_writes_nothing() {
        let t = NetTransport::new();
        let dir = tempfile::tempdir().unwrap();
        let err = t
            .download("sftp://example.org/", "games.txt", &dir.path().join("g.txt"))
            .unwrap_err();
        assert!(matches!(err, SaveError::Network(_)));
        assert!(!dir.path().join("g.txt").exists());
    }

    #[test]
    fn test_cache_freshness_window() {
        let now = SystemTime::now();
        assert!(is_cache_fresh(now - Duration::from_secs(3600), now));
        assert!(!is_cache_fresh(now - Duration::from_secs(25 * 3600), now));
        assert!(is_cache_fresh(now + Duration::from_secs(60), now));
    }

    #[test]
    fn test_fetch_cached_skips_fresh_copy() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("CACHE/x.txt");
        let t = mock::MockTransport::default().serve("http://h/games.txt", b"new");

        assert!(fetch_cached(&t, "http://h/", "games.txt", &cache, true).unwrap());
        assert!(!fetch_cached(&t, "http://h/", "games.txt", &cache, true).unwrap());
        assert!(fetch_cached(&t, "http://h/", "games.txt", &cache, false).unwrap());
        assert_eq!(t.download_count(), 2);
    }

    #[test]
    fn test_url_file_name() {
        assert_eq!(url_file_name("http://a.b/c/d.zip"), "d.zip");
        assert_eq!(url_file_name("http://a.b/c/d.zip?x=1"), "d.zip");
        assert_eq!(url_file_name("http://a.b/c/"), "download.bin");
    }
}
