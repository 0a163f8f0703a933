use super::ListProvider;
use crate::config::AppContext;
use crate::error::{SaveError, SaveResult};
use crate::net::{Transport, fetch_cached};
use crate::saves::{SaveEntry, SaveFlags, SaveList, SaveType};
use std::fs;

/// Remote `games.txt` catalogs under `<root>PS1/` and `<root>PSP/`.
pub struct OnlineCatalog {
    title: String,
    root: String,
    flags: SaveFlags,
    cache_prefix: &'static str,
}

impl OnlineCatalog {
    pub fn online(ctx: &AppContext) -> Self {
        Self {
            title: "Online Database".to_string(),
            root: ctx.config.save_db.clone(),
            flags: SaveFlags::empty(),
            cache_prefix: "",
        }
    }

    /// This account's folder on the FTP mirror.
    pub fn ftp(ctx: &AppContext) -> SaveResult<Self> {
        let root = ctx
            .config
            .ftp_user_root()
            .ok_or_else(|| SaveError::not_found("FTP server is not configured"))?;
        Ok(Self {
            title: "FTP Server".to_string(),
            root,
            flags: SaveFlags::FTP,
            cache_prefix: "ftp_",
        })
    }
}

/// Entries of a `<id>=<name>` catalog; lines without `=` are skipped.
pub fn parse_catalog(text: &str, url: &str, flags: SaveFlags) -> Vec<SaveEntry> {
    text.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(id, name)| {
            let mut entry = SaveEntry::new(SaveType::Null, flags | SaveFlags::ONLINE, name.trim());
            entry.title_id = id.trim().to_string();
            entry.path = format!("{}{}/", url, entry.title_id);
            entry
        })
        .collect()
}

impl ListProvider for OnlineCatalog {
    fn title(&self) -> &str {
        &self.title
    }

    fn read_list(&self, ctx: &AppContext, transport: &dyn Transport) -> SaveResult<SaveList> {
        // Only the default database is trusted to stay fresh for a day
        let reuse = self.flags.is_empty() && ctx.config.uses_default_db();
        let mut list = SaveList::new(&self.title, &self.root);

        for (sub, flag) in [("PS1/", SaveFlags::PS1), ("PSP/", SaveFlags::PSP)] {
            let url = format!("{}{}", self.root, sub);
            let cache = ctx
                .paths
                .cache
                .join(format!("{}{:04X}_games.txt", self.cache_prefix, flag.bits()));

            if let Err(e) = fetch_cached(transport, &url, "games.txt", &cache, reuse) {
                log::warn!("[providers] {}games.txt unavailable: {}", url, e);
                continue;
            }
            let text = fs::read_to_string(&cache).unwrap_or_default();
            list.entries.extend(parse_catalog(&text, &url, flag | self.flags));
        }

        if list.entries.is_empty() {
            return Err(SaveError::network(format!("no catalog at {}", self.root)));
        }
        Ok(list)
    }
}
