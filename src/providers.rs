//! List providers - WHERE saves come from
//!
//! - Local: live saves on the memory stick, or the backup area
//! - Memory card: slots of one PS1 `.VMP`/`.MCR` image
//! - Online: the remote save database, or the account folder of an FTP mirror
//! - Tools: fixed pseudo-entries for archive, plugin, network and ISO utilities

mod local;
mod online;
mod tools;
mod vmc;

pub use local::LocalSaves;
pub use online::{OnlineCatalog, parse_catalog};
pub use tools::ToolsList;
pub use vmc::MemoryCardList;

use crate::config::AppContext;
use crate::error::{SaveError, SaveResult};
use crate::net::Transport;
use crate::saves::{SaveList, sort_saves};
use std::path::PathBuf;

pub trait ListProvider {
    fn title(&self) -> &str;

    /// Produce the entries, or `NotFound` / `Network` when the source is
    /// unavailable.
    fn read_list(&self, ctx: &AppContext, transport: &dyn Transport) -> SaveResult<SaveList>;
}

/// Selectable save sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Hdd,
    Usb,
    Online,
    Ftp,
    Tools,
    Vmc(PathBuf),
}

impl Source {
    pub fn parse(name: &str, arg: Option<&str>) -> SaveResult<Self> {
        match name {
            "hdd" => Ok(Source::Hdd),
            "usb" => Ok(Source::Usb),
            "online" => Ok(Source::Online),
            "ftp" => Ok(Source::Ftp),
            "tools" => Ok(Source::Tools),
            "vmc" => arg
                .map(|p| Source::Vmc(PathBuf::from(p)))
                .ok_or_else(|| SaveError::not_found("memory card path")),
            other => Err(SaveError::not_found(format!("source '{}'", other))),
        }
    }

    pub fn as_provider(&self, ctx: &AppContext) -> SaveResult<Box<dyn ListProvider>> {
        Ok(match self {
            Source::Hdd => Box::new(LocalSaves::hdd(ctx)),
            Source::Usb => Box::new(LocalSaves::backup(ctx)),
            Source::Online => Box::new(OnlineCatalog::online(ctx)),
            Source::Ftp => Box::new(OnlineCatalog::ftp(ctx)?),
            Source::Tools => Box::new(ToolsList),
            Source::Vmc(path) => Box::new(MemoryCardList::new(path)),
        })
    }
}

/// Read a source and order it by the configured sort mode.
pub fn load_list(source: &Source, ctx: &AppContext, transport: &dyn Transport) -> SaveResult<SaveList> {
    let provider = source.as_provider(ctx)?;
    let mut list = provider.read_list(ctx, transport)?;
    sort_saves(&mut list, ctx.config.sort);
    log::info!("[providers] {}: {} entries", provider.title(), list.entries.len());
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sources() {
        assert_eq!(Source::parse("hdd", None).unwrap(), Source::Hdd);
        assert_eq!(
            Source::parse("vmc", Some("/c/SCEVMC0.VMP")).unwrap(),
            Source::Vmc(PathBuf::from("/c/SCEVMC0.VMP"))
        );
        assert!(Source::parse("vmc", None).is_err());
        assert!(Source::parse("trophies", None).is_err());
    }
}
