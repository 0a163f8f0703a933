use super::ListProvider;
use crate::config::AppContext;
use crate::error::{IoContext, SaveError, SaveResult};
use crate::net::Transport;
use crate::ps1card::BLOCK_SIZE;
use crate::saves::{SaveEntry, SaveFlags, SaveList, SaveType};
use crate::sfo::{self, Sfo};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// PSP save directories under one root.
pub struct LocalSaves {
    title: String,
    root: PathBuf,
    flags: SaveFlags,
}

impl LocalSaves {
    /// Live saves (`PSP/SAVEDATA`) of the user storage.
    pub fn hdd(ctx: &AppContext) -> Self {
        Self {
            title: "Memory Stick Saves".to_string(),
            root: ctx.paths.live_saves(ctx.user_storage()),
            flags: SaveFlags::HDD,
        }
    }

    /// Backup copies (`APOLLO/SAVEDATA`) of the user storage.
    pub fn backup(ctx: &AppContext) -> Self {
        Self {
            title: "Backup Saves".to_string(),
            root: ctx.paths.backup_saves(ctx.user_storage()),
            flags: SaveFlags::empty(),
        }
    }

    pub fn at(title: &str, root: &Path, flags: SaveFlags) -> Self {
        Self {
            title: title.to_string(),
            root: root.to_path_buf(),
            flags,
        }
    }
}

fn size_in_blocks(dir: &Path) -> u32 {
    let bytes: u64 = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum();
    bytes.div_ceil(BLOCK_SIZE as u64) as u32
}

/// One entry per subdirectory holding a readable PARAM.SFO.
fn read_save_dir(dir: &Path, flags: SaveFlags) -> SaveResult<SaveEntry> {
    let sfo = Sfo::read(&dir.join("PARAM.SFO"))?;
    let folder = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let name = sfo.get_str(sfo::TITLE).unwrap_or_else(|| folder.clone());
    let mut entry = SaveEntry::new(SaveType::Psp, SaveFlags::PSP | flags, name);
    entry.dir_name = sfo
        .get_str(sfo::SAVEDATA_DIRECTORY)
        .filter(|d| !d.is_empty())
        .unwrap_or(folder);
    entry.title_id = entry.dir_name.chars().take(9).collect();
    entry.path = dir.to_string_lossy().into_owned();
    entry.blocks = size_in_blocks(dir);

    // PS1 classics keep a single CONFIG.BIN next to their virtual cards
    let first_file = sfo
        .get_bin(sfo::SAVEDATA_FILE_LIST)
        .map(sfo::file_list_names)
        .and_then(|names| names.into_iter().next());
    if first_file.as_deref() == Some("CONFIG.BIN") && dir.join("SCEVMC0.VMP").is_file() {
        entry.flags.toggle(SaveFlags::PS1 | SaveFlags::PSP);
    }

    log::debug!("[providers] [{}] F({:X}) name '{}'", entry.title_id, entry.flags.bits(), entry.name);
    Ok(entry)
}

impl ListProvider for LocalSaves {
    fn title(&self) -> &str {
        &self.title
    }

    fn read_list(&self, _ctx: &AppContext, _transport: &dyn Transport) -> SaveResult<SaveList> {
        if !self.root.is_dir() {
            return Err(SaveError::not_found(self.root.display().to_string()));
        }

        let mut dirs: Vec<PathBuf> = fs::read_dir(&self.root)
            .at(&self.root)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();

        let mut list = SaveList::new(&self.title, self.root.to_string_lossy());
        for dir in dirs {
            match read_save_dir(&dir, self.flags) {
                Ok(entry) => list.entries.push(entry),
                Err(e) => log::warn!("[providers] Skipping {}: {}", dir.display(), e),
            }
        }

        let mut menu = SaveEntry::new(SaveType::Menu, SaveFlags::PSP | self.flags, "Bulk Save Management");
        menu.path = self.root.to_string_lossy().into_owned();
        list.push_menu(menu);
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::net::mock::MockTransport;
    use crate::paths::AppPaths;
    use crate::sfo::psp_save_sfo;

    fn ctx(root: &Path) -> AppContext {
        AppContext::new(AppConfig::default(), AppPaths::new(root))
    }

    fn make_save(root: &Path, dir: &str, files: &[&str]) -> PathBuf {
        let path = root.join(dir);
        fs::create_dir_all(&path).unwrap();
        psp_save_sfo(dir, "Some Game", files).write(&path.join("PARAM.SFO")).unwrap();
        for f in files {
            fs::write(path.join(f), vec![0u8; 100]).unwrap();
        }
        path
    }

    #[test]
    fn test_reads_saves_and_prepends_menu() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx(tmp.path());
        let root = ctx.paths.live_saves(ctx.user_storage());
        make_save(&root, "ULUS10041DATA00", &["DATA.BIN"]);
        make_save(&root, "NPUJ00001CLASSIC", &["CONFIG.BIN"]);
        fs::write(root.join("NPUJ00001CLASSIC/SCEVMC0.VMP"), b"x").unwrap();
        fs::create_dir_all(root.join("BROKEN")).unwrap();

        let list = LocalSaves::hdd(&ctx).read_list(&ctx, &MockTransport::default()).unwrap();
        assert_eq!(list.entries.len(), 3);
        assert!(list.is_menu(0));
        assert!(list.entries.iter().all(|e| e.is_consistent()));

        let ps1 = list.saves().find(|e| e.title_id == "NPUJ00001").unwrap();
        assert!(ps1.flags.contains(SaveFlags::PS1));
        assert!(!ps1.flags.contains(SaveFlags::PSP));
        let psp = list.saves().find(|e| e.title_id == "ULUS10041").unwrap();
        assert!(psp.flags.contains(SaveFlags::PSP | SaveFlags::HDD));
        assert_eq!(psp.dir_name, "ULUS10041DATA00");
        assert_eq!(psp.blocks, 1);
    }

    #[test]
    fn test_missing_root_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx(tmp.path());
        let err = LocalSaves::backup(&ctx)
            .read_list(&ctx, &MockTransport::default())
            .unwrap_err();
        assert!(matches!(err, SaveError::NotFound(_)));
    }
}
