//! Decrypted file export/import, cheats, keys and title changes.

use super::Operations;
use super::pure::{is_title_id, retitle_dir};
use super::storage::{add_record, already_exists};
use crate::crypto::GameKey;
use crate::error::{IoContext, SaveError, SaveResult};
use crate::saves::{CodeEntry, SaveEntry, SaveFlags};
use crate::sfo::{self, Sfo};
use std::fs;
use std::path::{Path, PathBuf};

const KEY_DUMP_FILE: &str = "APOLLO/gamekeys.txt";

/// File a cheat patches; wildcard targets use the selected option.
fn cheat_target(code: &CodeEntry) -> SaveResult<&str> {
    let file = code
        .file
        .as_deref()
        .ok_or_else(|| SaveError::not_found(format!("target file of [{}]", code.name)))?;
    if file.contains(['*', '?']) {
        return code
            .selected_label()
            .ok_or_else(|| SaveError::not_found(format!("no file selected for [{}]", code.name)));
    }
    Ok(file)
}

impl Operations<'_> {
    /// Key of an encrypted save; PS1 saves are stored in the clear.
    pub(super) fn key_for(&self, entry: &SaveEntry) -> SaveResult<Option<GameKey>> {
        if !entry.flags.contains(SaveFlags::PSP) {
            return Ok(None);
        }
        self.keys.lookup(entry).map(Some)
    }

    /// Resign `dir`. Once content was changed a failure means "modified but
    /// unsigned" rather than a plain crypto error.
    pub(super) fn sign(&self, dir: &Path, modified: bool) -> SaveResult<()> {
        match self.crypto.resign(dir) {
            Ok(()) => Ok(()),
            Err(e) if modified => Err(SaveError::Unsigned(e.to_string())),
            Err(e) => Err(e),
        }
    }

    pub fn export_file(&self, entry: &SaveEntry, name: &str) -> SaveResult<String> {
        let key = self.key_for(entry)?;
        let src = entry.local_path().join(name);
        let dir = self.ctx.paths.files_dir(self.ctx.user_storage(), &entry.dir_name);
        fs::create_dir_all(&dir).at(&dir)?;

        let dst = dir.join(name);
        fs::copy(&src, &dst).at(&src)?;
        if let Some(key) = key {
            self.crypto.decrypt_file(&dst, &key)?;
        }
        log::info!("[exec] Exported {} to {}", name, dst.display());
        Ok(format!("File successfully exported to {}", dst.display()))
    }

    pub fn import_file(&self, entry: &SaveEntry, name: &str) -> SaveResult<String> {
        let key = self.key_for(entry)?;
        let src = self
            .ctx
            .paths
            .files_dir(self.ctx.user_storage(), &entry.dir_name)
            .join(name);
        if !src.is_file() {
            return Err(SaveError::not_found(src.display().to_string()));
        }

        let dst = entry.local_path().join(name);
        fs::copy(&src, &dst).at(&dst)?;
        if let Some(key) = key {
            self.crypto.encrypt_file(&dst, &key)?;
        }
        self.sign(entry.local_path(), true)?;
        log::info!("[exec] Imported {} into {}", name, entry.dir_name);
        Ok(format!("File successfully imported to {}", dst.display()))
    }

    /// Apply the activated cheats, re-encrypt what was decrypted, resign.
    ///
    /// A cheat that fails is logged and skipped; the rest still apply and
    /// the container is always resigned afterwards.
    pub fn apply_changes(&self, entry: &SaveEntry) -> SaveResult<String> {
        let dir = entry.local_path();
        let cheats: Vec<&CodeEntry> = entry
            .codes
            .iter()
            .filter(|c| c.activated && c.is_cheat())
            .collect();

        if cheats.is_empty() {
            self.sign(dir, false)?;
            return Ok(format!("Save {} successfully resigned", entry.dir_name));
        }

        let key = self.key_for(entry)?;
        let mut decrypted = Vec::new();
        let mut failed = Vec::new();
        for cheat in &cheats {
            if let Err(e) = self.apply_cheat(dir, cheat, key.as_ref(), &mut decrypted) {
                log::warn!("[exec] Cheat [{}] not applied: {}", cheat.name, e);
                failed.push(cheat.name.as_str());
            }
        }

        let mut restore_error = None;
        if let Some(key) = &key {
            for file in &decrypted {
                if let Err(e) = self.crypto.encrypt_file(file, key) {
                    log::warn!("[exec] Cannot encrypt {}: {}", file.display(), e);
                    restore_error.get_or_insert(e);
                }
            }
        }

        let applied = cheats.len() - failed.len();
        self.sign(dir, applied > 0)?;
        if let Some(e) = restore_error {
            return Err(e);
        }
        if !failed.is_empty() {
            return Err(SaveError::format(format!(
                "{} of {} cheats could not be applied: {}",
                failed.len(),
                cheats.len(),
                failed.join(", ")
            )));
        }
        Ok(format!(
            "Save {} successfully modified ({} cheats applied)",
            entry.dir_name, applied
        ))
    }

    fn apply_cheat(
        &self,
        dir: &Path,
        cheat: &CodeEntry,
        key: Option<&GameKey>,
        decrypted: &mut Vec<PathBuf>,
    ) -> SaveResult<()> {
        let file = dir.join(cheat_target(cheat)?);
        if let Some(key) = key {
            if !decrypted.contains(&file) {
                self.crypto.decrypt_file(&file, key)?;
                decrypted.push(file.clone());
            }
        }
        self.engine.apply(&file, cheat)
    }

    pub fn resign_only(&self, entry: &SaveEntry) -> SaveResult<()> {
        self.sign(entry.local_path(), false)
    }

    pub fn export_key(&self, entry: &SaveEntry) -> SaveResult<String> {
        let key = self.keys.lookup(entry)?;
        let dir = self.ctx.paths.files_dir(self.ctx.user_storage(), &entry.dir_name);
        fs::create_dir_all(&dir).at(&dir)?;
        let out = dir.join(format!("{}.bin", entry.title_id));
        fs::write(&out, key.0).at(&out)?;
        Ok(format!("Game key exported to {}", out.display()))
    }

    /// Add `<title>=<key>` to the user's key dump; returns the dump file.
    pub fn dump_key(&self, entry: &SaveEntry) -> SaveResult<PathBuf> {
        let key = self.keys.lookup(entry)?;
        let out = self.ctx.paths.device(self.ctx.user_storage()).join(KEY_DUMP_FILE);
        add_record(
            &out,
            &entry.dir_name,
            &format!("{}={}", entry.dir_name, key.to_hex()),
        )?;
        Ok(out)
    }

    /// Rewrite the title prefix of the save directory, move it, resign.
    pub fn rename_title(&self, entry: &mut SaveEntry, title_id: &str) -> SaveResult<String> {
        if !is_title_id(title_id) {
            return Err(SaveError::format(format!("'{}' is not a title ID", title_id)));
        }
        let old_dir = entry.local_path().to_path_buf();
        let sfo_path = old_dir.join("PARAM.SFO");
        let mut sfo = Sfo::read(&sfo_path)?;
        let dir_name = sfo
            .get_str(sfo::SAVEDATA_DIRECTORY)
            .unwrap_or_else(|| entry.dir_name.clone());
        let new_name = retitle_dir(&dir_name, title_id);
        let new_dir = old_dir.with_file_name(&new_name);
        if new_dir != old_dir && new_dir.exists() {
            return Err(already_exists(&new_dir));
        }

        sfo.set_str(sfo::SAVEDATA_DIRECTORY, &new_name)?;
        sfo.write(&sfo_path)?;
        fs::rename(&old_dir, &new_dir).at(&old_dir)?;
        log::info!("[exec] Moved {} to {}", dir_name, new_name);

        entry.title_id = title_id.to_string();
        entry.dir_name = new_name;
        entry.path = new_dir.to_string_lossy().into_owned();
        entry.flags.insert(SaveFlags::UPDATED);

        self.sign(&new_dir, true)?;
        Ok(format!("Title ID changed to {}", title_id))
    }
}
