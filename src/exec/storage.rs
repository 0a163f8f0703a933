//! Copies, archives and transfers of whole saves.

use super::Operations;
use super::pure::{export_zip_name, next_free_index, with_record};
use crate::archive::{extract_archive, extract_zip, zip_directory};
use crate::error::{IoContext, SaveError, SaveResult};
use crate::iso::{converted_path, cso_to_iso, iso_to_cso};
use crate::net::url_file_name;
use crate::paths::StorageTarget;
use crate::saves::{CodeEntry, SaveEntry, SaveFlags};
use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

pub(super) fn already_exists(path: &Path) -> SaveError {
    SaveError::Io {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::AlreadyExists, "already exists"),
    }
}

fn read_or_empty(path: &Path) -> SaveResult<String> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(SaveError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Append `record` to a `key=value` file unless `key` is already listed.
pub(super) fn add_record(path: &Path, key: &str, record: &str) -> SaveResult<()> {
    let text = read_or_empty(path)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).at(parent)?;
    }
    if let Some(updated) = with_record(&text, key, record) {
        fs::write(path, updated).at(path)?;
    }
    Ok(())
}

/// Copy a directory tree, replacing files that already exist.
pub(super) fn copy_dir(src: &Path, dest: &Path) -> SaveResult<usize> {
    fs::create_dir_all(dest).at(dest)?;
    let mut copied = 0;
    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry = entry?;
        let Ok(rel) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).at(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).at(parent)?;
            }
            fs::copy(entry.path(), &target).at(&target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

impl Operations<'_> {
    pub fn copy_save(&self, entry: &SaveEntry, dest_root: &Path) -> SaveResult<String> {
        let src = entry.local_path();
        let dest = dest_root.join(&entry.dir_name);
        if dest == src {
            return Err(already_exists(&dest));
        }
        if !src.is_dir() {
            return Err(SaveError::not_found(src.display().to_string()));
        }
        let files = copy_dir(src, &dest)?;
        log::info!("[exec] Copied {} ({} files) to {}", entry.dir_name, files, dest.display());
        Ok(format!("Save successfully copied to {}", dest.display()))
    }

    /// Zip the save into the export folder and list it in `<psid>.txt`.
    pub fn export_zip(&self, entry: &SaveEntry, target: StorageTarget) -> SaveResult<String> {
        let dir = self.ctx.paths.export_dir(target);
        fs::create_dir_all(&dir).at(&dir)?;

        let index = next_free_index(|i| dir.join(export_zip_name(&entry.title_id, i)).exists());
        let name = export_zip_name(&entry.title_id, index);
        let out = dir.join(&name);
        let src = entry.local_path();
        zip_directory(src.parent().unwrap_or(src), src, &out)?;

        add_record(
            &dir.join(format!("{}.txt", self.ctx.config.psid_hex())),
            &name,
            &format!("{}={}", name, entry.name),
        )?;
        log::info!("[exec] Exported {} to {}", entry.dir_name, out.display());
        Ok(format!("Zip file successfully saved to {}", out.display()))
    }

    pub fn remove_save(&self, entry: &SaveEntry) -> SaveResult<()> {
        let dir = entry.local_path();
        fs::remove_dir_all(dir).at(dir)?;
        log::info!("[exec] Deleted {}", dir.display());
        Ok(())
    }

    /// Fetch a remote save zip and unpack it on `target`.
    pub fn download(&self, entry: &SaveEntry, code: &CodeEntry, target: StorageTarget) -> SaveResult<String> {
        let file = code
            .file
            .as_deref()
            .ok_or_else(|| SaveError::not_found(format!("remote file of {}", code.name)))?;
        let dest = if entry.flags.contains(SaveFlags::PS1) {
            self.ctx.paths.ps1_saves(target)
        } else {
            self.ctx.paths.backup_saves(target)
        };
        let cache = &self.ctx.paths.cache;
        fs::create_dir_all(&dest).at(&dest)?;
        fs::create_dir_all(cache).at(cache)?;

        let tmp = cache.join("tmpsave.zip");
        self.transport.download(&entry.path, file, &tmp)?;
        let extracted = extract_zip(&tmp, &dest);
        fs::remove_file(&tmp).ok();
        let files = extracted?;

        log::info!("[exec] Downloaded {}{} ({} files)", entry.path, file, files);
        Ok(format!("Save game successfully downloaded to {}", dest.display()))
    }

    /// Zip the save, upload it to the FTP mirror and list it in both the
    /// title's `saves.txt` and the platform's `games.txt`.
    pub fn upload(&self, entry: &SaveEntry) -> SaveResult<String> {
        let root = self
            .ctx
            .config
            .ftp_user_root()
            .ok_or_else(|| SaveError::not_found("FTP server is not configured"))?;
        let platform = if entry.flags.contains(SaveFlags::PS1) { "PS1/" } else { "PSP/" };
        let games_url = format!("{}{}", root, platform);
        let saves_url = format!("{}{}/", games_url, entry.title_id);
        let cache = &self.ctx.paths.cache;
        fs::create_dir_all(cache).at(cache)?;

        let index = cache.join("ftp_saves.txt");
        let saves = self.remote_text(&saves_url, "saves.txt", &index)?;
        let id = next_free_index(|i| saves.lines().any(|l| l.starts_with(&format!("{:08}.zip=", i))));
        let name = format!("{:08}.zip", id);

        let zip = cache.join(&name);
        let src = entry.local_path();
        zip_directory(src.parent().unwrap_or(src), src, &zip)?;
        let sent = self.transport.upload(&zip, &saves_url, &name);
        fs::remove_file(&zip).ok();
        sent?;

        let record = format!("{}=({}) {}", name, entry.dir_name, entry.name);
        let saves = with_record(&saves, &name, &record).unwrap_or(saves);
        fs::write(&index, saves).at(&index)?;
        self.transport.upload(&index, &saves_url, "saves.txt")?;

        let games_file = cache.join("ftp_games.txt");
        let games = self.remote_text(&games_url, "games.txt", &games_file)?;
        let record = format!("{}={}", entry.title_id, entry.name);
        if let Some(games) = with_record(&games, &entry.title_id, &record) {
            fs::write(&games_file, games).at(&games_file)?;
            self.transport.upload(&games_file, &games_url, "games.txt")?;
        }

        log::info!("[exec] Uploaded {} as {}{}", entry.dir_name, saves_url, name);
        Ok(format!("Save successfully uploaded to {}{}", saves_url, name))
    }

    /// Remote index text; one that does not exist yet reads as empty.
    fn remote_text(&self, url: &str, file: &str, local: &Path) -> SaveResult<String> {
        match self.transport.download(url, file, local) {
            Ok(()) => read_or_empty(local),
            Err(SaveError::NotFound(_)) => {
                log::debug!("[exec] No {}{} yet", url, file);
                Ok(String::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Unpack an archive next to itself, into a folder named after it.
    pub fn extract(&self, file: &str) -> SaveResult<String> {
        let src = Path::new(file);
        let dest = src.with_extension("");
        let files = extract_archive(src, &dest)?;
        Ok(format!("Extracted {} files to {}", files, dest.display()))
    }

    pub fn convert_image(&self, file: &str, compress: bool) -> SaveResult<String> {
        let src = Path::new(file);
        let (dst, size) = if compress {
            let dst = converted_path(src, "CSO");
            let size = iso_to_cso(src, &dst)?;
            (dst, size)
        } else {
            let dst = converted_path(src, "ISO");
            let size = cso_to_iso(src, &dst)?;
            (dst, size)
        };
        log::info!("[exec] Wrote {} ({} bytes)", dst.display(), size);
        Ok(format!("Image successfully saved to {}", dst.display()))
    }

    /// Download `url` into the entry's folder under its own file name.
    pub fn fetch_url(&self, entry: &SaveEntry, url: &str) -> SaveResult<String> {
        let dir = entry.local_path();
        fs::create_dir_all(dir).at(dir)?;
        let dest = dir.join(url_file_name(url));
        self.transport.download(url, "", &dest)?;
        Ok(format!("File successfully downloaded to {}", dest.display()))
    }
}
