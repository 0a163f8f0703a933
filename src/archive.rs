//! Zip export and archive extraction.

use crate::error::{IoContext, SaveError, SaveResult};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;
use walkdir::WalkDir;
use zip::ZipArchive;
use zip::write::SimpleFileOptions;

/// Zip `dir` into `out`, storing paths relative to `base`.
///
/// Returns the number of files stored. A partially written archive is removed.
pub fn zip_directory(base: &Path, dir: &Path, out: &Path) -> SaveResult<usize> {
    if !dir.is_dir() {
        return Err(SaveError::not_found(dir.display().to_string()));
    }
    let file = File::create(out).at(out)?;
    let result = write_zip(base, dir, file);
    if result.is_err() {
        fs::remove_file(out).ok();
    }
    result
}

fn write_zip(base: &Path, dir: &Path, file: File) -> SaveResult<usize> {
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let mut count = 0;

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(base)
            .map_err(|_| SaveError::format(format!("{} is outside {}", entry.path().display(), base.display())))?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let name = rel.to_string_lossy().replace('\\', "/");

        if entry.file_type().is_dir() {
            zip.add_directory(name, options)?;
        } else {
            zip.start_file(name, options)?;
            let mut src = File::open(entry.path()).at(entry.path())?;
            io::copy(&mut src, &mut zip)?;
            count += 1;
        }
    }

    zip.finish()?;
    Ok(count)
}

/// Extract a zip archive to `dest`, returning the number of files written.
/// Entries that would escape `dest` are skipped.
pub fn extract_zip(zip_path: &Path, dest: &Path) -> SaveResult<usize> {
    let file = File::open(zip_path).at(zip_path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;
    fs::create_dir_all(dest).at(dest)?;
    let mut count = 0;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let outpath = match file.enclosed_name() {
            Some(path) => dest.join(path),
            None => {
                log::warn!("[archive] Skipping unsafe entry {}", file.name());
                continue;
            }
        };

        if file.is_dir() {
            fs::create_dir_all(&outpath).at(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent).at(parent)?;
            }
            let mut outfile = File::create(&outpath).at(&outpath)?;
            io::copy(&mut file, &mut outfile)?;
            count += 1;
        }
    }

    log::info!("[archive] Extracted {} files from {}", count, zip_path.display());
    Ok(count)
}

/// Extract any supported archive by extension.
pub fn extract_archive(file: &Path, dest: &Path) -> SaveResult<usize> {
    let ext = file
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "zip" => extract_zip(file, dest),
        "rar" | "7z" => Err(SaveError::format(format!("{} archives are not supported", ext))),
        _ => Err(SaveError::format(format!("unknown archive type: {}", file.display()))),
    }
}

pub fn is_archive(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.ends_with(".zip") || lower.ends_with(".rar") || lower.ends_with(".7z")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_save(root: &Path) -> std::path::PathBuf {
        let save = root.join("ULUS10041DATA00");
        fs::create_dir_all(&save).unwrap();
        fs::write(save.join("PARAM.SFO"), b"sfo").unwrap();
        fs::write(save.join("DATA.BIN"), vec![7u8; 4096]).unwrap();
        save
    }

    #[test]
    fn test_zip_then_extract() {
        let dir = tempfile::tempdir().unwrap();
        let save = sample_save(dir.path());
        let out = dir.path().join("out.zip");

        assert_eq!(zip_directory(dir.path(), &save, &out).unwrap(), 2);

        let dest = dir.path().join("restored");
        assert_eq!(extract_zip(&out, &dest).unwrap(), 2);
        assert_eq!(
            fs::read(dest.join("ULUS10041DATA00/DATA.BIN")).unwrap(),
            vec![7u8; 4096]
        );
    }

    #[test]
    fn test_unwritable_target_fails_and_keeps_source() {
        let dir = tempfile::tempdir().unwrap();
        let save = sample_save(dir.path());
        // A regular file where a directory is expected cannot be written into
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();

        let err = zip_directory(dir.path(), &save, &blocker.join("out.zip"));
        assert!(err.is_err());
        assert_eq!(fs::read(save.join("PARAM.SFO")).unwrap(), b"sfo");
        assert_eq!(fs::read_dir(&save).unwrap().count(), 2);
    }

    #[test]
    fn test_rar_is_unsupported() {
        let err = extract_archive(Path::new("/tmp/a.RAR"), Path::new("/tmp")).unwrap_err();
        assert!(matches!(err, SaveError::FormatInvalid(_)));
    }
}
