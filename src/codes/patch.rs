use crate::error::{IoContext, SaveError, SaveResult};
use crate::saves::{CodeEntry, OptionList, PatchKind};
use regex::{Regex, RegexBuilder};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

/// Parses patch descriptions into cheat codes and applies them to
/// decrypted files.
pub trait PatchEngine {
    /// Append the cheats described by `text` to `codes`; returns how many were
    /// added. `file_options` lists the candidates for wildcard targets.
    fn load_codes(
        &self,
        text: &str,
        codes: &mut Vec<CodeEntry>,
        file_options: &dyn Fn(&Path, &str) -> OptionList,
        save_path: &Path,
    ) -> usize;

    fn apply(&self, file: &Path, code: &CodeEntry) -> SaveResult<()>;
}

static GAME_GENIE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9A-Fa-f]{8})\s+([0-9A-Fa-f]{8})$").unwrap());

static BSD_WRITE: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r#"^write\s+(at|next)\s+0x([0-9a-f]+)\s*:\s*"([0-9a-f]*)"$"#)
        .case_insensitive(true)
        .build()
        .unwrap()
});

static BSD_SEARCH: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r#"^search\s+"([0-9a-f]+)"$"#)
        .case_insensitive(true)
        .build()
        .unwrap()
});

/// Default `.savepatch` engine.
///
/// ```text
/// ; comment
/// :DATA*.BIN
/// [Max Money]
/// 2000A0C4 05F5E0FF
/// [Unlock Stages]
/// search "53544147"
/// write next 0x8:"FFFF"
/// ```
///
/// `:<file>` sets the target of the cheats that follow; `[<name>]` starts a
/// cheat. A cheat made only of `TAAAAAAA VVVVVVVV` lines is a Game Genie code
/// (T: 0 byte, 1 u16, 2 u32, little endian, offset = low 24 bits of the
/// address word); anything else is a BSD script.
#[derive(Debug, Default, Clone, Copy)]
pub struct SavePatchEngine;

struct Pending {
    name: String,
    body: Vec<String>,
}

fn finish(
    pending: Option<Pending>,
    target: Option<&str>,
    codes: &mut Vec<CodeEntry>,
    file_options: &dyn Fn(&Path, &str) -> OptionList,
    save_path: &Path,
) -> usize {
    let Some(Pending { name, body }) = pending else {
        return 0;
    };
    if body.is_empty() {
        log::warn!("[patch] [{}] has no lines, skipped", name);
        return 0;
    }
    let kind = if body.iter().all(|l| GAME_GENIE.is_match(l)) {
        PatchKind::GameGenie
    } else {
        PatchKind::Bsd
    };
    let mut code = CodeEntry {
        name,
        kind,
        file: target.map(str::to_string),
        body: body.join("\n"),
        ..Default::default()
    };
    if let Some(mask) = target.filter(|t| t.contains('*') || t.contains('?')) {
        code.options.push(file_options(save_path, mask));
    }
    codes.push(code);
    1
}

fn write_at(data: &mut [u8], offset: usize, bytes: &[u8]) -> SaveResult<()> {
    let end = offset
        .checked_add(bytes.len())
        .filter(|&end| end <= data.len())
        .ok_or_else(|| SaveError::format(format!("patch writes past end of file at 0x{:X}", offset)))?;
    data[offset..end].copy_from_slice(bytes);
    Ok(())
}

fn apply_game_genie(data: &mut [u8], body: &str) -> SaveResult<()> {
    for line in body.lines() {
        let caps = GAME_GENIE
            .captures(line.trim())
            .ok_or_else(|| SaveError::format(format!("bad Game Genie line: {}", line)))?;
        let addr = u32::from_str_radix(&caps[1], 16).map_err(|e| SaveError::format(e.to_string()))?;
        let value = u32::from_str_radix(&caps[2], 16).map_err(|e| SaveError::format(e.to_string()))?;
        let offset = (addr & 0x00FF_FFFF) as usize;
        match addr >> 28 {
            0 => write_at(data, offset, &[value as u8])?,
            1 => write_at(data, offset, &(value as u16).to_le_bytes())?,
            2 => write_at(data, offset, &value.to_le_bytes())?,
            t => return Err(SaveError::format(format!("unsupported Game Genie type {}", t))),
        }
    }
    Ok(())
}

fn apply_bsd(data: &mut [u8], body: &str) -> SaveResult<()> {
    let mut cursor = 0usize;
    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(caps) = BSD_SEARCH.captures(line) {
            let needle = hex::decode(&caps[1]).map_err(|e| SaveError::format(e.to_string()))?;
            cursor = data
                .windows(needle.len())
                .position(|w| w == needle.as_slice())
                .ok_or_else(|| SaveError::not_found(format!("pattern {}", &caps[1])))?;
        } else if let Some(caps) = BSD_WRITE.captures(line) {
            let offset = usize::from_str_radix(&caps[2], 16).map_err(|e| SaveError::format(e.to_string()))?;
            let bytes = hex::decode(&caps[3]).map_err(|e| SaveError::format(e.to_string()))?;
            let base = if caps[1].eq_ignore_ascii_case("next") { cursor } else { 0 };
            let at = base
                .checked_add(offset)
                .ok_or_else(|| SaveError::format(format!("patch offset overflows: {}", line)))?;
            write_at(data, at, &bytes)?;
        } else {
            return Err(SaveError::format(format!("unknown patch command: {}", line)));
        }
    }
    Ok(())
}

impl PatchEngine for SavePatchEngine {
    fn load_codes(
        &self,
        text: &str,
        codes: &mut Vec<CodeEntry>,
        file_options: &dyn Fn(&Path, &str) -> OptionList,
        save_path: &Path,
    ) -> usize {
        let mut added = 0;
        let mut target: Option<String> = None;
        let mut pending: Option<Pending> = None;

        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            if let Some(file) = line.strip_prefix(':') {
                added += finish(pending.take(), target.as_deref(), codes, file_options, save_path);
                target = Some(file.trim().to_string());
            } else if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                added += finish(pending.take(), target.as_deref(), codes, file_options, save_path);
                pending = Some(Pending {
                    name: name.trim().to_string(),
                    body: Vec::new(),
                });
            } else if let Some(p) = pending.as_mut() {
                p.body.push(line.to_string());
            } else {
                log::debug!("[patch] Ignoring stray line: {}", line);
            }
        }
        added += finish(pending, target.as_deref(), codes, file_options, save_path);

        log::info!("[patch] Loaded {} cheats", added);
        added
    }

    fn apply(&self, file: &Path, code: &CodeEntry) -> SaveResult<()> {
        let mut data = fs::read(file).at(file)?;
        match code.kind {
            PatchKind::GameGenie => apply_game_genie(&mut data, &code.body)?,
            PatchKind::Bsd => apply_bsd(&mut data, &code.body)?,
            other => return Err(SaveError::format(format!("{:?} is not a cheat", other))),
        }
        fs::write(file, data).at(file)?;
        log::info!("[patch] Applied [{}] to {}", code.name, file.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::file_options;

    const THREE_CHEATS: &str = "\
; Sample patch
:DATA.BIN
[Max Money]
2000A0C4 05F5E0FF
[Max Items]
0000A100 00000063
1000A102 0000270F
[Unlock Stages]
search \"53544147\"
write next 0x4:\"FFFF\"
";

    fn load(text: &str, save: &Path) -> Vec<CodeEntry> {
        let mut codes = Vec::new();
        SavePatchEngine.load_codes(text, &mut codes, &|d, m| file_options(d, m, None), save);
        codes
    }

    // ── load_codes ──

    #[test]
    fn test_three_cheats_none_activated() {
        let codes = load(THREE_CHEATS, Path::new("/nowhere"));
        assert_eq!(codes.len(), 3);
        assert!(codes.iter().all(|c| !c.activated));
        assert_eq!(codes[0].kind, PatchKind::GameGenie);
        assert_eq!(codes[1].kind, PatchKind::GameGenie);
        assert_eq!(codes[2].kind, PatchKind::Bsd);
        assert!(codes.iter().all(|c| c.file.as_deref() == Some("DATA.BIN")));
        assert!(codes.iter().all(|c| c.options.is_empty()));
    }

    #[test]
    fn test_wildcard_target_gets_file_options() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("SLOT1.BIN"), b"x").unwrap();
        fs::write(dir.path().join("SLOT2.BIN"), b"x").unwrap();
        let codes = load(":SLOT*.BIN\n[Cheat]\n00000000 00000001\n", dir.path());
        assert_eq!(codes[0].options.len(), 1);
        assert_eq!(codes[0].options[0].items.len(), 2);
    }

    #[test]
    fn test_empty_cheat_is_skipped() {
        let codes = load("[Nothing]\n[Real]\n00000000 00000001\n", Path::new("/x"));
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].name, "Real");
        assert_eq!(codes[0].file, None);
    }

    // ── apply ──

    #[test]
    fn test_game_genie_writes_little_endian() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("DATA.BIN");
        fs::write(&file, vec![0u8; 16]).unwrap();
        let codes = load(":DATA.BIN\n[a]\n00000001 000000AB\n10000004 00001234\n20000008 11223344\n", dir.path());
        SavePatchEngine.apply(&file, &codes[0]).unwrap();
        let data = fs::read(&file).unwrap();
        assert_eq!(data[1], 0xAB);
        assert_eq!(&data[4..6], &[0x34, 0x12]);
        assert_eq!(&data[8..12], &[0x44, 0x33, 0x22, 0x11]);
    }

    #[test]
    fn test_bsd_search_then_write_next() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("DATA.BIN");
        fs::write(&file, b"....STAG\0\0\0\0\0\0..").unwrap();
        let codes = load(THREE_CHEATS, dir.path());
        SavePatchEngine.apply(&file, &codes[2]).unwrap();
        let data = fs::read(&file).unwrap();
        assert_eq!(&data[8..10], &[0xFF, 0xFF]);
    }

    #[test]
    fn test_write_past_end_fails_and_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("DATA.BIN");
        fs::write(&file, vec![7u8; 4]).unwrap();
        let codes = load(":DATA.BIN\n[a]\n20000002 FFFFFFFF\n", dir.path());
        let err = SavePatchEngine.apply(&file, &codes[0]).unwrap_err();
        assert!(matches!(err, SaveError::FormatInvalid(_)));
        assert_eq!(fs::read(&file).unwrap(), vec![7u8; 4]);
    }

    #[test]
    fn test_missing_pattern_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("DATA.BIN");
        fs::write(&file, b"nothing here").unwrap();
        let codes = load(THREE_CHEATS, dir.path());
        assert!(matches!(
            SavePatchEngine.apply(&file, &codes[2]),
            Err(SaveError::NotFound(_))
        ));
    }

    #[test]
    fn test_write_next_offset_overflow_is_format_error() {
        let mut data = b"....STAG....".to_vec();
        let body = "search \"53544147\"\nwrite next 0xFFFFFFFFFFFFFFFF : \"00\"";
        let err = apply_bsd(&mut data, body).unwrap_err();
        assert!(matches!(err, SaveError::FormatInvalid(_)));
        assert_eq!(data, b"....STAG....".to_vec());
    }
}
