use super::types::{SaveEntry, SaveFlags, SaveType};
use crate::error::SaveResult;
use crate::ps1card::MemoryCard;
use crate::sfo::{self, Sfo};
use std::fmt::Write;

/// Human-readable summary of a save.
pub fn save_details(entry: &SaveEntry) -> SaveResult<String> {
    let mut out = String::new();
    let _ = writeln!(out, "Path: {}", entry.path);
    let _ = writeln!(out, "Name: {}", entry.name);
    let _ = writeln!(out, "Title ID: {}", entry.title_id);
    let _ = writeln!(out, "Folder: {}", entry.dir_name);

    match entry.kind {
        SaveType::Psp => {
            let sfo = Sfo::read(&entry.local_path().join("PARAM.SFO"))?;
            let _ = writeln!(out, "Title: {}", sfo.get_str(sfo::SAVEDATA_TITLE).unwrap_or_default());
            let _ = writeln!(out, "Details: {}", sfo.get_str(sfo::SAVEDATA_DETAIL).unwrap_or_default());
            let files = sfo
                .get_bin(sfo::SAVEDATA_FILE_LIST)
                .map(sfo::file_list_names)
                .unwrap_or_default();
            let _ = writeln!(out, "Files: {}", files.join(", "));
        }
        SaveType::Ps1 if entry.flags.contains(SaveFlags::VMC) => {
            let card = MemoryCard::open(entry.local_path())?;
            let slot = card.slot(entry.blocks as usize)?;
            let _ = writeln!(out, "Slot: {}", slot.slot);
            let _ = writeln!(out, "Blocks: {}", slot.blocks);
            let _ = writeln!(out, "File: {}", slot.file_name);
        }
        _ => {}
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sfo::psp_save_sfo;

    #[test]
    fn test_psp_details_read_sfo() {
        let dir = tempfile::tempdir().unwrap();
        let mut sfo = psp_save_sfo("ULUS10041DATA00", "Game", &["DATA.BIN"]);
        sfo.set_str(sfo::SAVEDATA_TITLE, "Chapter 3").unwrap();
        sfo.write(&dir.path().join("PARAM.SFO")).unwrap();

        let mut e = SaveEntry::new(SaveType::Psp, SaveFlags::PSP, "Game");
        e.path = dir.path().to_string_lossy().into_owned();
        let text = save_details(&e).unwrap();
        assert!(text.contains("Title: Chapter 3"));
        assert!(text.contains("Files: DATA.BIN"));
    }
}
