use super::patch::PatchEngine;
use super::pure::{file_options, list_files, storage_options};
use crate::archive::is_archive;
use crate::config::{AppContext, SortMode};
use crate::error::SaveResult;
use crate::net::{Transport, fetch_cached};
use crate::paths::StorageTarget;
use crate::saves::{
    CodeEntry, Command, OptionList, OptionValue, Opcode, PatchKind, SaveEntry, SaveFlags, SaveType, sort_codes,
};
use std::fs;
use std::path::Path;

/// Assembles the code list of one entry.
pub struct CodeBuilder<'a> {
    ctx: &'a AppContext,
    engine: &'a dyn PatchEngine,
    transport: &'a dyn Transport,
}

fn cmd(name: impl Into<String>, command: Command) -> CodeEntry {
    CodeEntry::command(name, Opcode::new(command))
}

fn files(dir: &Path, mask: &str, opcode: Opcode) -> OptionList {
    file_options(dir, mask, Some(opcode))
}

impl<'a> CodeBuilder<'a> {
    pub fn new(ctx: &'a AppContext, engine: &'a dyn PatchEngine, transport: &'a dyn Transport) -> Self {
        Self { ctx, engine, transport }
    }

    /// Build and store the codes of `entry`; returns how many it has.
    pub fn attach(&self, entry: &mut SaveEntry) -> SaveResult<usize> {
        entry.codes = self.build(entry)?;
        Ok(entry.codes.len())
    }

    pub fn build(&self, entry: &SaveEntry) -> SaveResult<Vec<CodeEntry>> {
        let codes = match entry.kind {
            SaveType::Menu => self.menu_codes(entry),
            SaveType::Psp => self.save_codes(entry),
            SaveType::Ps1 if entry.flags.contains(SaveFlags::VMC) => self.vmc_slot_codes(),
            SaveType::Ps1 => self.save_codes(entry),
            SaveType::Null if entry.flags.contains(SaveFlags::ONLINE) => self.online_codes(entry)?,
            SaveType::Zip => self.archive_codes(entry),
            SaveType::Iso => self.image_codes(entry, "*.ISO", Command::ConvIso2Cso),
            SaveType::Cso => self.image_codes(entry, "*.CSO", Command::ConvCso2Iso),
            SaveType::Net => vec![
                cmd("URL link Downloader (http, https)", Command::UrlDownload),
                cmd("Local Web Server (full system access)", Command::NetWebserver),
            ],
            SaveType::Prx => vec![
                CodeEntry::command(
                    "Install Save-game Key Dumper plugin",
                    Opcode::with_arg(Command::SetupPlugin, 1),
                ),
                CodeEntry::command(
                    "Disable Save-game Key Dumper plugin",
                    Opcode::with_arg(Command::SetupPlugin, 0),
                ),
            ],
            SaveType::Vmc | SaveType::Null => Vec::new(),
        };
        log::debug!("[codes] {} codes for {}", codes.len(), entry.name);
        Ok(codes)
    }

    fn user_label(&self) -> &'static str {
        match self.ctx.user_storage() {
            StorageTarget::Ef0 => "ef0",
            _ => "ms0",
        }
    }

    /// File operations shared by every local save, then the format extras and
    /// cheats.
    fn save_codes(&self, entry: &SaveEntry) -> Vec<CodeEntry> {
        let path = entry.local_path();
        let mut codes = vec![
            cmd("Apply Changes", Command::ResignSave),
            cmd("View Save Details", Command::ViewDetails),
            CodeEntry::header("File Backup"),
        ];

        let mut copy = storage_options("Copy Save to Backup Storage", Command::CopySaveUsb);
        if !entry.flags.contains(SaveFlags::HDD) {
            copy.push(
                format!("Copy Save to Memory Stick ({}:/PSP)", self.user_label()),
                OptionValue::Opcode(Opcode::new(Command::CopySaveHdd)),
            );
        }
        codes.push(cmd("Copy save game", Command::Null).with_options(copy));
        codes.push(
            cmd("Export save game to Zip", Command::Null)
                .with_options(storage_options("Export Zip to Backup Storage", Command::ExportZipUsb)),
        );
        codes.push(
            cmd("Export decrypted save files", Command::Null)
                .with_options(files(path, "*", Opcode::new(Command::DecryptFile))),
        );
        codes.push(
            cmd("Import decrypted save files", Command::Null)
                .with_options(files(path, "*", Opcode::new(Command::ImportDataFile))),
        );
        codes.push(
            cmd("Hex Edit save game files", Command::Null)
                .with_options(files(path, "*", Opcode::new(Command::HexEditFile))),
        );
        codes.push(cmd("Delete save game", Command::DeleteSave));
        if self.ctx.config.ftp_user_root().is_some() && !entry.flags.contains(SaveFlags::FTP) {
            codes.push(cmd("Upload save game to FTP", Command::UploadSave));
        }
        codes.push(CodeEntry {
            kind: PatchKind::Sfo,
            ..cmd("Change Title ID", Command::ChangeTitleId)
        });

        if entry.flags.contains(SaveFlags::PS1) {
            self.ps1_codes(entry, &mut codes);
        } else {
            codes.push(CodeEntry::header("Game Key Backup"));
            codes.push(cmd("Export binary Game Key", Command::ExpPspKey));
            codes.push(cmd("Dump Game Key (text file)", Command::DumpPspKey));
        }

        self.cheat_codes(entry, &mut codes);
        codes
    }

    fn ps1_codes(&self, entry: &SaveEntry, codes: &mut Vec<CodeEntry>) {
        let path = entry.local_path();
        let images = self.ctx.paths.ps1_images(self.ctx.user_storage(), &entry.title_id);

        codes.push(CodeEntry::header("VMP Memory Cards"));
        codes.push(
            cmd("Resign Memory Card", Command::Null)
                .with_options(files(path, "*.VMP", Opcode::new(Command::ResignVmp))),
        );
        codes.push(
            cmd("Export Memory Card to .MCR", Command::Null)
                .with_options(files(path, "*.VMP", Opcode::new(Command::ExpVmp2Mcr))),
        );
        for slot in 0..2u8 {
            codes.push(
                cmd(format!("Import .MCR files to SCEVMC{}.VMP", slot), Command::Null)
                    .with_options(files(&images, "*.MCR", Opcode::with_arg(Command::ImpMcr2Vmp, slot))),
            );
        }
    }

    /// Cheats from `DATA/<title>.savepatch`; a missing file adds nothing.
    fn cheat_codes(&self, entry: &SaveEntry, codes: &mut Vec<CodeEntry>) {
        let patch = self.ctx.paths.patch_file(&entry.title_id);
        let Ok(text) = fs::read_to_string(&patch) else {
            return;
        };
        codes.push(CodeEntry::header("Cheats"));
        codes.push(
            cmd("View Raw Patch File", Command::ViewRawPatch).with_file(patch.to_string_lossy()),
        );
        log::info!("[codes] Loading cheats from {}", patch.display());
        self.engine.load_codes(
            &text,
            codes,
            &|dir: &Path, mask: &str| file_options(dir, mask, None),
            entry.local_path(),
        );
    }

    fn vmc_slot_codes(&self) -> Vec<CodeEntry> {
        vec![
            cmd("View Save Details", Command::ViewDetails),
            CodeEntry::header("Save Backup"),
            cmd("Export save game (.mcs)", Command::Null)
                .with_options(storage_options("Export to Backup Storage", Command::ExpVmcSave)),
            cmd("Delete save game", Command::DeleteSave),
        ]
    }

    fn menu_codes(&self, entry: &SaveEntry) -> Vec<CodeEntry> {
        if entry.flags.contains(SaveFlags::VMC) {
            return self.vmc_menu_codes();
        }

        let mut codes = if entry.flags.contains(SaveFlags::HDD) {
            vec![
                cmd("Copy selected Saves to Backup Storage", Command::Null)
                    .with_options(storage_options("Copy Saves to Backup Storage", Command::CopySavesUsb)),
                cmd("Copy all Saves to Backup Storage", Command::Null)
                    .with_options(storage_options("Copy Saves to Backup Storage", Command::CopyAllSavesUsb)),
            ]
        } else {
            let user = self.user_label();
            vec![
                cmd(format!("Copy selected Saves to Memory Stick ({}:/PSP)", user), Command::CopySavesHdd),
                cmd(format!("Copy all Saves to Memory Stick ({}:/PSP)", user), Command::CopyAllSavesHdd),
            ]
        };
        codes.push(cmd("Resign selected Saves", Command::ResignSaves));
        codes.push(cmd("Resign all Saves", Command::ResignAllSaves));
        codes.push(cmd("Start local Web Server", Command::SaveWebserver));
        codes.push(cmd("Export all Save-game Keys", Command::DumpFingerprints));
        codes
    }

    fn vmc_menu_codes(&self) -> Vec<CodeEntry> {
        let mut codes = vec![
            cmd("Export selected Saves to Backup Storage", Command::Null)
                .with_options(storage_options("Export Saves to Backup Storage", Command::ExpSavesVmc)),
            cmd("Export all Saves to Backup Storage", Command::Null)
                .with_options(storage_options("Export Saves to Backup Storage", Command::ExpAllSavesVmc)),
            CodeEntry::header("Import Saves"),
        ];
        let dir = self.ctx.paths.ps1_saves(self.ctx.user_storage());
        for name in list_files(&dir, "*.mcs") {
            codes.push(
                cmd(format!("Import {}", name), Command::ImpVmcSave).with_file(dir.join(&name).to_string_lossy()),
            );
        }
        codes
    }

    /// One download per `<12-char file>=<name>` line of the remote `saves.txt`.
    fn online_codes(&self, entry: &SaveEntry) -> SaveResult<Vec<CodeEntry>> {
        let cache = self.ctx.paths.cache.join(format!("{}.txt", entry.title_id));
        fetch_cached(
            self.transport,
            &entry.path,
            "saves.txt",
            &cache,
            self.ctx.config.uses_default_db(),
        )?;
        let text = fs::read_to_string(&cache).unwrap_or_default();

        let mut codes = Vec::new();
        for line in text.lines() {
            let (Some(file), Some(b'=')) = (line.get(..12), line.as_bytes().get(12)) else {
                continue;
            };
            let mut options = storage_options("Download to Backup Storage", Command::DownloadUsb);
            options.push(
                "Download to Memory Stick (ms0:/PSP)",
                OptionValue::Opcode(Opcode::with_arg(Command::DownloadUsb, StorageTarget::Ms0Psp.byte())),
            );
            codes.push(
                cmd(line[13..].trim(), Command::Null)
                    .with_file(file)
                    .with_options(options),
            );
        }
        if self.ctx.config.sort != SortMode::Disabled {
            sort_codes(&mut codes);
        }
        log::info!("[codes] Loaded {} online saves for {}", codes.len(), entry.title_id);
        Ok(codes)
    }

    fn archive_codes(&self, entry: &SaveEntry) -> Vec<CodeEntry> {
        let dir = entry.local_path();
        list_files(dir, "*")
            .into_iter()
            .filter(|name| is_archive(name))
            .map(|name| {
                cmd(format!("Extract {}", name), Command::ExtractArchive)
                    .with_file(dir.join(&name).to_string_lossy())
            })
            .collect()
    }

    fn image_codes(&self, entry: &SaveEntry, mask: &str, command: Command) -> Vec<CodeEntry> {
        let dir = entry.local_path();
        list_files(dir, mask)
            .into_iter()
            .map(|name| cmd(format!("Convert {}", name), command).with_file(dir.join(&name).to_string_lossy()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::SavePatchEngine;
    use crate::config::AppConfig;
    use crate::net::mock::MockTransport;
    use crate::paths::AppPaths;

    fn ctx(root: &Path) -> AppContext {
        AppContext::new(AppConfig::default(), AppPaths::new(root))
    }

    fn psp_save(root: &Path) -> SaveEntry {
        let dir = root.join("ms0/PSP/SAVEDATA/ULUS10041DATA00");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("DATA.BIN"), b"x").unwrap();
        fs::write(dir.join("PARAM.SFO"), b"x").unwrap();
        let mut e = SaveEntry::new(SaveType::Psp, SaveFlags::PSP | SaveFlags::HDD, "Game");
        e.title_id = "ULUS10041".into();
        e.dir_name = "ULUS10041DATA00".into();
        e.path = dir.to_string_lossy().into_owned();
        e
    }

    fn names(codes: &[CodeEntry]) -> Vec<&str> {
        codes.iter().map(|c| c.name.as_str()).collect()
    }

    // ── save codes ──

    #[test]
    fn test_psp_core_set_without_patch_file() {
        let root = tempfile::tempdir().unwrap();
        let ctx = ctx(root.path());
        let t = MockTransport::default();
        let entry = psp_save(root.path());
        let codes = CodeBuilder::new(&ctx, &SavePatchEngine, &t).build(&entry).unwrap();

        let n = names(&codes);
        assert_eq!(n[0], "Apply Changes");
        assert!(n.contains(&"Export binary Game Key"));
        assert!(!n.contains(&"View Raw Patch File"));
        assert!(!n.contains(&"Upload save game to FTP"));

        let copy = codes.iter().find(|c| c.name == "Copy save game").unwrap();
        assert_eq!(copy.options[0].items.len(), 2);
        let export = codes.iter().find(|c| c.name == "Export decrypted save files").unwrap();
        let labels: Vec<_> = export.options[0].items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["DATA.BIN"]);
    }

    #[test]
    fn test_backup_copy_offers_memory_stick() {
        let root = tempfile::tempdir().unwrap();
        let ctx = ctx(root.path());
        let t = MockTransport::default();
        let mut entry = psp_save(root.path());
        entry.flags.remove(SaveFlags::HDD);
        let codes = CodeBuilder::new(&ctx, &SavePatchEngine, &t).build(&entry).unwrap();
        let copy = codes.iter().find(|c| c.name == "Copy save game").unwrap();
        assert_eq!(copy.options[0].items.len(), 3);
        assert_eq!(
            copy.options[0].items[2].value,
            OptionValue::Opcode(Opcode::new(Command::CopySaveHdd))
        );
    }

    #[test]
    fn test_patch_file_adds_cheats() {
        let root = tempfile::tempdir().unwrap();
        let ctx = ctx(root.path());
        fs::create_dir_all(&ctx.paths.data).unwrap();
        fs::write(
            ctx.paths.patch_file("ULUS10041"),
            ":DATA.BIN\n[A]\n00000000 00000001\n[B]\n00000001 00000001\n[C]\n00000002 00000001\n",
        )
        .unwrap();
        let t = MockTransport::default();
        let entry = psp_save(root.path());
        let codes = CodeBuilder::new(&ctx, &SavePatchEngine, &t).build(&entry).unwrap();

        let cheats: Vec<_> = codes.iter().filter(|c| c.is_cheat()).collect();
        assert_eq!(cheats.len(), 3);
        assert!(cheats.iter().all(|c| !c.activated));
        assert!(names(&codes).contains(&"View Raw Patch File"));
    }

    #[test]
    fn test_ps1_save_gets_card_codes() {
        let root = tempfile::tempdir().unwrap();
        let ctx = ctx(root.path());
        let t = MockTransport::default();
        let mut entry = psp_save(root.path());
        entry.flags = SaveFlags::PS1 | SaveFlags::HDD;
        fs::write(entry.local_path().join("SCEVMC0.VMP"), b"x").unwrap();
        let codes = CodeBuilder::new(&ctx, &SavePatchEngine, &t).build(&entry).unwrap();

        let resign = codes.iter().find(|c| c.name == "Resign Memory Card").unwrap();
        assert_eq!(resign.options[0].items[0].label, "SCEVMC0.VMP");
        let import = codes.iter().find(|c| c.name == "Import .MCR files to SCEVMC1.VMP").unwrap();
        assert_eq!(import.options[0].items[0].value, OptionValue::Disabled);
        assert!(!names(&codes).contains(&"Export binary Game Key"));
    }

    // ── online codes ──

    #[test]
    fn test_online_codes_parse_saves_index() {
        let root = tempfile::tempdir().unwrap();
        let ctx = ctx(root.path());
        let t = MockTransport::default().serve(
            "http://db/PSP/ULUS10041/saves.txt",
            b"00000001.zip=100% Complete\nbad line\n00000002.zip=Start\n00000003.zip=alpha\n",
        );
        let mut entry = SaveEntry::new(SaveType::Null, SaveFlags::PSP | SaveFlags::ONLINE, "Game");
        entry.title_id = "ULUS10041".into();
        entry.path = "http://db/PSP/ULUS10041/".into();

        let codes = CodeBuilder::new(&ctx, &SavePatchEngine, &t).build(&entry).unwrap();
        assert_eq!(names(&codes), vec!["100% Complete", "alpha", "Start"]);
        assert_eq!(codes[0].file.as_deref(), Some("00000001.zip"));
        assert_eq!(codes[0].options[0].items.len(), 3);
        assert!(ctx.paths.cache.join("ULUS10041.txt").exists());
    }

    // ── menus and tools ──

    #[test]
    fn test_menu_codes_follow_list_origin() {
        let root = tempfile::tempdir().unwrap();
        let ctx = ctx(root.path());
        let t = MockTransport::default();
        let b = CodeBuilder::new(&ctx, &SavePatchEngine, &t);

        let hdd = b.build(&SaveEntry::new(SaveType::Menu, SaveFlags::PSP | SaveFlags::HDD, "Bulk")).unwrap();
        assert_eq!(hdd[0].effective_opcode().command, Command::Null);
        assert_eq!(hdd[0].options[0].items.len(), 2);
        let usb = b.build(&SaveEntry::new(SaveType::Menu, SaveFlags::PSP, "Bulk")).unwrap();
        assert_eq!(usb[0].opcode.command, Command::CopySavesHdd);
    }

    #[test]
    fn test_iso_tool_lists_images() {
        let root = tempfile::tempdir().unwrap();
        let ctx = ctx(root.path());
        let iso = ctx.paths.iso_dir();
        fs::create_dir_all(&iso).unwrap();
        fs::write(iso.join("GAME.ISO"), b"x").unwrap();
        fs::write(iso.join("OTHER.CSO"), b"x").unwrap();
        let mut entry = SaveEntry::new(SaveType::Iso, SaveFlags::PSP, "Compress");
        entry.path = iso.to_string_lossy().into_owned();

        let t = MockTransport::default();
        let codes = CodeBuilder::new(&ctx, &SavePatchEngine, &t).build(&entry).unwrap();
        assert_eq!(names(&codes), vec!["Convert GAME.ISO"]);
        assert_eq!(codes[0].opcode.command, Command::ConvIso2Cso);
    }
}
