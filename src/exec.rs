//! Command dispatcher - runs one code of one save and reports one outcome.
//!
//! `Operations` holds the non-interactive collaborators and does the work;
//! `Dispatcher` adds the front end for confirmations, text input, hex edits
//! and the web server, and maps every result to an `Outcome`.

mod cards;
mod files;
mod pure;
mod storage;

pub use pure::{export_zip_name, is_title_id, next_free_index, vmc_export_name};

use crate::bulk::{self, Selection};
use crate::codes::PatchEngine;
use crate::config::AppContext;
use crate::crypto::{KeyChain, SavedataCrypto};
use crate::error::{IoContext, SaveError, SaveResult};
use crate::frontend::Frontend;
use crate::net::Transport;
use crate::paths::StorageTarget;
use crate::plugin;
use crate::saves::{CodeEntry, Command, SaveEntry, SaveFlags, SaveList, SaveType, save_details};
use crate::webserver::{self, CatalogRouter, FileRouter};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    Failure,
    /// Content was changed but the final resign failed.
    Unsigned,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub kind: OutcomeKind,
    pub message: String,
}

impl Outcome {
    fn from_result(result: SaveResult<String>) -> Self {
        let (kind, message) = match result {
            Ok(message) => (OutcomeKind::Success, message),
            Err(SaveError::Declined) => (OutcomeKind::Declined, "Operation cancelled".to_string()),
            Err(e @ SaveError::Unsigned(_)) => (OutcomeKind::Unsigned, format!("Warning: {}", e)),
            Err(e) => (OutcomeKind::Failure, format!("Error: {}", e)),
        };
        Self { kind, message }
    }

    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }
}

/// Collaborators shared by every operation; none of them talk to the user.
#[derive(Clone, Copy)]
pub struct Operations<'a> {
    ctx: &'a AppContext,
    transport: &'a dyn Transport,
    crypto: &'a dyn SavedataCrypto,
    keys: &'a KeyChain,
    engine: &'a dyn PatchEngine,
}

impl<'a> Operations<'a> {
    pub fn new(
        ctx: &'a AppContext,
        transport: &'a dyn Transport,
        crypto: &'a dyn SavedataCrypto,
        keys: &'a KeyChain,
        engine: &'a dyn PatchEngine,
    ) -> Self {
        Self {
            ctx,
            transport,
            crypto,
            keys,
            engine,
        }
    }
}

fn storage_arg(arg: u8) -> SaveResult<StorageTarget> {
    StorageTarget::from_byte(arg).ok_or_else(|| SaveError::format(format!("unknown storage target {}", arg)))
}

fn selected_file(code: &CodeEntry) -> SaveResult<&str> {
    code.selected_label()
        .ok_or_else(|| SaveError::not_found(format!("no file selected for {}", code.name)))
}

fn code_file(code: &CodeEntry) -> SaveResult<&str> {
    code.file
        .as_deref()
        .ok_or_else(|| SaveError::not_found(format!("no file attached to {}", code.name)))
}

fn selection(command: Command) -> Selection {
    match command {
        Command::CopyAllSavesUsb
        | Command::CopyAllSavesHdd
        | Command::ResignAllSaves
        | Command::ExpAllSavesVmc
        | Command::DumpFingerprints => Selection::All,
        _ => Selection::Selected,
    }
}

fn is_psp_save(e: &SaveEntry) -> bool {
    e.kind == SaveType::Psp
}

fn is_card_slot(e: &SaveEntry) -> bool {
    e.kind == SaveType::Ps1 && e.flags.contains(SaveFlags::VMC)
}

pub struct Dispatcher<'a> {
    ops: Operations<'a>,
    frontend: &'a mut dyn Frontend,
}

impl<'a> Dispatcher<'a> {
    pub fn new(ops: Operations<'a>, frontend: &'a mut dyn Frontend) -> Self {
        Self { ops, frontend }
    }

    /// Run code `code_index` of entry `index`. The code is always left
    /// deactivated and the outcome is always shown to the user.
    pub fn execute(&mut self, list: &mut SaveList, index: usize, code_index: usize) -> Outcome {
        let result = match list.entries.get(index).and_then(|e| e.codes.get(code_index)) {
            Some(code) => {
                let code = code.clone();
                log::info!(
                    "[exec] {:?} on {}",
                    code.effective_opcode().command,
                    list.entries[index].name
                );
                self.run(list, index, &code)
            }
            None => Err(SaveError::not_found(format!("code {} of entry {}", code_index, index))),
        };

        if let Some(code) = list
            .entries
            .get_mut(index)
            .and_then(|e| e.codes.get_mut(code_index))
        {
            code.activated = false;
        }

        let outcome = Outcome::from_result(result);
        match outcome.kind {
            OutcomeKind::Success | OutcomeKind::Declined => log::info!("[exec] {}", outcome.message),
            OutcomeKind::Failure | OutcomeKind::Unsigned => log::warn!("[exec] {}", outcome.message),
        }
        self.frontend.message(&outcome.message);
        outcome
    }

    fn run(&mut self, list: &mut SaveList, index: usize, code: &CodeEntry) -> SaveResult<String> {
        let ops = self.ops;
        let paths = &ops.ctx.paths;
        let user = ops.ctx.user_storage();
        let op = code.effective_opcode();
        let entry = &list.entries[index];

        match op.command {
            Command::Null => Err(SaveError::not_found(format!("no operation selected in {}", code.name))),
            Command::DecryptFile => ops.export_file(entry, selected_file(code)?),
            Command::ImportDataFile => ops.import_file(entry, selected_file(code)?),
            Command::HexEditFile => self.hex_edit(entry, selected_file(code)?),
            Command::ResignSave => {
                let result = ops.apply_changes(entry);
                for c in list.entries[index].codes.iter_mut().filter(|c| c.is_cheat()) {
                    c.activated = false;
                }
                result
            }
            Command::ViewDetails => save_details(entry),
            Command::ViewRawPatch => {
                let file = Path::new(code_file(code)?);
                fs::read_to_string(file).at(file)
            }
            Command::CopySaveUsb => ops.copy_save(entry, &paths.backup_saves(storage_arg(op.arg)?)),
            Command::CopySaveHdd => {
                if entry.flags.contains(SaveFlags::HDD) {
                    return Err(SaveError::format("save is already on the memory stick"));
                }
                ops.copy_save(entry, &paths.live_saves(user))
            }
            Command::ExportZipUsb => ops.export_zip(entry, storage_arg(op.arg)?),
            Command::DeleteSave => {
                let message = self.delete(entry)?;
                list.entries[index].flags.insert(SaveFlags::UPDATED);
                Ok(message)
            }
            Command::UploadSave => ops.upload(entry),
            Command::DownloadUsb => ops.download(entry, code, storage_arg(op.arg)?),
            Command::DownloadHdd => ops.download(entry, code, StorageTarget::Ms0Psp),
            Command::ExpPspKey => ops.export_key(entry),
            Command::DumpPspKey => ops
                .dump_key(entry)
                .map(|out| format!("Game key saved to {}", out.display())),
            Command::ExpFingerprint => Err(SaveError::not_found("save fingerprints are not available")),
            Command::ChangeTitleId => self.change_title_id(&mut list.entries[index]),
            Command::ResignVmp => ops.resign_vmp(entry, selected_file(code)?),
            Command::ExpVmp2Mcr => ops.export_mcr(entry, selected_file(code)?),
            Command::ImpMcr2Vmp => {
                let message = ops.import_mcr(entry, selected_file(code)?, op.arg)?;
                list.entries[index].flags.insert(SaveFlags::UPDATED);
                Ok(message)
            }
            Command::ExpVmcSave => ops.export_vmc_save(entry, storage_arg(op.arg)?),
            Command::ImpVmcSave => {
                let message = ops.import_vmc_save(entry, code_file(code)?)?;
                list.entries[index].flags.insert(SaveFlags::UPDATED);
                Ok(message)
            }
            Command::CopySavesUsb | Command::CopyAllSavesUsb => {
                let dest = paths.backup_saves(storage_arg(op.arg)?);
                Ok(self.run_bulk(list, selection(op.command), "Copied", is_psp_save, |ops, e| {
                    ops.copy_save(e, &dest).map(drop)
                }))
            }
            Command::CopySavesHdd | Command::CopyAllSavesHdd => {
                let dest = paths.live_saves(user);
                Ok(self.run_bulk(list, selection(op.command), "Copied", is_psp_save, |ops, e| {
                    ops.copy_save(e, &dest).map(drop)
                }))
            }
            Command::ResignSaves | Command::ResignAllSaves => {
                Ok(self.run_bulk(list, selection(op.command), "Resigned", is_psp_save, |ops, e| {
                    ops.resign_only(e)
                }))
            }
            Command::ExpSavesVmc | Command::ExpAllSavesVmc => {
                let target = storage_arg(op.arg)?;
                Ok(self.run_bulk(list, selection(op.command), "Exported", is_card_slot, |ops, e| {
                    ops.export_vmc_save(e, target).map(drop)
                }))
            }
            Command::DumpFingerprints => Ok(self.run_bulk(
                list,
                Selection::All,
                "Dumped keys of",
                |e| is_psp_save(e) && e.flags.contains(SaveFlags::PSP),
                |ops, e| ops.dump_key(e).map(drop),
            )),
            Command::SaveWebserver => {
                let router = CatalogRouter::new(list.clone(), &paths.cache);
                webserver::serve(Box::new(router), ops.ctx.config.web_port, &mut *self.frontend)?;
                Ok("Web Server stopped".to_string())
            }
            Command::NetWebserver => {
                let router = FileRouter::new(&paths.ms0);
                webserver::serve(Box::new(router), ops.ctx.config.web_port, &mut *self.frontend)?;
                Ok("Web Server stopped".to_string())
            }
            Command::ConvIso2Cso => ops.convert_image(code_file(code)?, true),
            Command::ConvCso2Iso => ops.convert_image(code_file(code)?, false),
            Command::SetupPlugin => {
                let enable = op.arg != 0;
                plugin::install_plugin(paths, enable)?;
                Ok(if enable {
                    "Key dumper plugin successfully installed".to_string()
                } else {
                    "Key dumper plugin disabled".to_string()
                })
            }
            Command::ExtractArchive => ops.extract(code_file(code)?),
            Command::UrlDownload => self.url_download(entry),
        }
    }

    fn run_bulk<P, F>(&mut self, list: &SaveList, selection: Selection, verb: &str, eligible: P, op: F) -> String
    where
        P: Fn(&SaveEntry) -> bool,
        F: Fn(&Operations<'a>, &SaveEntry) -> SaveResult<()>,
    {
        let ops = self.ops;
        let tally = bulk::for_each(list.saves(), selection, eligible, &mut *self.frontend, |e| op(&ops, e));
        tally.summary(verb)
    }

    /// Decrypt in place, let the user edit, encrypt back; resign on change.
    fn hex_edit(&mut self, entry: &SaveEntry, name: &str) -> SaveResult<String> {
        let file = entry.local_path().join(name);
        let key = self.ops.key_for(entry)?;
        if let Some(key) = &key {
            self.ops.crypto.decrypt_file(&file, key)?;
        }
        let changed = self.frontend.hex_edit(&file);
        if let Some(key) = &key {
            self.ops.crypto.encrypt_file(&file, key)?;
        }
        if !changed {
            return Ok(format!("No changes made to {}", name));
        }
        self.ops.sign(entry.local_path(), true)?;
        Ok(format!("File {} successfully modified", name))
    }

    fn delete(&mut self, entry: &SaveEntry) -> SaveResult<String> {
        if !self.frontend.confirm(&format!("Do you want to delete {}?", entry.name)) {
            return Err(SaveError::Declined);
        }
        if entry.flags.contains(SaveFlags::VMC) {
            self.ops.delete_vmc_slot(entry)?;
        } else {
            self.ops.remove_save(entry)?;
        }
        Ok(format!("Save {} successfully deleted", entry.dir_name))
    }

    fn change_title_id(&mut self, entry: &mut SaveEntry) -> SaveResult<String> {
        let id = self
            .frontend
            .input_text("Enter new Title ID", &entry.title_id)
            .ok_or(SaveError::Declined)?;
        self.ops.rename_title(entry, id.trim())
    }

    fn url_download(&mut self, entry: &SaveEntry) -> SaveResult<String> {
        let url = self
            .frontend
            .input_text("Download URL", "http://")
            .ok_or(SaveError::Declined)?;
        self.ops.fetch_url(entry, url.trim())
    }
}
