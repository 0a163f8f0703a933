//! PS1 memory card operations: VMP resign, MCR export/import, single saves.

use super::Operations;
use super::pure::vmc_export_name;
use crate::error::{IoContext, SaveError, SaveResult};
use crate::paths::StorageTarget;
use crate::ps1card::{MemoryCard, vmp_resign};
use crate::saves::SaveEntry;
use std::fs;
use std::path::Path;

impl Operations<'_> {
    pub fn resign_vmp(&self, entry: &SaveEntry, name: &str) -> SaveResult<String> {
        let path = entry.local_path().join(name);
        let mut image = fs::read(&path).at(&path)?;
        vmp_resign(&mut image)?;
        fs::write(&path, image).at(&path)?;
        Ok(format!("Memory card {} successfully resigned", name))
    }

    /// Raw `.MCR` copy of a save's virtual card, under `APOLLO/PS1/<title>/`.
    pub fn export_mcr(&self, entry: &SaveEntry, name: &str) -> SaveResult<String> {
        let card = MemoryCard::open(&entry.local_path().join(name))?;
        let dir = self.ctx.paths.ps1_images(self.ctx.user_storage(), &entry.title_id);
        fs::create_dir_all(&dir).at(&dir)?;
        let out = dir.join(Path::new(name).with_extension("MCR"));
        fs::write(&out, card.raw()).at(&out)?;
        Ok(format!("Memory card successfully exported to {}", out.display()))
    }

    /// Replace the contents of `SCEVMC<slot>.VMP` with a raw image.
    pub fn import_mcr(&self, entry: &SaveEntry, name: &str, slot: u8) -> SaveResult<String> {
        if slot > 1 {
            return Err(SaveError::format(format!("no memory card slot {}", slot)));
        }
        let src = self
            .ctx
            .paths
            .ps1_images(self.ctx.user_storage(), &entry.title_id)
            .join(name);
        let raw = fs::read(&src).at(&src)?;

        let vmp = entry.local_path().join(format!("SCEVMC{}.VMP", slot));
        let mut card = MemoryCard::open(&vmp)?;
        card.replace_raw(&raw)?;
        card.save(&vmp)?;
        Ok(format!("{} successfully imported to SCEVMC{}.VMP", name, slot))
    }

    /// Slot `entry.blocks` of the card as a timestamped `.mcs`.
    pub fn export_vmc_save(&self, entry: &SaveEntry, target: StorageTarget) -> SaveResult<String> {
        let card = MemoryCard::open(entry.local_path())?;
        let data = card.export_mcs(entry.blocks as usize)?;
        let dir = self.ctx.paths.ps1_saves(target);
        fs::create_dir_all(&dir).at(&dir)?;
        let out = dir.join(vmc_export_name(&entry.dir_name, chrono::Local::now().naive_local()));
        fs::write(&out, data).at(&out)?;
        Ok(format!("Save successfully exported to {}", out.display()))
    }

    pub fn import_vmc_save(&self, entry: &SaveEntry, file: &str) -> SaveResult<String> {
        let path = Path::new(file);
        let data = fs::read(path).at(path)?;
        let mut card = MemoryCard::open(entry.local_path())?;
        let slot = card.import_mcs(&data)?;
        card.save(entry.local_path())?;
        Ok(format!("Save successfully imported to slot {}", slot))
    }

    pub fn delete_vmc_slot(&self, entry: &SaveEntry) -> SaveResult<()> {
        let mut card = MemoryCard::open(entry.local_path())?;
        card.delete(entry.blocks as usize)?;
        card.save(entry.local_path())?;
        log::info!("[exec] Deleted slot {} of {}", entry.blocks, entry.path);
        Ok(())
    }
}
