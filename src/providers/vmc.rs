use super::ListProvider;
use crate::config::AppContext;
use crate::error::SaveResult;
use crate::net::Transport;
use crate::ps1card::MemoryCard;
use crate::saves::{SaveEntry, SaveFlags, SaveList, SaveType};
use std::path::{Path, PathBuf};

/// Saves stored in one PS1 memory card image.
pub struct MemoryCardList {
    path: PathBuf,
}

impl MemoryCardList {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl ListProvider for MemoryCardList {
    fn title(&self) -> &str {
        "PS1 Memory Card"
    }

    fn read_list(&self, _ctx: &AppContext, _transport: &dyn Transport) -> SaveResult<SaveList> {
        let card = MemoryCard::open(&self.path)?;
        let card_path = self.path.to_string_lossy().into_owned();
        let mut list = SaveList::new(self.title(), &card_path);

        for slot in card.slots() {
            let mut entry = SaveEntry::new(SaveType::Ps1, SaveFlags::PS1 | SaveFlags::VMC, slot.title);
            entry.title_id = slot.product_code;
            entry.dir_name = slot.file_name;
            entry.blocks = slot.slot as u32;
            entry.path = card_path.clone();
            list.entries.push(entry);
        }

        let mut menu = SaveEntry::new(SaveType::Menu, SaveFlags::PS1 | SaveFlags::VMC, "Bulk Save Management");
        menu.path = card_path;
        list.push_menu(menu);
        Ok(list)
    }
}
