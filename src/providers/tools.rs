use super::ListProvider;
use crate::config::AppContext;
use crate::error::SaveResult;
use crate::net::Transport;
use crate::saves::{SaveEntry, SaveFlags, SaveList, SaveType};
use std::path::Path;

/// Fixed utility entries; their codes are built from the files they point at.
pub struct ToolsList;

fn tool(kind: SaveType, flags: SaveFlags, name: &str, path: &Path) -> SaveEntry {
    let mut entry = SaveEntry::new(kind, flags, name);
    entry.path = path.to_string_lossy().into_owned();
    entry.title_id = entry.path.clone();
    entry
}

impl ListProvider for ToolsList {
    fn title(&self) -> &str {
        "User Tools"
    }

    fn read_list(&self, ctx: &AppContext, _transport: &dyn Transport) -> SaveResult<SaveList> {
        let ms0 = &ctx.paths.ms0;
        let iso = ctx.paths.iso_dir();
        let mut list = SaveList::new(self.title(), ms0.to_string_lossy());
        list.entries = vec![
            tool(SaveType::Zip, SaveFlags::ZIP, "Extract Archives (Zip)", ms0),
            tool(SaveType::Prx, SaveFlags::PSP, "Manage Save-game Key Dumper plugin", ms0),
            tool(SaveType::Net, SaveFlags::empty(), "Network Tools", ms0),
            tool(SaveType::Cso, SaveFlags::ISO, "Decompress .CSO to .ISO", &iso),
            tool(SaveType::Iso, SaveFlags::ISO, "Compress .ISO to .CSO", &iso),
        ];
        Ok(list)
    }
}
