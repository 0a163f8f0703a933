// Ordering of save and code lists

use super::types::{CodeEntry, SaveEntry, SaveList, SaveType};
use crate::config::SortMode;
use std::cmp::Ordering;

fn type_rank(kind: SaveType) -> u8 {
    match kind {
        SaveType::Menu => 0,
        SaveType::Psp => 1,
        SaveType::Ps1 => 2,
        SaveType::Vmc => 3,
        SaveType::Zip => 4,
        SaveType::Iso | SaveType::Cso => 5,
        SaveType::Prx | SaveType::Net => 6,
        SaveType::Null => 7,
    }
}

fn compare(a: &SaveEntry, b: &SaveEntry, mode: SortMode) -> Ordering {
    match mode {
        SortMode::Disabled => Ordering::Equal,
        SortMode::ByName => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortMode::ByTitleId => a.title_id.cmp(&b.title_id).then_with(|| a.dir_name.cmp(&b.dir_name)),
        SortMode::ByType => type_rank(a.kind)
            .cmp(&type_rank(b.kind))
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase())),
    }
}

/// Sort a list in place; the bulk entry stays first.
pub fn sort_saves(list: &mut SaveList, mode: SortMode) {
    if mode == SortMode::Disabled {
        return;
    }
    let menu = list.menu.map(|i| list.entries.remove(i));
    list.entries.sort_by(|a, b| compare(a, b, mode));
    if let Some(menu) = menu {
        list.push_menu(menu);
    }
}

pub fn sort_codes(codes: &mut [CodeEntry]) {
    codes.sort_by_key(|c| c.name.to_lowercase());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saves::SaveFlags;

    fn named(name: &str, title: &str) -> SaveEntry {
        let mut e = SaveEntry::new(SaveType::Psp, SaveFlags::PSP, name);
        e.title_id = title.into();
        e
    }

    #[test]
    fn test_menu_stays_first() {
        let mut list = SaveList::new("HDD", "/x");
        list.entries.push(named("beta", "ULUS2"));
        list.entries.push(named("Alpha", "ULUS3"));
        list.push_menu(SaveEntry::new(SaveType::Menu, SaveFlags::PSP, "Zzz Bulk"));

        sort_saves(&mut list, SortMode::ByName);
        let names: Vec<_> = list.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Zzz Bulk", "Alpha", "beta"]);
        assert!(list.is_menu(0));
    }

    #[test]
    fn test_sort_by_title() {
        let mut list = SaveList::new("HDD", "/x");
        list.entries.push(named("a", "ULUS2"));
        list.entries.push(named("b", "ULES1"));
        sort_saves(&mut list, SortMode::ByTitleId);
        assert_eq!(list.entries[0].title_id, "ULES1");
    }
}
