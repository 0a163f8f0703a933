use super::command::Opcode;
use std::ops::{BitOr, BitOrAssign};
use std::path::Path;

/// Origin and state bits of a save entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SaveFlags(u16);

impl SaveFlags {
    pub const HDD: Self = Self(1);
    pub const SELECTED: Self = Self(2);
    pub const ZIP: Self = Self(4);
    pub const PS1: Self = Self(8);
    pub const VMC: Self = Self(16);
    pub const PSP: Self = Self(32);
    pub const ISO: Self = Self(64);
    pub const FTP: Self = Self(128);
    pub const ONLINE: Self = Self(256);
    pub const UPDATED: Self = Self(512);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub fn toggle(&mut self, other: Self) {
        self.0 ^= other.0;
    }

    pub fn set(&mut self, other: Self, on: bool) {
        if on {
            self.insert(other)
        } else {
            self.remove(other)
        }
    }
}

impl BitOr for SaveFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for SaveFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SaveType {
    /// Remote catalog entry, nothing on disk yet.
    #[default]
    Null,
    Ps1,
    Psp,
    /// Synthetic bulk-operations entry at the head of a list.
    Menu,
    Zip,
    Prx,
    Net,
    Vmc,
    Iso,
    Cso,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PatchKind {
    #[default]
    Null,
    GameGenie,
    Bsd,
    Command,
    Sfo,
    TropUnlock,
    TropLock,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Opcode(Opcode),
    Text(String),
    /// Placeholder shown when nothing matched; selecting it does nothing.
    Disabled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionItem {
    pub label: String,
    pub value: OptionValue,
}

/// Named set of selectable choices attached to a code.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OptionList {
    pub name: String,
    pub items: Vec<OptionItem>,
    pub sel: Option<usize>,
}

impl OptionList {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
            sel: None,
        }
    }

    pub fn push(&mut self, label: impl Into<String>, value: OptionValue) {
        self.items.push(OptionItem {
            label: label.into(),
            value,
        });
    }

    pub fn with(mut self, label: impl Into<String>, value: OptionValue) -> Self {
        self.push(label, value);
        self
    }

    pub fn selected(&self) -> Option<&OptionItem> {
        self.sel.and_then(|i| self.items.get(i))
    }

    pub fn select(&mut self, index: usize) -> bool {
        if index < self.items.len() {
            self.sel = Some(index);
            true
        } else {
            false
        }
    }
}

/// One action or cheat bound to a save.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CodeEntry {
    pub name: String,
    pub opcode: Opcode,
    pub activated: bool,
    pub kind: PatchKind,
    /// Target file (cheats), remote file (downloads) or source file (tools).
    pub file: Option<String>,
    /// Raw patch text for cheat codes.
    pub body: String,
    pub options: Vec<OptionList>,
}

impl CodeEntry {
    pub fn command(name: impl Into<String>, opcode: Opcode) -> Self {
        Self {
            name: name.into(),
            opcode,
            kind: PatchKind::Command,
            ..Default::default()
        }
    }

    /// Non-selectable heading line.
    pub fn header(name: impl Into<String>) -> Self {
        Self {
            name: format!("----- {} -----", name.into()),
            kind: PatchKind::Null,
            ..Default::default()
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_options(mut self, options: OptionList) -> Self {
        self.options.push(options);
        self
    }

    pub fn is_cheat(&self) -> bool {
        matches!(self.kind, PatchKind::GameGenie | PatchKind::Bsd)
    }

    /// Opcode to run: the selected option's when it carries one.
    pub fn effective_opcode(&self) -> Opcode {
        self.options
            .first()
            .and_then(OptionList::selected)
            .and_then(|item| match &item.value {
                OptionValue::Opcode(op) => Some(*op),
                _ => None,
            })
            .unwrap_or(self.opcode)
    }

    /// Label of the selected first option, used for per-file commands.
    pub fn selected_label(&self) -> Option<&str> {
        self.options
            .first()
            .and_then(OptionList::selected)
            .filter(|item| item.value != OptionValue::Disabled)
            .map(|item| item.label.as_str())
    }
}

/// A logical save unit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SaveEntry {
    pub name: String,
    pub title_id: String,
    /// Absolute source path, or URL for remote entries.
    pub path: String,
    pub dir_name: String,
    /// Size in 8 KiB blocks, or slot index for memory-card saves.
    pub blocks: u32,
    pub flags: SaveFlags,
    pub kind: SaveType,
    pub codes: Vec<CodeEntry>,
}

impl SaveEntry {
    pub fn new(kind: SaveType, flags: SaveFlags, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags,
            kind,
            ..Default::default()
        }
    }

    pub fn local_path(&self) -> &Path {
        Path::new(&self.path)
    }

    pub fn is_selected(&self) -> bool {
        self.flags.contains(SaveFlags::SELECTED)
    }

    pub fn toggle_selected(&mut self) {
        self.flags.toggle(SaveFlags::SELECTED);
    }

    /// True when the kind tag and the format bits agree.
    pub fn is_consistent(&self) -> bool {
        let f = self.flags;
        if f.contains(SaveFlags::PS1 | SaveFlags::PSP) {
            return false;
        }
        if f.contains(SaveFlags::VMC) && !matches!(self.kind, SaveType::Ps1 | SaveType::Menu) {
            return false;
        }
        match self.kind {
            SaveType::Psp => f.intersects(SaveFlags::PSP | SaveFlags::PS1) && !f.contains(SaveFlags::VMC),
            SaveType::Ps1 => f.contains(SaveFlags::PS1),
            _ => true,
        }
    }
}

/// Ordered entries produced by one provider.
///
/// `menu` records which entry (if any) is the synthetic bulk entry; bulk
/// commands run on it act on the rest of `entries`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SaveList {
    pub title: String,
    pub root: String,
    pub entries: Vec<SaveEntry>,
    pub menu: Option<usize>,
}

impl SaveList {
    pub fn new(title: impl Into<String>, root: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            root: root.into(),
            ..Default::default()
        }
    }

    /// Put a bulk entry at the head and remember it.
    pub fn push_menu(&mut self, entry: SaveEntry) {
        self.entries.insert(0, entry);
        self.menu = Some(0);
    }

    pub fn is_menu(&self, index: usize) -> bool {
        self.menu == Some(index)
    }

    /// Real saves, without the bulk entry.
    pub fn saves(&self) -> impl Iterator<Item = &SaveEntry> {
        let menu = self.menu;
        self.entries
            .iter()
            .enumerate()
            .filter(move |(i, _)| Some(*i) != menu)
            .map(|(_, e)| e)
    }

    pub fn is_stale(&self) -> bool {
        self.entries.iter().any(|e| e.flags.contains(SaveFlags::UPDATED))
    }
}
