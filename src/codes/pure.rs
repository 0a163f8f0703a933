use crate::paths::StorageTarget;
use crate::saves::{Command, OptionList, OptionValue, Opcode};
use regex::RegexBuilder;
use std::fs;
use std::path::Path;

/// Container metadata that is never offered as a data file.
const SYSTEM_FILES: [&str; 5] = ["ICON0.PNG", "PARAM.SFO", "PIC1.PNG", "ICON1.PMF", "SND0.AT3"];

/// Case-insensitive `*` / `?` match over the whole name.
pub fn wildcard_match(name: &str, mask: &str) -> bool {
    let mut pattern = String::from("^");
    for ch in mask.chars() {
        match ch {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map(|re| re.is_match(name))
        .unwrap_or(false)
}

/// Data files directly under `dir` matching `mask`, sorted by name.
pub fn list_files(dir: &Path, mask: &str) -> Vec<String> {
    let Ok(read) = fs::read_dir(dir) else {
        log::debug!("[codes] Can't open {}", dir.display());
        return Vec::new();
    };
    let mut names: Vec<String> = read
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| !SYSTEM_FILES.contains(&n.as_str()))
        .filter(|n| wildcard_match(n, mask))
        .collect();
    names.sort();
    names
}

/// One option per matching file. Each carries `opcode` when given, otherwise
/// the mask itself. No match yields a single disabled placeholder.
pub fn file_options(dir: &Path, mask: &str, opcode: Option<Opcode>) -> OptionList {
    let mut list = OptionList::new(mask);
    let files = list_files(dir, mask);
    if files.is_empty() {
        let sep = if dir.to_string_lossy().ends_with('/') { "" } else { "/" };
        list.push(format!("--- {}{}{} ---", dir.display(), sep, mask), OptionValue::Disabled);
        return list;
    }
    for name in files {
        let value = match opcode {
            Some(op) => OptionValue::Opcode(op),
            None => OptionValue::Text(mask.to_string()),
        };
        list.push(name, value);
    }
    list
}

/// `<name> (ms0:/)` and `<name> (ef0:/)` choices for a storage command.
pub fn storage_options(name: &str, command: Command) -> OptionList {
    OptionList::new(name)
        .with(
            format!("{} (ms0:/)", name),
            OptionValue::Opcode(Opcode::with_arg(command, StorageTarget::Ms0.byte())),
        )
        .with(
            format!("{} (ef0:/)", name),
            OptionValue::Opcode(Opcode::with_arg(command, StorageTarget::Ef0.byte())),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── wildcard_match ──

    #[test]
    fn test_wildcard_ignores_case() {
        assert!(wildcard_match("scevmc0.vmp", "*.VMP"));
        assert!(wildcard_match("DATA.BIN", "*"));
        assert!(wildcard_match("SAVE1.BIN", "SAVE?.BIN"));
        assert!(!wildcard_match("SAVE10.BIN", "SAVE?.BIN"));
        assert!(!wildcard_match("DATA.BIN.bak", "*.BIN"));
    }

    #[test]
    fn test_wildcard_escapes_regex_chars() {
        assert!(wildcard_match("a+b(1).dat", "a+b(1).*"));
        assert!(!wildcard_match("aab1xdat", "a+b(1).*"));
    }

    // ── file_options ──

    #[test]
    fn test_system_files_are_hidden() {
        let dir = tempfile::tempdir().unwrap();
        for f in ["PARAM.SFO", "ICON0.PNG", "DATA.BIN", "SYS.BIN"] {
            fs::write(dir.path().join(f), b"x").unwrap();
        }
        let opts = file_options(dir.path(), "*", Some(Opcode::new(Command::DecryptFile)));
        let labels: Vec<_> = opts.items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["DATA.BIN", "SYS.BIN"]);
        assert_eq!(opts.sel, None);
    }

    #[test]
    fn test_empty_match_gives_disabled_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let opts = file_options(dir.path(), "*.VMP", Some(Opcode::new(Command::ResignVmp)));
        assert_eq!(opts.items.len(), 1);
        assert_eq!(opts.items[0].value, OptionValue::Disabled);
        assert!(opts.items[0].label.ends_with("/*.VMP ---"));
    }

    #[test]
    fn test_storage_options_carry_target_byte() {
        let opts = storage_options("Copy Save to Backup Storage", Command::CopySaveUsb);
        assert_eq!(opts.items.len(), 2);
        assert_eq!(
            opts.items[1].value,
            OptionValue::Opcode(Opcode::with_arg(Command::CopySaveUsb, 1))
        );
    }
}
