//! SGKeyDumper plugin management.
//!
//! The plugin binary ships in `DATA/`; custom firmware loads whatever
//! `seplugins/game.txt` lists with a trailing `1`.

use crate::error::{IoContext, SaveError, SaveResult};
use crate::paths::AppPaths;
use std::fs;

pub const PLUGIN_FILE: &str = "SGKeyDumper.prx";
const PLUGIN_LINE: &str = "ms0:/seplugins/SGKeyDumper.prx";

/// Rewrite the plugin's line in a `game.txt` body, appending it when absent.
pub fn set_plugin_line(text: &str, enable: bool) -> String {
    let line = format!("{} {}", PLUGIN_LINE, if enable { 1 } else { 0 });
    let mut found = false;
    let mut out: Vec<String> = text
        .lines()
        .map(|l| {
            if l.trim_start().to_lowercase().starts_with(&PLUGIN_LINE.to_lowercase()) {
                found = true;
                line.clone()
            } else {
                l.to_string()
            }
        })
        .collect();
    if !found {
        out.push(line);
    }
    let mut joined = out.join("\n");
    joined.push('\n');
    joined
}

/// Install and enable the plugin, or disable it.
pub fn install_plugin(paths: &AppPaths, enable: bool) -> SaveResult<()> {
    let dir = paths.plugins_dir();
    fs::create_dir_all(&dir).at(&dir)?;

    if enable {
        let src = paths.data.join(PLUGIN_FILE);
        if !src.is_file() {
            return Err(SaveError::not_found(src.display().to_string()));
        }
        let dst = dir.join(PLUGIN_FILE);
        fs::copy(&src, &dst).at(&dst)?;
    }

    let list = dir.join("game.txt");
    let text = match fs::read_to_string(&list) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(SaveError::Io { path: list, source: e }),
    };
    fs::write(&list, set_plugin_line(&text, enable)).at(&list)?;

    log::info!("[plugin] Key dumper {}", if enable { "enabled" } else { "disabled" });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_line_replaced_in_place() {
        let text = "ms0:/seplugins/other.prx 1\nms0:/seplugins/SGKeyDumper.prx 1\n";
        assert_eq!(
            set_plugin_line(text, false),
            "ms0:/seplugins/other.prx 1\nms0:/seplugins/SGKeyDumper.prx 0\n"
        );
        assert_eq!(set_plugin_line("", true), "ms0:/seplugins/SGKeyDumper.prx 1\n");
    }

    #[test]
    fn test_install_copies_binary() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = AppPaths::new(tmp.path());
        fs::create_dir_all(&paths.data).unwrap();
        fs::write(paths.data.join(PLUGIN_FILE), b"PRX").unwrap();

        install_plugin(&paths, true).unwrap();
        assert_eq!(fs::read(paths.plugins_dir().join(PLUGIN_FILE)).unwrap(), b"PRX");
        install_plugin(&paths, false).unwrap();
        let list = fs::read_to_string(paths.plugins_dir().join("game.txt")).unwrap();
        assert_eq!(list, "ms0:/seplugins/SGKeyDumper.prx 0\n");
    }

    #[test]
    fn test_install_without_binary_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = AppPaths::new(Path::new(tmp.path()));
        assert!(matches!(install_plugin(&paths, true), Err(SaveError::NotFound(_))));
    }
}
