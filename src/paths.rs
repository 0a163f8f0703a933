use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub static PATH_HOME: LazyLock<PathBuf> =
    LazyLock::new(|| PathBuf::from(env::var("HOME").unwrap_or_else(|_| "/".to_string())));

pub static PATH_LOCAL_SHARE: LazyLock<PathBuf> = LazyLock::new(|| PATH_HOME.join(".local/share"));

/// Default application root when `--root` is not given.
pub static PATH_APP: LazyLock<PathBuf> = LazyLock::new(|| {
    if let Ok(xdg_data_home) = env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg_data_home).join("savetool");
    }
    PATH_LOCAL_SHARE.join("savetool")
});

pub const ONLINE_URL: &str = "https://bucanero.github.io/apollo-saves/";
pub const ONLINE_PATCH_URL: &str = "https://bucanero.github.io/apollo-patches/PSP/";
pub const UPDATE_URL: &str = "https://api.github.com/repos/bucanero/apollo-psp/releases/latest";
/// Seconds a downloaded catalog index stays fresh.
pub const ONLINE_CACHE_TIMEOUT: u64 = 24 * 3600;

pub const SAVES_DIR: &str = "PSP/SAVEDATA";
pub const BACKUP_DIR: &str = "APOLLO/SAVEDATA";
pub const EXPORT_DIR: &str = "APOLLO/EXPORT";
pub const FILES_DIR: &str = "APOLLO/FILES";
pub const PS1_SAVES_DIR: &str = "PS1/SAVEDATA";
pub const PS1_IMAGES_DIR: &str = "APOLLO/PS1";
pub const KEYSTORE_FILE: &str = "gamekeys.txt";

/// Physical storage a command writes to.
///
/// `Ms0Psp` is the live save directory of the memory stick rather than the
/// backup area; only downloads and single-save copies accept it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StorageTarget {
    #[default]
    #[serde(rename = "ms0")]
    Ms0,
    #[serde(rename = "ef0")]
    Ef0,
    #[serde(rename = "ms0_psp")]
    Ms0Psp,
}

impl StorageTarget {
    pub const fn byte(self) -> u8 {
        match self {
            StorageTarget::Ms0 => 0,
            StorageTarget::Ef0 => 1,
            StorageTarget::Ms0Psp => 2,
        }
    }

    pub const fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(StorageTarget::Ms0),
            1 => Some(StorageTarget::Ef0),
            2 => Some(StorageTarget::Ms0Psp),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StorageTarget::Ms0 => "Memory Stick (ms0)",
            StorageTarget::Ef0 => "Internal Storage (ef0)",
            StorageTarget::Ms0Psp => "Memory Stick (ms0:/PSP)",
        }
    }
}

/// Filesystem layout of one application root.
///
/// `ms0` and `ef0` are host directories standing in for the two devices; all
/// save, export and plugin paths hang off them.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub data: PathBuf,
    pub cache: PathBuf,
    pub ms0: PathBuf,
    pub ef0: PathBuf,
}

impl AppPaths {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            data: root.join("DATA"),
            cache: root.join("CACHE"),
            ms0: root.join("ms0"),
            ef0: root.join("ef0"),
        }
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.data, &self.cache, &self.ms0] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn device(&self, target: StorageTarget) -> &Path {
        match target {
            StorageTarget::Ms0 | StorageTarget::Ms0Psp => &self.ms0,
            StorageTarget::Ef0 => &self.ef0,
        }
    }

    /// Live save directory (`PSP/SAVEDATA`) of a device.
    pub fn live_saves(&self, target: StorageTarget) -> PathBuf {
        self.device(target).join(SAVES_DIR)
    }

    /// Backup save directory (`APOLLO/SAVEDATA`), or the live one for `Ms0Psp`.
    pub fn backup_saves(&self, target: StorageTarget) -> PathBuf {
        match target {
            StorageTarget::Ms0Psp => self.live_saves(target),
            _ => self.device(target).join(BACKUP_DIR),
        }
    }

    pub fn export_dir(&self, target: StorageTarget) -> PathBuf {
        self.device(target).join(EXPORT_DIR)
    }

    pub fn files_dir(&self, target: StorageTarget, dir_name: &str) -> PathBuf {
        self.device(target).join(FILES_DIR).join(dir_name)
    }

    pub fn ps1_saves(&self, target: StorageTarget) -> PathBuf {
        self.device(target).join(PS1_SAVES_DIR)
    }

    pub fn ps1_images(&self, target: StorageTarget, title_id: &str) -> PathBuf {
        self.device(target).join(PS1_IMAGES_DIR).join(title_id)
    }

    pub fn iso_dir(&self) -> PathBuf {
        self.ms0.join("ISO")
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.ms0.join("seplugins")
    }

    pub fn keystore(&self) -> PathBuf {
        self.data.join(KEYSTORE_FILE)
    }

    pub fn patch_file(&self, title_id: &str) -> PathBuf {
        self.data.join(format!("{}.savepatch", title_id))
    }

    pub fn log_file(&self, target: StorageTarget) -> PathBuf {
        self.device(target).join("APOLLO/apollo.log")
    }
}
