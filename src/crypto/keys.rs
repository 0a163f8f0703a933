use crate::error::{SaveError, SaveResult};
use crate::paths::AppPaths;
use crate::saves::SaveEntry;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// 128-bit per-title savedata key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct GameKey(pub [u8; 16]);

impl GameKey {
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s.trim()).ok()?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let mut key = [0u8; 16];
        key.copy_from_slice(bytes.get(..16)?);
        Some(Self(key))
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl fmt::Debug for GameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GameKey({})", self.to_hex())
    }
}

/// One place a key may be found.
pub trait KeySource {
    fn name(&self) -> &str;
    fn lookup(&self, entry: &SaveEntry) -> Option<GameKey>;
}

/// Binary key file whose location is derived from the entry, tried under each root.
pub struct KeyFile {
    label: &'static str,
    roots: Vec<PathBuf>,
    locate: fn(&Path, &SaveEntry) -> PathBuf,
}

impl KeyFile {
    pub fn new(label: &'static str, roots: Vec<PathBuf>, locate: fn(&Path, &SaveEntry) -> PathBuf) -> Self {
        Self { label, roots, locate }
    }

    /// `PSP/SAVEPLAIN/<dir>/<title>.bin`
    pub fn per_directory(root: &Path) -> Self {
        Self::new("SAVEPLAIN/<dir>", vec![root.to_path_buf()], |root, e| {
            root.join("PSP/SAVEPLAIN")
                .join(&e.dir_name)
                .join(format!("{}.bin", e.title_id))
        })
    }

    /// `PSP/SAVEPLAIN/<title>/<title>.bin`
    pub fn per_title(root: &Path) -> Self {
        Self::new("SAVEPLAIN/<title>", vec![root.to_path_buf()], |root, e| {
            root.join("PSP/SAVEPLAIN")
                .join(&e.title_id)
                .join(format!("{}.bin", e.title_id))
        })
    }

    /// Output of the key dumper plugin on either device.
    pub fn dumper(roots: Vec<PathBuf>) -> Self {
        Self::new("SED gamekey", roots, |root, e| {
            root.join("PSP/GAME/SED/gamekey").join(format!("{}.bin", e.title_id))
        })
    }
}

impl KeySource for KeyFile {
    fn name(&self) -> &str {
        self.label
    }

    fn lookup(&self, entry: &SaveEntry) -> Option<GameKey> {
        self.roots.iter().find_map(|root| {
            let path = (self.locate)(root, entry);
            let bytes = fs::read(&path).ok()?;
            GameKey::from_slice(&bytes)
        })
    }
}

/// Parse `prefix=32HEX` lines; `;` starts a comment. Anything after the
/// first 32 hex digits of a key is ignored.
pub fn parse_keystore(text: &str) -> Vec<(String, GameKey)> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with(';'))
        .filter_map(|l| {
            let (prefix, key) = l.split_once('=')?;
            let key = key.trim_start().get(..32)?;
            Some((prefix.trim().to_string(), GameKey::from_hex(key)?))
        })
        .collect()
}

/// Shared flat-file keystore matched by directory-name prefix.
pub struct Keystore {
    path: PathBuf,
}

impl Keystore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl KeySource for Keystore {
    fn name(&self) -> &str {
        "gamekeys.txt"
    }

    fn lookup(&self, entry: &SaveEntry) -> Option<GameKey> {
        let text = fs::read_to_string(&self.path).ok()?;
        let dir = entry.dir_name.to_uppercase();
        parse_keystore(&text)
            .into_iter()
            .find(|(prefix, _)| !prefix.is_empty() && dir.starts_with(&prefix.to_uppercase()))
            .map(|(_, key)| key)
    }
}

/// Ordered key sources; the first hit wins.
pub struct KeyChain {
    sources: Vec<Box<dyn KeySource>>,
}

impl KeyChain {
    pub fn new(sources: Vec<Box<dyn KeySource>>) -> Self {
        Self { sources }
    }

    pub fn standard(paths: &AppPaths) -> Self {
        Self::new(vec![
            Box::new(KeyFile::per_directory(&paths.ms0)),
            Box::new(KeyFile::per_title(&paths.ms0)),
            Box::new(KeyFile::dumper(vec![paths.ms0.clone(), paths.ef0.clone()])),
            Box::new(Keystore::new(&paths.keystore())),
        ])
    }

    pub fn lookup(&self, entry: &SaveEntry) -> SaveResult<GameKey> {
        for source in &self.sources {
            if let Some(key) = source.lookup(entry) {
                log::debug!("[crypto] Key for {} from {}", entry.dir_name, source.name());
                return Ok(key);
            }
        }
        Err(SaveError::not_found(format!("game key for {}", entry.dir_name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saves::{SaveFlags, SaveType};

    fn entry() -> SaveEntry {
        let mut e = SaveEntry::new(SaveType::Psp, SaveFlags::PSP, "Game");
        e.title_id = "ULUS10041".into();
        e.dir_name = "ULUS10041DATA00".into();
        e
    }

    struct Fixed(Option<GameKey>);

    impl KeySource for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn lookup(&self, _: &SaveEntry) -> Option<GameKey> {
            self.0
        }
    }

    // ── KeyChain ──

    #[test]
    fn test_first_hit_wins() {
        let chain = KeyChain::new(vec![
            Box::new(Fixed(None)),
            Box::new(Fixed(Some(GameKey([1; 16])))),
            Box::new(Fixed(Some(GameKey([2; 16])))),
        ]);
        assert_eq!(chain.lookup(&entry()).unwrap(), GameKey([1; 16]));
    }

    #[test]
    fn test_no_key_is_not_found() {
        let chain = KeyChain::new(vec![Box::new(Fixed(None))]);
        assert!(matches!(chain.lookup(&entry()), Err(SaveError::NotFound(_))));
    }

    #[test]
    fn test_per_directory_file_beats_keystore() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::new(dir.path());
        let e = entry();

        let key_dir = paths.ms0.join("PSP/SAVEPLAIN/ULUS10041DATA00");
        fs::create_dir_all(&key_dir).unwrap();
        fs::write(key_dir.join("ULUS10041.bin"), [0xAA; 16]).unwrap();
        fs::create_dir_all(&paths.data).unwrap();
        fs::write(paths.keystore(), format!("ULUS10041={}\n", "BB".repeat(16))).unwrap();

        let chain = KeyChain::standard(&paths);
        assert_eq!(chain.lookup(&e).unwrap(), GameKey([0xAA; 16]));

        fs::remove_file(key_dir.join("ULUS10041.bin")).unwrap();
        assert_eq!(chain.lookup(&e).unwrap(), GameKey([0xBB; 16]));
    }

    #[test]
    fn test_dumper_checks_both_devices() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::new(dir.path());
        let sed = paths.ef0.join("PSP/GAME/SED/gamekey");
        fs::create_dir_all(&sed).unwrap();
        fs::write(sed.join("ULUS10041.bin"), [0x11; 16]).unwrap();
        assert_eq!(KeyChain::standard(&paths).lookup(&entry()).unwrap(), GameKey([0x11; 16]));
    }

    // ── parse_keystore ──

    #[test]
    fn test_keystore_comments_and_case() {
        let text = "; header\nulus10041=00112233445566778899AABBCCDDEEFF\nbroken line\nX=zz\n";
        let keys = parse_keystore(text);
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].1.to_hex(), "00112233445566778899AABBCCDDEEFF");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gamekeys.txt");
        fs::write(&path, text).unwrap();
        assert!(Keystore::new(&path).lookup(&entry()).is_some());
    }

    #[test]
    fn test_keystore_ignores_trailing_text() {
        let keys = parse_keystore(
            "ULUS10041=00112233445566778899AABBCCDDEEFF ; US release\nULES00001=0011\n",
        );
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].0, "ULUS10041");
        assert_eq!(keys[0].1.to_hex(), "00112233445566778899AABBCCDDEEFF");
    }
}
