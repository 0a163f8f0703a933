//! PARAM.SFO metadata codec.
//!
//! Layout: 20-byte header (`\0PSF`, version, key table offset, data table
//! offset, entry count), 16-byte index entries, a 4-aligned key table, then
//! the data table where each value occupies `max_len` bytes.

use crate::error::{IoContext, SaveError, SaveResult};
use std::fs;
use std::path::Path;

const MAGIC: &[u8; 4] = b"\0PSF";
const VERSION: u32 = 0x0101;
const HEADER_LEN: usize = 20;
const INDEX_LEN: usize = 16;

pub const FMT_UTF8_SPECIAL: u16 = 0x0004;
pub const FMT_UTF8: u16 = 0x0204;
pub const FMT_INT32: u16 = 0x0404;

pub const SAVEDATA_PARAMS: &str = "SAVEDATA_PARAMS";
pub const SAVEDATA_FILE_LIST: &str = "SAVEDATA_FILE_LIST";
pub const SAVEDATA_DIRECTORY: &str = "SAVEDATA_DIRECTORY";
pub const SAVEDATA_TITLE: &str = "SAVEDATA_TITLE";
pub const SAVEDATA_DETAIL: &str = "SAVEDATA_DETAIL";
pub const TITLE: &str = "TITLE";

#[derive(Debug, Clone, PartialEq)]
pub struct SfoParam {
    pub key: String,
    pub fmt: u16,
    pub data: Vec<u8>,
    pub max_len: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sfo {
    pub params: Vec<SfoParam>,
}

fn read_u16(b: &[u8], off: usize) -> SaveResult<u16> {
    b.get(off..off + 2)
        .map(|s| u16::from_le_bytes([s[0], s[1]]))
        .ok_or_else(|| SaveError::format("truncated SFO"))
}

fn read_u32(b: &[u8], off: usize) -> SaveResult<u32> {
    b.get(off..off + 4)
        .map(|s| u32::from_le_bytes([s[0], s[1], s[2], s[3]]))
        .ok_or_else(|| SaveError::format("truncated SFO"))
}

impl Sfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(bytes: &[u8]) -> SaveResult<Self> {
        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            return Err(SaveError::format("bad SFO magic"));
        }
        let key_table = read_u32(bytes, 8)? as usize;
        let data_table = read_u32(bytes, 12)? as usize;
        let count = read_u32(bytes, 16)? as usize;

        let mut params = Vec::with_capacity(count);
        for i in 0..count {
            let idx = HEADER_LEN + i * INDEX_LEN;
            let key_off = read_u16(bytes, idx)? as usize;
            let fmt = read_u16(bytes, idx + 2)?;
            let len = read_u32(bytes, idx + 4)? as usize;
            let max_len = read_u32(bytes, idx + 8)?;
            let data_off = read_u32(bytes, idx + 12)? as usize;

            let key_start = key_table + key_off;
            let key_bytes = bytes
                .get(key_start..)
                .ok_or_else(|| SaveError::format("SFO key out of range"))?;
            let key_end = key_bytes.iter().position(|&b| b == 0).unwrap_or(key_bytes.len());
            let key = String::from_utf8_lossy(&key_bytes[..key_end]).into_owned();

            let start = data_table + data_off;
            let data = bytes
                .get(start..start + len)
                .ok_or_else(|| SaveError::format(format!("SFO value {} out of range", key)))?
                .to_vec();

            params.push(SfoParam {
                key,
                fmt,
                data,
                max_len,
            });
        }
        Ok(Self { params })
    }

    pub fn read(path: &Path) -> SaveResult<Self> {
        let bytes = fs::read(path).at(path)?;
        Self::parse(&bytes)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut keys = Vec::new();
        let mut key_offsets = Vec::with_capacity(self.params.len());
        for p in &self.params {
            key_offsets.push(keys.len() as u16);
            keys.extend_from_slice(p.key.as_bytes());
            keys.push(0);
        }
        while keys.len() % 4 != 0 {
            keys.push(0);
        }

        let key_table = HEADER_LEN + self.params.len() * INDEX_LEN;
        let data_table = key_table + keys.len();

        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&(key_table as u32).to_le_bytes());
        out.extend_from_slice(&(data_table as u32).to_le_bytes());
        out.extend_from_slice(&(self.params.len() as u32).to_le_bytes());

        let mut data = Vec::new();
        for (p, key_off) in self.params.iter().zip(key_offsets) {
            out.extend_from_slice(&key_off.to_le_bytes());
            out.extend_from_slice(&p.fmt.to_le_bytes());
            out.extend_from_slice(&(p.data.len() as u32).to_le_bytes());
            out.extend_from_slice(&p.max_len.to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());

            let mut value = p.data.clone();
            value.resize(p.max_len as usize, 0);
            data.extend_from_slice(&value);
        }

        out.extend_from_slice(&keys);
        out.extend_from_slice(&data);
        out
    }

    pub fn write(&self, path: &Path) -> SaveResult<()> {
        fs::write(path, self.to_bytes()).at(path)
    }

    fn find(&self, key: &str) -> Option<&SfoParam> {
        self.params.iter().find(|p| p.key == key)
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        let p = self.find(key)?;
        if p.fmt == FMT_INT32 {
            return None;
        }
        let end = p.data.iter().position(|&b| b == 0).unwrap_or(p.data.len());
        Some(String::from_utf8_lossy(&p.data[..end]).into_owned())
    }

    pub fn get_bin(&self, key: &str) -> Option<&[u8]> {
        self.find(key).map(|p| p.data.as_slice())
    }

    pub fn get_int(&self, key: &str) -> Option<u32> {
        let p = self.find(key)?;
        let b = p.data.get(..4)?;
        Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Replace a string value; it must fit the key's reserved size.
    pub fn set_str(&mut self, key: &str, value: &str) -> SaveResult<()> {
        let p = self
            .params
            .iter_mut()
            .find(|p| p.key == key)
            .ok_or_else(|| SaveError::not_found(format!("SFO key {}", key)))?;
        let mut data = value.as_bytes().to_vec();
        data.push(0);
        if data.len() > p.max_len as usize {
            return Err(SaveError::format(format!("{} longer than {} bytes", key, p.max_len)));
        }
        p.data = data;
        Ok(())
    }

    /// Overwrite a binary value in place; length may not exceed the reserved size.
    pub fn set_bin(&mut self, key: &str, value: &[u8]) -> SaveResult<()> {
        let p = self
            .params
            .iter_mut()
            .find(|p| p.key == key)
            .ok_or_else(|| SaveError::not_found(format!("SFO key {}", key)))?;
        if value.len() > p.max_len as usize {
            return Err(SaveError::format(format!("{} longer than {} bytes", key, p.max_len)));
        }
        p.data = value.to_vec();
        Ok(())
    }

    pub fn push_str(&mut self, key: &str, value: &str, max_len: u32) {
        let mut data = value.as_bytes().to_vec();
        data.push(0);
        self.params.push(SfoParam {
            key: key.to_string(),
            fmt: FMT_UTF8,
            data,
            max_len,
        });
    }

    pub fn push_bin(&mut self, key: &str, value: &[u8], max_len: u32) {
        self.params.push(SfoParam {
            key: key.to_string(),
            fmt: FMT_UTF8_SPECIAL,
            data: value.to_vec(),
            max_len,
        });
    }

    pub fn push_int(&mut self, key: &str, value: u32) {
        self.params.push(SfoParam {
            key: key.to_string(),
            fmt: FMT_INT32,
            data: value.to_le_bytes().to_vec(),
            max_len: 4,
        });
    }
}

/// Names stored in a `SAVEDATA_FILE_LIST` blob (32-byte records, 13-byte name).
pub fn file_list_names(blob: &[u8]) -> Vec<String> {
    blob.chunks_exact(32)
        .filter_map(|rec| {
            let name = &rec[..13];
            let end = name.iter().position(|&b| b == 0).unwrap_or(13);
            (end > 0).then(|| String::from_utf8_lossy(&name[..end]).into_owned())
        })
        .collect()
}

/// Standard PSP save metadata, used when building saves from scratch.
pub fn psp_save_sfo(dir_name: &str, title: &str, files: &[&str]) -> Sfo {
    let mut list = vec![0u8; 0xC60];
    for (i, name) in files.iter().enumerate().take(0xC60 / 32) {
        let bytes = name.as_bytes();
        let n = bytes.len().min(12);
        list[i * 32..i * 32 + n].copy_from_slice(&bytes[..n]);
    }

    let mut sfo = Sfo::new();
    sfo.push_str("CATEGORY", "MS", 4);
    sfo.push_int("PARENTAL_LEVEL", 1);
    sfo.push_str(SAVEDATA_DETAIL, "", 1024);
    sfo.push_str(SAVEDATA_DIRECTORY, dir_name, 64);
    sfo.push_bin(SAVEDATA_FILE_LIST, &list, 0xC60);
    sfo.push_bin(SAVEDATA_PARAMS, &[0u8; 0x80], 0x80);
    sfo.push_str(SAVEDATA_TITLE, "", 128);
    sfo.push_str(TITLE, title, 128);
    sfo
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_parse_preserves_values() {
        let sfo = psp_save_sfo("ULUS10041DATA00", "Test Game", &["DATA.BIN", "ICON0.PNG"]);
        let bytes = sfo.to_bytes();
        let parsed = Sfo::parse(&bytes).unwrap();

        assert_eq!(parsed.get_str(TITLE).as_deref(), Some("Test Game"));
        assert_eq!(parsed.get_str(SAVEDATA_DIRECTORY).as_deref(), Some("ULUS10041DATA00"));
        assert_eq!(parsed.get_int("PARENTAL_LEVEL"), Some(1));
        assert_eq!(parsed.to_bytes(), bytes);
    }

    #[test]
    fn test_set_str_respects_max_len() {
        let mut sfo = psp_save_sfo("ULUS10041DATA00", "T", &[]);
        assert!(sfo.set_str("CATEGORY", "TOOLONG").is_err());
        sfo.set_str(SAVEDATA_DIRECTORY, "ULES00001DATA00").unwrap();
        assert_eq!(sfo.get_str(SAVEDATA_DIRECTORY).unwrap(), "ULES00001DATA00");
        assert!(sfo.set_str("MISSING", "x").is_err());
    }

    #[test]
    fn test_file_list_names() {
        let sfo = psp_save_sfo("D", "T", &["DATA.BIN", "SECURE.BIN"]);
        let names = file_list_names(sfo.get_bin(SAVEDATA_FILE_LIST).unwrap());
        assert_eq!(names, vec!["DATA.BIN", "SECURE.BIN"]);
    }

    #[test]
    fn test_rejects_bad_magic() {
        assert!(matches!(Sfo::parse(b"NOPE and more bytes here"), Err(SaveError::FormatInvalid(_))));
    }
}
