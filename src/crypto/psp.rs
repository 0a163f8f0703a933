//! PSP savedata container transform and resign.
//!
//! Data files are transformed with AES-128 in counter mode. The initial
//! counter is the first half of SHA-256(key || upper-cased file name), so the
//! transform is length-preserving and decrypt == encrypt.

use super::keys::GameKey;
use crate::error::{IoContext, SaveError, SaveResult};
use crate::sfo::{self, Sfo};
use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

const PARAM_SFO: &str = "PARAM.SFO";
const SIGNATURE_OFFSET: usize = 0x10;
const SIGNATURE_LEN: usize = 16;
const HASH_OFFSET: usize = 16;

/// Crypto collaborator used by the dispatcher.
pub trait SavedataCrypto {
    fn decrypt_file(&self, file: &Path, key: &GameKey) -> SaveResult<()>;
    fn encrypt_file(&self, file: &Path, key: &GameKey) -> SaveResult<()>;
    /// Recompute file hashes and the container signature.
    fn resign(&self, save_dir: &Path) -> SaveResult<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PspSavedata;

fn file_name(file: &Path) -> SaveResult<String> {
    file.file_name()
        .map(|n| n.to_string_lossy().to_uppercase())
        .ok_or_else(|| SaveError::crypto(format!("no file name in {}", file.display())))
}

fn ctr_apply(key: &GameKey, name: &str, data: &mut [u8]) -> SaveResult<()> {
    let cipher = Aes128::new_from_slice(&key.0).map_err(|e| SaveError::crypto(e.to_string()))?;

    let mut hasher = Sha256::new();
    hasher.update(key.0);
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&digest[..16]);
    let mut counter = u128::from_be_bytes(iv);

    for chunk in data.chunks_mut(16) {
        let mut block = GenericArray::from(counter.to_be_bytes());
        cipher.encrypt_block(&mut block);
        for (b, k) in chunk.iter_mut().zip(block.iter()) {
            *b ^= k;
        }
        counter = counter.wrapping_add(1);
    }
    Ok(())
}

fn transform_in_place(file: &Path, key: &GameKey) -> SaveResult<()> {
    let name = file_name(file)?;
    let mut data = fs::read(file).at(file)?;
    ctr_apply(key, &name, &mut data)?;
    fs::write(file, data).at(file)
}

fn digest16(data: &[u8]) -> [u8; 16] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}

impl PspSavedata {
    /// Signature over the SFO image with the signature field zeroed.
    fn signature(sfo: &Sfo) -> SaveResult<[u8; 16]> {
        let mut unsigned = sfo.clone();
        let mut params = unsigned
            .get_bin(sfo::SAVEDATA_PARAMS)
            .ok_or_else(|| SaveError::crypto("SAVEDATA_PARAMS missing"))?
            .to_vec();
        if params.len() < SIGNATURE_OFFSET + SIGNATURE_LEN {
            return Err(SaveError::crypto("SAVEDATA_PARAMS too short"));
        }
        params[SIGNATURE_OFFSET..SIGNATURE_OFFSET + SIGNATURE_LEN].fill(0);
        unsigned.set_bin(sfo::SAVEDATA_PARAMS, &params)?;
        Ok(digest16(&unsigned.to_bytes()))
    }

    /// True when the stored signature matches the current metadata and every
    /// file listed in `SAVEDATA_FILE_LIST` still hashes to its record.
    pub fn verify(save_dir: &Path) -> SaveResult<bool> {
        let sfo = Sfo::read(&save_dir.join(PARAM_SFO))?;
        let expected = Self::signature(&sfo)?;
        let stored = sfo
            .get_bin(sfo::SAVEDATA_PARAMS)
            .and_then(|p| p.get(SIGNATURE_OFFSET..SIGNATURE_OFFSET + SIGNATURE_LEN));
        if stored != Some(&expected[..]) {
            return Ok(false);
        }

        let Some(list) = sfo.get_bin(sfo::SAVEDATA_FILE_LIST) else {
            return Ok(true);
        };
        for rec in list.chunks_exact(32) {
            let Some(name) = record_name(rec) else {
                continue;
            };
            let path = save_dir.join(&name);
            let data = fs::read(&path).at(&path)?;
            if rec[HASH_OFFSET..HASH_OFFSET + 16] != digest16(&data) {
                log::debug!("[crypto] {} does not match its file list hash", name);
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// File name of a 32-byte `SAVEDATA_FILE_LIST` record; `None` for empty slots.
fn record_name(rec: &[u8]) -> Option<String> {
    let end = rec[..13].iter().position(|&b| b == 0).unwrap_or(13);
    (end > 0).then(|| String::from_utf8_lossy(&rec[..end]).into_owned())
}

impl SavedataCrypto for PspSavedata {
    fn decrypt_file(&self, file: &Path, key: &GameKey) -> SaveResult<()> {
        log::debug!("[crypto] Decrypting {}", file.display());
        transform_in_place(file, key)
    }

    fn encrypt_file(&self, file: &Path, key: &GameKey) -> SaveResult<()> {
        log::debug!("[crypto] Encrypting {}", file.display());
        transform_in_place(file, key)
    }

    fn resign(&self, save_dir: &Path) -> SaveResult<()> {
        let sfo_path = save_dir.join(PARAM_SFO);
        let mut sfo = Sfo::read(&sfo_path)?;

        if let Some(list) = sfo.get_bin(sfo::SAVEDATA_FILE_LIST) {
            let mut list = list.to_vec();
            for rec in list.chunks_exact_mut(32) {
                let Some(name) = record_name(rec) else {
                    continue;
                };
                match fs::read(save_dir.join(&name)) {
                    Ok(data) => rec[HASH_OFFSET..HASH_OFFSET + 16].copy_from_slice(&digest16(&data)),
                    Err(_) => log::warn!("[crypto] {} listed but missing", name),
                }
            }
            sfo.set_bin(sfo::SAVEDATA_FILE_LIST, &list)?;
        }

        let signature = Self::signature(&sfo)?;
        let mut params = sfo
            .get_bin(sfo::SAVEDATA_PARAMS)
            .ok_or_else(|| SaveError::crypto("SAVEDATA_PARAMS missing"))?
            .to_vec();
        params[SIGNATURE_OFFSET..SIGNATURE_OFFSET + SIGNATURE_LEN].copy_from_slice(&signature);
        sfo.set_bin(sfo::SAVEDATA_PARAMS, &params)?;

        sfo.write(&sfo_path)?;
        log::info!("[crypto] Resigned {}", save_dir.display());
        Ok(())
    }
}
