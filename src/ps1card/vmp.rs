use super::{VMP_HEADER_SIZE, VMP_SIZE};
use crate::error::{SaveError, SaveResult};
use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use sha1::{Digest, Sha1};

const VMP_MAGIC: &[u8; 4] = b"\0PMV";
const SEED_OFFSET: usize = 0x0C;
const HASH_OFFSET: usize = 0x20;
const HASH_LEN: usize = 0x14;

const VMP_KEY: [u8; 16] = [
    0xAB, 0x5A, 0xBC, 0x9F, 0xC1, 0xF4, 0x9D, 0xE6, 0xA0, 0x51, 0xDB, 0xAE, 0xFA, 0x51, 0x88, 0x59,
];
const VMP_IV: [u8; 16] = [
    0xB3, 0x0F, 0xFE, 0xED, 0xB7, 0xDC, 0x5E, 0xB7, 0x13, 0x3D, 0xA6, 0x0D, 0x1B, 0x6B, 0x2C, 0xDC,
];

/// Fresh VMP header with magic, data offset and a zero seed.
pub(super) fn vmp_header() -> [u8; VMP_HEADER_SIZE] {
    let mut h = [0u8; VMP_HEADER_SIZE];
    h[..4].copy_from_slice(VMP_MAGIC);
    h[4..8].copy_from_slice(&(VMP_HEADER_SIZE as u32).to_le_bytes());
    h
}

pub(super) fn is_vmp(bytes: &[u8]) -> bool {
    bytes.len() == VMP_SIZE && &bytes[..4] == VMP_MAGIC
}

/// Keyed SHA-1 over the whole file with the hash field zeroed.
pub fn vmp_signature(image: &[u8]) -> SaveResult<[u8; HASH_LEN]> {
    if !is_vmp(image) {
        return Err(SaveError::format("not a VMP image"));
    }
    let seed = &image[SEED_OFFSET..SEED_OFFSET + 0x14];
    let cipher = Aes128::new_from_slice(&VMP_KEY).map_err(|e| SaveError::crypto(e.to_string()))?;

    let mut salt = [0u8; 0x40];
    let mut block = GenericArray::clone_from_slice(&seed[..16]);
    cipher.decrypt_block(&mut block);
    salt[..16].copy_from_slice(&block);
    let mut block = GenericArray::clone_from_slice(&seed[..16]);
    cipher.encrypt_block(&mut block);
    salt[16..32].copy_from_slice(&block);

    for (s, iv) in salt[..16].iter_mut().zip(VMP_IV) {
        *s ^= iv;
    }
    let mut work = [0xFFu8; 16];
    work[..4].copy_from_slice(&seed[0x10..0x14]);
    for (s, w) in salt[16..32].iter_mut().zip(work) {
        *s ^= w;
    }
    salt[0x14..].fill(0);

    let mut unsigned = image.to_vec();
    unsigned[HASH_OFFSET..HASH_OFFSET + HASH_LEN].fill(0);

    for s in salt.iter_mut() {
        *s ^= 0x36;
    }
    let mut inner = Sha1::new();
    inner.update(salt);
    inner.update(&unsigned);
    let inner = inner.finalize();

    for s in salt.iter_mut() {
        *s ^= 0x36 ^ 0x5C;
    }
    let mut outer = Sha1::new();
    outer.update(salt);
    outer.update(inner);

    let mut out = [0u8; HASH_LEN];
    out.copy_from_slice(&outer.finalize());
    Ok(out)
}

/// Rewrite the signature of a VMP image in place.
pub fn vmp_resign(image: &mut [u8]) -> SaveResult<()> {
    let sig = vmp_signature(image)?;
    image[HASH_OFFSET..HASH_OFFSET + HASH_LEN].copy_from_slice(&sig);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_vmp() -> Vec<u8> {
        let mut v = vmp_header().to_vec();
        v.resize(VMP_SIZE, 0);
        v
    }

    #[test]
    fn test_resign_is_stable() {
        let mut a = blank_vmp();
        vmp_resign(&mut a).unwrap();
        let first = a.clone();
        vmp_resign(&mut a).unwrap();
        assert_eq!(a, first);
        assert_ne!(&a[HASH_OFFSET..HASH_OFFSET + HASH_LEN], &[0u8; HASH_LEN]);
    }

    #[test]
    fn test_signature_covers_card_data() {
        let mut a = blank_vmp();
        let sig_a = vmp_signature(&a).unwrap();
        a[VMP_HEADER_SIZE + 0x3000] = 1;
        assert_ne!(vmp_signature(&a).unwrap(), sig_a);
    }

    #[test]
    fn test_rejects_raw_image() {
        assert!(vmp_signature(&vec![0u8; super::super::CARD_SIZE]).is_err());
    }
}
