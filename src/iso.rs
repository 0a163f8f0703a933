//! ISO <-> CSO (CISO v1) disk-image conversion.

use crate::error::{IoContext, SaveError, SaveResult};
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const CISO_MAGIC: &[u8; 4] = b"CISO";
const HEADER_SIZE: usize = 0x18;
const BLOCK_SIZE: usize = 2048;
const PLAIN_BIT: u32 = 0x8000_0000;

/// Sibling path with the extension swapped.
pub fn converted_path(src: &Path, ext: &str) -> PathBuf {
    src.with_extension(ext)
}

fn compress_block(block: &[u8]) -> SaveResult<Vec<u8>> {
    let mut enc = DeflateEncoder::new(Vec::new(), Compression::best());
    enc.write_all(block)?;
    Ok(enc.finish()?)
}

/// Compress `iso` into `cso`; returns the output size.
pub fn iso_to_cso(iso: &Path, cso: &Path) -> SaveResult<u64> {
    let total = fs::metadata(iso).at(iso)?.len();
    let blocks = total.div_ceil(BLOCK_SIZE as u64) as usize;
    let mut input = BufReader::new(File::open(iso).at(iso)?);

    let mut index: Vec<u32> = Vec::with_capacity(blocks + 1);
    let mut payload: Vec<u8> = Vec::new();
    let data_start = HEADER_SIZE + (blocks + 1) * 4;

    let mut buf = vec![0u8; BLOCK_SIZE];
    for i in 0..blocks {
        let len = (total as usize - i * BLOCK_SIZE).min(BLOCK_SIZE);
        buf.resize(len, 0);
        input.read_exact(&mut buf)?;

        let pos = u32::try_from(data_start + payload.len())
            .map_err(|_| SaveError::format("image too large for CISO v1"))?;
        let packed = compress_block(&buf)?;
        if packed.len() >= len {
            index.push(pos | PLAIN_BIT);
            payload.extend_from_slice(&buf);
        } else {
            index.push(pos);
            payload.extend_from_slice(&packed);
        }
    }
    let end = u32::try_from(data_start + payload.len())
        .map_err(|_| SaveError::format("image too large for CISO v1"))?;
    index.push(end);

    let mut out = BufWriter::new(File::create(cso).at(cso)?);
    out.write_all(CISO_MAGIC)?;
    out.write_all(&(HEADER_SIZE as u32).to_le_bytes())?;
    out.write_all(&total.to_le_bytes())?;
    out.write_all(&(BLOCK_SIZE as u32).to_le_bytes())?;
    out.write_all(&[1, 0, 0, 0])?;
    for entry in &index {
        out.write_all(&entry.to_le_bytes())?;
    }
    out.write_all(&payload)?;
    out.flush()?;

    log::info!("[iso] {} -> {} ({} blocks)", iso.display(), cso.display(), blocks);
    Ok(end as u64)
}

/// Expand `cso` into `iso`; returns the image size.
pub fn cso_to_iso(cso: &Path, iso: &Path) -> SaveResult<u64> {
    let mut input = BufReader::new(File::open(cso).at(cso)?);
    let mut header = [0u8; HEADER_SIZE];
    input.read_exact(&mut header)?;
    if &header[..4] != CISO_MAGIC {
        return Err(SaveError::format(format!("{} is not a CSO image", cso.display())));
    }
    let total = u64::from_le_bytes(header[8..16].try_into().map_err(|_| SaveError::format("CSO header"))?);
    let block_size = u32::from_le_bytes([header[16], header[17], header[18], header[19]]) as usize;
    let align = header[21];
    if block_size == 0 {
        return Err(SaveError::format("CSO block size is zero"));
    }
    let blocks = total.div_ceil(block_size as u64) as usize;

    let mut raw_index = vec![0u8; (blocks + 1) * 4];
    input.read_exact(&mut raw_index)?;
    let index: Vec<u32> = raw_index
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    let mut out = BufWriter::new(File::create(iso).at(iso)?);
    let mut written = 0u64;
    let mut chunk = Vec::new();
    for i in 0..blocks {
        let plain = index[i] & PLAIN_BIT != 0;
        let start = u64::from(index[i] & !PLAIN_BIT) << align;
        let end = u64::from(index[i + 1] & !PLAIN_BIT) << align;
        let want = (total - written).min(block_size as u64) as usize;

        input.seek(SeekFrom::Start(start))?;
        chunk.resize(end.saturating_sub(start) as usize, 0);
        input.read_exact(&mut chunk)?;

        let block = if plain {
            chunk.clone()
        } else {
            let mut dec = Vec::with_capacity(want);
            DeflateDecoder::new(&chunk[..]).read_to_end(&mut dec)?;
            dec
        };
        if block.len() < want {
            return Err(SaveError::format(format!("CSO block {} is truncated", i)));
        }

        out.write_all(&block[..want])?;
        written += want as u64;
    }
    out.flush()?;

    log::info!("[iso] {} -> {} ({} bytes)", cso.display(), iso.display(), written);
    Ok(written)
}
