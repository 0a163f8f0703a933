use super::vmp::{is_vmp, vmp_header, vmp_resign};
use super::{BLOCK_SIZE, CARD_SIZE, FRAME_SIZE, SLOT_COUNT, VMP_HEADER_SIZE};
use crate::error::{IoContext, SaveError, SaveResult};
use std::fs;
use std::path::Path;

const STATE_FIRST: u32 = 0x51;
const STATE_MIDDLE: u32 = 0x52;
const STATE_LAST: u32 = 0x53;
const STATE_FREE: u32 = 0xA0;
const NO_NEXT: u16 = 0xFFFF;
const NAME_OFFSET: usize = 0x0A;
const NAME_LEN: usize = 21;
const TITLE_OFFSET: usize = 4;
const TITLE_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    First,
    Middle,
    Last,
    Free,
    Deleted,
    Unknown(u32),
}

impl SlotState {
    fn from_raw(raw: u32) -> Self {
        match raw {
            STATE_FIRST => SlotState::First,
            STATE_MIDDLE => SlotState::Middle,
            STATE_LAST => SlotState::Last,
            STATE_FREE => SlotState::Free,
            0xA1..=0xA3 => SlotState::Deleted,
            other => SlotState::Unknown(other),
        }
    }
}

/// Directory view of one save's first block.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotInfo {
    pub slot: usize,
    pub file_name: String,
    pub product_code: String,
    pub title: String,
    pub size: u32,
    pub blocks: usize,
}

#[derive(Debug, Clone)]
pub struct MemoryCard {
    data: Vec<u8>,
    vmp: Option<[u8; VMP_HEADER_SIZE]>,
}

fn xor_checksum(frame: &[u8]) -> u8 {
    frame[..FRAME_SIZE - 1].iter().fold(0, |acc, b| acc ^ b)
}

fn le_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn cstr(b: &[u8]) -> String {
    let end = b.iter().position(|&c| c == 0).unwrap_or(b.len());
    String::from_utf8_lossy(&b[..end]).into_owned()
}

/// Decode a Shift-JIS save title, dropping padding.
pub(crate) fn decode_title(raw: &[u8]) -> String {
    let end = raw.iter().position(|&c| c == 0).unwrap_or(raw.len());
    let (text, _, _) = encoding_rs::SHIFT_JIS.decode(&raw[..end]);
    text.trim().to_string()
}

impl MemoryCard {
    /// Empty, formatted raw card.
    pub fn formatted() -> Self {
        let mut card = Self {
            data: vec![0u8; CARD_SIZE],
            vmp: None,
        };
        card.data[0] = b'M';
        card.data[1] = b'C';
        card.seal_frame(0);
        for slot in 0..SLOT_COUNT {
            card.clear_frame(slot);
        }
        card
    }

    pub fn from_bytes(bytes: &[u8]) -> SaveResult<Self> {
        let (data, vmp) = if is_vmp(bytes) {
            let mut header = [0u8; VMP_HEADER_SIZE];
            header.copy_from_slice(&bytes[..VMP_HEADER_SIZE]);
            (bytes[VMP_HEADER_SIZE..].to_vec(), Some(header))
        } else if bytes.len() == CARD_SIZE {
            (bytes.to_vec(), None)
        } else {
            return Err(SaveError::format(format!("unexpected card size {}", bytes.len())));
        };
        if &data[..2] != b"MC" {
            return Err(SaveError::format("memory card header missing"));
        }
        Ok(Self { data, vmp })
    }

    pub fn open(path: &Path) -> SaveResult<Self> {
        let bytes = fs::read(path).at(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn is_vmp(&self) -> bool {
        self.vmp.is_some()
    }

    /// Raw 128 KiB image.
    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    /// Signed VMP image; raw cards get a fresh header.
    pub fn to_vmp(&self) -> SaveResult<Vec<u8>> {
        let mut out = self.vmp.unwrap_or_else(vmp_header).to_vec();
        out.extend_from_slice(&self.data);
        vmp_resign(&mut out)?;
        Ok(out)
    }

    /// Write back in the format it was opened in, resigning VMP images.
    pub fn save(&self, path: &Path) -> SaveResult<()> {
        let bytes = if self.is_vmp() {
            self.to_vmp()?
        } else {
            self.data.clone()
        };
        fs::write(path, bytes).at(path)
    }

    /// Replace the card contents with a raw image, keeping the container format.
    pub fn replace_raw(&mut self, raw: &[u8]) -> SaveResult<()> {
        let incoming = Self::from_bytes(raw)?;
        self.data = incoming.data;
        Ok(())
    }

    fn frame_range(slot: usize) -> std::ops::Range<usize> {
        let start = (slot + 1) * FRAME_SIZE;
        start..start + FRAME_SIZE
    }

    fn frame(&self, slot: usize) -> &[u8] {
        &self.data[Self::frame_range(slot)]
    }

    fn frame_mut(&mut self, slot: usize) -> &mut [u8] {
        &mut self.data[Self::frame_range(slot)]
    }

    fn block(&self, slot: usize) -> &[u8] {
        let start = (slot + 1) * BLOCK_SIZE;
        &self.data[start..start + BLOCK_SIZE]
    }

    fn block_mut(&mut self, slot: usize) -> &mut [u8] {
        let start = (slot + 1) * BLOCK_SIZE;
        &mut self.data[start..start + BLOCK_SIZE]
    }

    /// Frame index 0 is the card header; directory frames follow.
    fn seal_frame(&mut self, frame_index: usize) {
        let start = frame_index * FRAME_SIZE;
        let sum = xor_checksum(&self.data[start..start + FRAME_SIZE]);
        self.data[start + FRAME_SIZE - 1] = sum;
    }

    fn clear_frame(&mut self, slot: usize) {
        let frame = self.frame_mut(slot);
        frame.fill(0);
        frame[..4].copy_from_slice(&STATE_FREE.to_le_bytes());
        frame[8..10].copy_from_slice(&NO_NEXT.to_le_bytes());
        self.seal_frame(slot + 1);
    }

    pub fn state(&self, slot: usize) -> SlotState {
        SlotState::from_raw(le_u32(self.frame(slot)))
    }

    fn next(&self, slot: usize) -> Option<usize> {
        let f = self.frame(slot);
        let next = u16::from_le_bytes([f[8], f[9]]);
        (usize::from(next) < SLOT_COUNT).then_some(usize::from(next))
    }

    /// Blocks of the save starting at `slot`, in order.
    fn chain(&self, slot: usize) -> SaveResult<Vec<usize>> {
        if slot >= SLOT_COUNT || self.state(slot) != SlotState::First {
            return Err(SaveError::not_found(format!("no save in slot {}", slot)));
        }
        let mut blocks = vec![slot];
        let mut cur = slot;
        while let Some(next) = self.next(cur) {
            if blocks.contains(&next) || blocks.len() >= SLOT_COUNT {
                return Err(SaveError::format(format!("block chain loop at slot {}", slot)));
            }
            blocks.push(next);
            cur = next;
        }
        Ok(blocks)
    }

    pub fn slot(&self, slot: usize) -> SaveResult<SlotInfo> {
        let blocks = self.chain(slot)?;
        let frame = self.frame(slot);
        let file_name = cstr(&frame[NAME_OFFSET..NAME_OFFSET + NAME_LEN]);
        let product_code = file_name.get(2..12).unwrap_or(&file_name).to_string();
        let title_raw = &self.block(slot)[TITLE_OFFSET..TITLE_OFFSET + TITLE_LEN];
        Ok(SlotInfo {
            slot,
            title: decode_title(title_raw),
            product_code,
            file_name,
            size: le_u32(&frame[4..8]),
            blocks: blocks.len(),
        })
    }

    /// Saves whose directory frame marks an initial block.
    pub fn slots(&self) -> Vec<SlotInfo> {
        (0..SLOT_COUNT)
            .filter(|&s| self.state(s) == SlotState::First)
            .filter_map(|s| match self.slot(s) {
                Ok(info) => Some(info),
                Err(e) => {
                    log::warn!("[ps1card] Skipping slot {}: {}", s, e);
                    None
                }
            })
            .collect()
    }

    fn find_by_name(&self, name: &str) -> Option<usize> {
        (0..SLOT_COUNT).find(|&s| {
            self.state(s) == SlotState::First
                && cstr(&self.frame(s)[NAME_OFFSET..NAME_OFFSET + NAME_LEN]) == name
        })
    }

    /// Single save as `.mcs`: its directory frame followed by its data blocks.
    pub fn export_mcs(&self, slot: usize) -> SaveResult<Vec<u8>> {
        let blocks = self.chain(slot)?;
        let mut out = self.frame(slot).to_vec();
        out[8..10].copy_from_slice(&NO_NEXT.to_le_bytes());
        out[FRAME_SIZE - 1] = xor_checksum(&out);
        for b in blocks {
            out.extend_from_slice(self.block(b));
        }
        Ok(out)
    }

    /// Import an `.mcs` save into free blocks; a save with the same name is
    /// replaced. Returns the first slot used.
    pub fn import_mcs(&mut self, mcs: &[u8]) -> SaveResult<usize> {
        if mcs.len() < FRAME_SIZE + BLOCK_SIZE || (mcs.len() - FRAME_SIZE) % BLOCK_SIZE != 0 {
            return Err(SaveError::format("bad .mcs size"));
        }
        let header = &mcs[..FRAME_SIZE];
        if SlotState::from_raw(le_u32(header)) != SlotState::First {
            return Err(SaveError::format(".mcs header is not an initial block"));
        }
        let name = cstr(&header[NAME_OFFSET..NAME_OFFSET + NAME_LEN]);
        let count = (mcs.len() - FRAME_SIZE) / BLOCK_SIZE;

        if let Some(existing) = self.find_by_name(&name) {
            self.delete(existing)?;
        }

        let free: Vec<usize> = (0..SLOT_COUNT)
            .filter(|&s| matches!(self.state(s), SlotState::Free | SlotState::Deleted))
            .take(count)
            .collect();
        if free.len() < count {
            return Err(SaveError::format(format!("card needs {} free blocks, has {}", count, free.len())));
        }

        for (k, &slot) in free.iter().enumerate() {
            let state = match k {
                0 => STATE_FIRST,
                _ if k == count - 1 => STATE_LAST,
                _ => STATE_MIDDLE,
            };
            let next = free.get(k + 1).map(|&n| n as u16).unwrap_or(NO_NEXT);
            {
                let frame = self.frame_mut(slot);
                frame.fill(0);
                frame[..4].copy_from_slice(&state.to_le_bytes());
                if k == 0 {
                    frame[4..8].copy_from_slice(&((count * BLOCK_SIZE) as u32).to_le_bytes());
                    frame[NAME_OFFSET..NAME_OFFSET + NAME_LEN]
                        .copy_from_slice(&header[NAME_OFFSET..NAME_OFFSET + NAME_LEN]);
                }
                frame[8..10].copy_from_slice(&next.to_le_bytes());
            }
            self.seal_frame(slot + 1);
            let src = FRAME_SIZE + k * BLOCK_SIZE;
            self.block_mut(slot).copy_from_slice(&mcs[src..src + BLOCK_SIZE]);
        }

        log::info!("[ps1card] Imported {} into slot {} ({} blocks)", name, free[0], count);
        Ok(free[0])
    }

    /// Free every block of the save starting at `slot`.
    pub fn delete(&mut self, slot: usize) -> SaveResult<()> {
        for b in self.chain(slot)? {
            self.clear_frame(b);
            self.block_mut(b).fill(0);
        }
        Ok(())
    }
}
