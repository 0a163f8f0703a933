//! PS1 memory card images.
//!
//! A raw card (`.MCR`) is 16 blocks of 8 KiB. Block 0 holds the header frame
//! and fifteen 128-byte directory frames, one per data block. A virtual card
//! (`.VMP`) is the same image behind a signed 0x80-byte header.

mod card;
mod vmp;

pub use card::{MemoryCard, SlotInfo, SlotState};
pub use vmp::{vmp_resign, vmp_signature};

pub const CARD_SIZE: usize = 0x20000;
pub const BLOCK_SIZE: usize = 0x2000;
pub const FRAME_SIZE: usize = 0x80;
pub const SLOT_COUNT: usize = 15;
pub const VMP_HEADER_SIZE: usize = 0x80;
pub const VMP_SIZE: usize = VMP_HEADER_SIZE + CARD_SIZE;
