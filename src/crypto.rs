//! Per-title keys and the savedata container transform.

mod keys;
mod psp;

pub use keys::{GameKey, KeyChain, KeyFile, KeySource, Keystore, parse_keystore};
pub use psp::{PspSavedata, SavedataCrypto};
