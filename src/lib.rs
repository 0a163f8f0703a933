//! PSP / PS1 save-data engine.
//!
//! Providers list saves, the code builder attaches the operations each save
//! offers, and the dispatcher runs them. The user interface stays outside,
//! behind the `Frontend` trait.

pub mod archive;
pub mod bulk;
pub mod codes;
pub mod config;
pub mod crypto;
pub mod error;
pub mod exec;
pub mod frontend;
pub mod iso;
pub mod logging;
pub mod net;
pub mod paths;
pub mod plugin;
pub mod providers;
pub mod ps1card;
pub mod saves;
pub mod sfo;
pub mod webserver;
