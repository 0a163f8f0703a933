//! Save-entry data model shared by providers, the code builder and the
//! dispatcher.

pub mod command;
mod operations;
mod pure;
mod types;

pub use command::{Command, Opcode};
pub use operations::save_details;
pub use pure::{sort_codes, sort_saves};
pub use types::{
    CodeEntry, OptionItem, OptionList, OptionValue, PatchKind, SaveEntry, SaveFlags, SaveList,
    SaveType,
};
