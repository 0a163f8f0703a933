mod io;
mod settings;

pub use io::{load_cfg, save_cfg};
pub use settings::Settings;
