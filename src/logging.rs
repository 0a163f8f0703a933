use env_logger::{Builder, Env, Target};
use std::fs::{self, OpenOptions};
use std::path::Path;

/// Install the global logger. `RUST_LOG` overrides the default filter.
///
/// With `log_file` set, output is appended there instead of stderr. Calling
/// this twice is harmless; the first logger stays installed.
pub fn init(debug: bool, log_file: Option<&Path>) {
    let default = if debug { "debug" } else { "info" };
    let mut builder = Builder::from_env(Env::default().default_filter_or(default));
    builder.format_timestamp_secs();

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok();
        }
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("[savetool] Cannot open log file {}: {}", path.display(), e),
        }
    }

    if builder.try_init().is_err() {
        log::debug!("[savetool] Logger already initialised");
    }
}
