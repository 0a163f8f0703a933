pub mod operations;
pub mod types;

// Re-export types
pub use types::{AppConfig, AppContext, SortMode};

// Re-export operations
pub use operations::{Settings, load_cfg, save_cfg};
