pub mod args;
pub mod commands;
pub mod root;

pub use args::{Args, CacheAction, Commands, HistoryAction};
pub use root::RootCommand;
