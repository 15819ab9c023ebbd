pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod models;
pub mod recurrence;
pub mod rollover;
pub mod store;
pub mod tui;
pub mod utils;

pub use config::Config;
pub use models::{Context, JournalPage, Task, TaskDraft, TaskPatch};
pub use rollover::{DailyStore, Rollover, RolloverSummary};
pub use store::Store;
pub use utils::Profile;
