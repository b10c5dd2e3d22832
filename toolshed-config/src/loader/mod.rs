mod manager;
pub mod merge;

pub use manager::{ConfigLayer, ConfigManager};
