pub mod category;
pub mod config;
pub mod error;
pub mod file_config;
pub mod types;

pub use category::{Boss, Category, CategoryGroup, ClueTier, Skill};
pub use config::AppConfig;
pub use error::StatwatchError;
pub use file_config::FileConfig;
pub use types::*;
