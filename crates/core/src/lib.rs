pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::{AppConfig, EngineConfig, SourceConfig};
pub use errors::SchedulerError;
pub use models::{TaskElement, TaskStatus};

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
