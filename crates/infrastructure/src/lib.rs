pub mod json_file;
pub mod local_repository;
pub mod registry;

pub use json_file::JsonFileElementSource;
pub use local_repository::LocalSchedulerRepository;
pub use registry::RunnableRegistry;
