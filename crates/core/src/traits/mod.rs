pub mod operation;
pub mod scheduler;
pub mod source;

pub use operation::TaskElementsOperation;
pub use scheduler::{SchedulerRepository, TaskRunnable, TaskRunnableResolver};
pub use source::ElementSource;
