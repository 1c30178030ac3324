pub mod task_element;

pub use task_element::{TaskElement, TaskStatus};
