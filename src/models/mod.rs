pub mod task;
pub mod user;

pub use task::{
    DateField, GroupCount, Task, TaskDraft, TaskInput, TaskPriority, TaskStatus, UserTaskStats,
};
pub use user::{User, UserChanges, UserInput};
