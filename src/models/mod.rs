pub mod archive;
pub mod autoresponder;
pub mod queue_item;
pub mod subscriber;
pub mod task_result;

pub use archive::ArchiveItem;
pub use autoresponder::{Autoresponder, Step};
pub use queue_item::{EmailBody, QueueItem, TaskKind};
pub use subscriber::Subscriber;
pub use task_result::{TaskResult, TaskStatus};
