use crate::store::StoreError;

#[derive(Debug)]
pub enum QueueError {
    /// The scheduler was asked to stop but an in-flight tick did not finish
    /// within the shutdown window. The only error the scheduler propagates.
    ShutdownTimeout,
    Store(StoreError),
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::ShutdownTimeout => {
                write!(f, "Timed out waiting for queue to exit")
            }
            QueueError::Store(err) => write!(f, "Store error: {err}"),
        }
    }
}

impl std::error::Error for QueueError {}

impl From<StoreError> for QueueError {
    fn from(err: StoreError) -> Self {
        QueueError::Store(err)
    }
}
