pub mod batcher;
pub mod manager;
pub mod next_steps;
pub mod processor;

/// Maximum due items pulled per processing cycle.
pub const READ_BATCH_SIZE: usize = 50;

/// Maximum requests per bulk write accepted by the store.
pub const WRITE_BATCH_SIZE: usize = 25;

/// Total processing attempts a task gets before it is abandoned: the first
/// try plus exactly one retry. A task whose failure would be attempt number
/// `MAX_ATTEMPTS` is deleted and archived as failed instead of rescheduled.
pub const MAX_ATTEMPTS: u32 = 2;
