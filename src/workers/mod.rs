pub mod retry_sweeper;
pub mod validation_poller;

pub use retry_sweeper::{RetrySweeper, SweepStats};
pub use validation_poller::{PollJob, ValidationPoller};
