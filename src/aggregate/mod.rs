//! Parallel fan-out phases and the retrying collection counter

pub mod counter;
pub mod fanout;

pub use counter::RetryingCounter;
pub use fanout::FanOutAggregator;
