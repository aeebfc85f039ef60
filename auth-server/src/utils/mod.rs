pub mod time_source;
pub mod token;

pub use time_source::{FakeTimeSource, SystemTimeSource, TimeSource};
