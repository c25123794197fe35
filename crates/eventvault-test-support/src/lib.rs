//! Shared test mocks and utilities for the eventvault storage engine.

mod adapter;
mod clock;
mod publisher;

pub use adapter::{FailingAdapter, FaultInjectingAdapter};
pub use clock::{FixedClock, SteppingClock};
pub use publisher::{FailingPublisher, RecordingPublisher};
