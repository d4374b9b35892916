//! Event fan-out for engine subscribers.

pub mod broadcaster;

pub use broadcaster::{BroadcastPublisher, EventReceiver, RecvError};
