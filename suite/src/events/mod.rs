//! Event stream between running invocations and their consumer

mod channel;
mod types;

pub use channel::{DEFAULT_CHANNEL_CAPACITY, EventReceiver, EventSender, event_channel};
pub use types::RunEvent;
