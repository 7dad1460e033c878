//! Per-job progress fan-out.
//!
//! Every job has one [`ProgressChannel`]. The coordinator publishes to it
//! after each state change; any number of observers subscribe and receive
//! an [`EventStream`]. A stream always starts with a replay of the current
//! state, then carries strictly increasing sequence numbers, and ends after
//! the terminal event. Observers that fall behind the broadcast buffer get a
//! fresh replay instead of the missed events, so a slow observer never
//! blocks the job or its other observers.

mod channel;
mod stream;

pub use channel::ProgressChannel;
pub use stream::EventStream;
