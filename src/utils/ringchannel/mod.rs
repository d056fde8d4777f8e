mod buffer;
mod cancel;
mod channel;
mod compat;
mod select;
mod wait_queue;

pub use channel::*;
pub(crate) use channel::ErasedChannel;

pub use buffer::Buffer;
pub use cancel::CancelToken;
pub use compat::CompatChannel;
pub use select::{select, Select};
pub use wait_queue::{Block, QueueStat, WaitQueue};
