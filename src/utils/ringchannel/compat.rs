use std::ops::Deref;

use super::{CancelToken, Channel, ChannelError};
use crate::utils::capacity::Capacity;

/// A [`Channel`] whose send is split in two: wait with
/// [`CompatChannel::ready_send`], then commit synchronously with
/// [`CompatChannel::try_send_now`].
///
/// Meant for producers written against a plain FIFO, where checking for
/// room and pushing happen in separate calls. Everything else is the
/// wrapped channel, reachable through `Deref`.
pub struct CompatChannel<T> {
    channel: Channel<T>,
}

impl<T> Clone for CompatChannel<T> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
        }
    }
}

impl<T> std::fmt::Debug for CompatChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CompatChannel").field(&self.channel).finish()
    }
}

impl<T> CompatChannel<T> {
    pub fn new(capacity: impl Into<Capacity>) -> Self {
        Self {
            channel: Channel::new(capacity),
        }
    }

    /// Resolves once a send would complete without blocking. Fails with
    /// [`ChannelError::Closed`] if the channel is closed.
    pub async fn ready_send(&self, cancel: Option<&CancelToken>) -> Result<(), ChannelError> {
        self.channel.ready_send(cancel).await
    }

    /// Hands `value` to a waiting receiver or buffers it. Returns `false`,
    /// dropping the value, if the channel is closed or full.
    pub fn try_send_now(&self, value: T) -> bool {
        self.channel.try_send_now(value)
    }

    pub fn into_inner(self) -> Channel<T> {
        self.channel
    }
}

impl<T> Deref for CompatChannel<T> {
    type Target = Channel<T>;

    fn deref(&self) -> &Self::Target {
        &self.channel
    }
}

impl<T> From<Channel<T>> for CompatChannel<T> {
    fn from(channel: Channel<T>) -> Self {
        Self { channel }
    }
}
