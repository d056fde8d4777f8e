use std::{
    any::Any,
    cell::RefCell,
    fmt,
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
};

use futures::{future::LocalBoxFuture, stream::FusedStream, Stream};
use serde::Serialize;
use thiserror::Error;

use super::{buffer::Buffer, wait_queue::QueueStat, CancelToken, WaitQueue};
use crate::utils::capacity::Capacity;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("The channel is closed")]
    Closed,

    #[error("The operation was aborted")]
    Aborted,

    #[error("No data available in channel")]
    Empty,

    #[error("Tried to resume a waiter on an empty wait queue")]
    EmptyWaitQueue,
}

/// Peak occupancy of a channel's receiver queue, sender queue and buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChanStat {
    pub readers: QueueStat,
    pub writers: QueueStat,
    pub data: QueueStat,
}

struct ChannelState<T> {
    buffer: Buffer<T>,
    closed: bool,
    data_peak: usize,
}

struct Shared<T> {
    state: RefCell<ChannelState<T>>,
    senders: WaitQueue<()>,
    receivers: WaitQueue<Option<T>>,
}

/// A channel for tasks sharing one thread.
///
/// `Channel` is a handle: clones address the same channel, which lives until
/// the last handle is dropped.
pub struct Channel<T> {
    shared: Rc<Shared<T>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();
        f.debug_struct("Channel")
            .field("capacity", &state.buffer.capacity())
            .field("len", &state.buffer.len())
            .field("closed", &state.closed)
            .field("senders", &self.shared.senders)
            .field("receivers", &self.shared.receivers)
            .finish()
    }
}

pub fn channel<T>(capacity: impl Into<Capacity>) -> Channel<T> {
    Channel::new(capacity)
}

impl<T> Channel<T> {
    pub fn new(capacity: impl Into<Capacity>) -> Self {
        Self {
            shared: Rc::new(Shared {
                state: RefCell::new(ChannelState {
                    buffer: Buffer::new(capacity.into()),
                    closed: false,
                    data_peak: 0,
                }),
                senders: WaitQueue::relaying(),
                receivers: WaitQueue::new(),
            }),
        }
    }

    pub fn rendezvous() -> Self {
        Self::new(Capacity::Rendezvous)
    }

    pub fn unbounded() -> Self {
        Self::new(Capacity::Unbounded)
    }

    pub async fn send(&self, value: T) -> Result<(), ChannelError> {
        self.send_with(value, None).await
    }

    /// Sends `value`, waiting for room or for a receiver while the channel
    /// is full.
    ///
    /// Fails with [`ChannelError::Closed`] if the channel is (or becomes)
    /// closed before the value is taken, and with [`ChannelError::Aborted`]
    /// if `cancel` fires before the value is taken.
    ///
    /// A woken sender retries from scratch and gets no priority: a sender
    /// arriving in the meantime may take the freed slot or the waiting
    /// receiver first, sending this one back to the tail of the queue. Under
    /// constant load a blocked sender can therefore wait indefinitely.
    pub async fn send_with(
        &self,
        mut value: T,
        cancel: Option<&CancelToken>,
    ) -> Result<(), ChannelError> {
        let mut woken = false;

        loop {
            if woken && cancel.is_some_and(CancelToken::is_cancelled) {
                // The wakeup was meant for whoever sends next.
                self.wake_sender()?;
                return Err(ChannelError::Aborted);
            }

            // Closed may have changed while we were blocked, so every wakeup
            // starts over from here.
            value = match self.push_or_hand_off(value)? {
                None => {
                    // A select send wins only once its value is placed.
                    if let Some(group) = cancel.filter(|t| t.is_group()) {
                        group.cancel();
                    }
                    return Ok(());
                }
                Some(value) => value,
            };

            self.shared.senders.block(cancel).await?;
            woken = true;
        }
    }

    pub async fn recv(&self) -> Result<Option<T>, ChannelError> {
        self.recv_with(None).await
    }

    /// Receives the oldest value.
    ///
    /// Returns `Ok(None)` once the channel is closed and drained, or if it
    /// gets closed while waiting.
    pub async fn recv_with(&self, cancel: Option<&CancelToken>) -> Result<Option<T>, ChannelError> {
        if let Some(result) = self.take_buffered()? {
            return Ok(result);
        }

        // Only a rendezvous channel can have senders waiting on an empty
        // buffer: let one of them retry and find us in the queue.
        let blocked = self.shared.receivers.block(cancel);
        self.wake_sender()?;

        blocked.await
    }

    /// Non-blocking receive: [`ChannelError::Empty`] if nothing is
    /// available and the channel is still open.
    pub fn try_recv(&self) -> Result<Option<T>, ChannelError> {
        self.take_buffered()?.ok_or(ChannelError::Empty)
    }

    /// Closes the channel and wakes every blocked receiver with `None`.
    ///
    /// Buffered values stay available. Blocked senders are not woken; they
    /// fail when they next retry.
    pub fn close(&self) {
        {
            let mut state = self.shared.state.borrow_mut();
            if state.closed {
                return;
            }
            state.closed = true;
        }

        log::debug!(
            "channel closed, waking {} receivers",
            self.shared.receivers.len()
        );

        self.shared.receivers.resume_all_with(|| None);
    }

    pub fn can_send_immediately(&self) -> bool {
        let state = self.shared.state.borrow();
        !self.shared.receivers.is_empty() || (!state.closed && state.buffer.has_room())
    }

    pub fn can_recv_immediately(&self) -> bool {
        let state = self.shared.state.borrow();
        state.closed || !self.shared.senders.is_empty() || !state.buffer.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.borrow().closed
    }

    pub fn capacity(&self) -> Capacity {
        self.shared.state.borrow().buffer.capacity()
    }

    /// Number of buffered values.
    pub fn len(&self) -> usize {
        self.shared.state.borrow().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_blocked_senders(&self) -> usize {
        self.shared.senders.len()
    }

    pub fn num_blocked_receivers(&self) -> usize {
        self.shared.receivers.len()
    }

    pub fn stat(&self) -> ChanStat {
        ChanStat {
            readers: self.shared.receivers.stat(),
            writers: self.shared.senders.stat(),
            data: QueueStat {
                peak_length: self.shared.state.borrow().data_peak,
            },
        }
    }

    /// Stream of received values, ending once the channel is closed and
    /// drained.
    pub fn iter(&self) -> RecvStream<'_, T> {
        RecvStream {
            channel: self,
            pending: None,
            done: false,
        }
    }

    /// Waits until a send would complete without blocking.
    pub(crate) async fn ready_send(
        &self,
        cancel: Option<&CancelToken>,
    ) -> Result<(), ChannelError> {
        loop {
            if self.is_closed() {
                return Err(ChannelError::Closed);
            }
            if self.can_send_immediately() {
                return Ok(());
            }

            self.shared.senders.block(cancel).await?;
        }
    }

    /// Sends without blocking. Returns `false`, dropping `value`, if the
    /// channel is closed or has neither a waiting receiver nor room.
    pub(crate) fn try_send_now(&self, value: T) -> bool {
        match self.push_or_hand_off(value) {
            Ok(None) => true,
            Ok(Some(_)) | Err(ChannelError::Closed) => false,
            Err(e) => {
                log::error!("non-blocking send failed: {e}");
                debug_assert!(false, "non-blocking send failed: {e}");
                false
            }
        }
    }

    /// Hands `value` to a waiting receiver or buffers it. Gives it back if
    /// neither is possible.
    fn push_or_hand_off(&self, value: T) -> Result<Option<T>, ChannelError> {
        let mut state = self.shared.state.borrow_mut();

        if state.closed {
            return Err(ChannelError::Closed);
        }

        if !self.shared.receivers.is_empty() {
            drop(state);
            self.shared.receivers.resume(Some(value))?;
            return Ok(None);
        }

        match state.buffer.push(value) {
            Ok(()) => {
                state.data_peak = state.data_peak.max(state.buffer.len());
                Ok(None)
            }
            Err(value) => Ok(Some(value)),
        }
    }

    /// `Some(Some(v))` for a buffered value, `Some(None)` if closed and
    /// drained, `None` if the caller has to wait.
    fn take_buffered(&self) -> Result<Option<Option<T>>, ChannelError> {
        let mut state = self.shared.state.borrow_mut();

        match state.buffer.dequeue() {
            Some(value) => {
                drop(state);
                self.wake_sender()?;
                Ok(Some(Some(value)))
            }
            None if state.closed => Ok(Some(None)),
            None => Ok(None),
        }
    }

    /// Lets the oldest blocked sender, if any, retry.
    fn wake_sender(&self) -> Result<(), ChannelError> {
        if !self.shared.senders.is_empty() {
            self.shared.senders.resume(())?;
        }
        Ok(())
    }

    pub(crate) fn id(&self) -> *const () {
        Rc::as_ptr(&self.shared) as *const ()
    }
}

impl<T: 'static> Channel<T> {
    pub(crate) fn as_erased(&self) -> Rc<dyn ErasedChannel> {
        Rc::new(self.clone())
    }
}

/// Type-erased view of a channel, for code that manages channels of
/// different element types together.
pub(crate) trait ErasedChannel {
    fn close(&self);
    fn stat(&self) -> ChanStat;
    fn as_any(&self) -> &dyn Any;
}

impl<T: 'static> ErasedChannel for Channel<T> {
    fn close(&self) {
        Channel::close(self)
    }

    fn stat(&self) -> ChanStat {
        Channel::stat(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Stream returned by [`Channel::iter`].
///
/// Once it has ended it stays ended, even if it is polled again.
pub struct RecvStream<'a, T> {
    channel: &'a Channel<T>,
    pending: Option<LocalBoxFuture<'a, Result<Option<T>, ChannelError>>>,
    done: bool,
}

impl<'a, T: 'a> Stream for RecvStream<'a, T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.done {
            return Poll::Ready(None);
        }

        let channel = this.channel;
        let pending = this.pending.get_or_insert_with(|| Box::pin(channel.recv()));

        let result = match pending.as_mut().poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(result) => result,
        };
        this.pending = None;

        match result {
            Ok(Some(value)) => Poll::Ready(Some(value)),
            Ok(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Err(e) => {
                log::error!("channel stream ended on error: {e}");
                this.done = true;
                Poll::Ready(None)
            }
        }
    }
}

impl<'a, T: 'a> FusedStream for RecvStream<'a, T> {
    fn is_terminated(&self) -> bool {
        self.done
    }
}
