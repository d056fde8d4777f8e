use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    fmt,
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

use serde::Serialize;

use super::{cancel::ListenerId, CancelToken, ChannelError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStat {
    pub peak_length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Waiting,
    Ready,
    Aborted,
    Taken,
}

/// Value-free half of a waiter, shared with cancellation listeners.
struct WaitState {
    phase: Cell<Phase>,
    waker: Cell<Option<Waker>>,
}

impl WaitState {
    fn wake(&self) {
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }

    /// Retracts a waiter that has not been resumed yet.
    fn abort(&self, live: &Cell<usize>) -> bool {
        if self.phase.get() != Phase::Waiting {
            return false;
        }

        self.phase.set(Phase::Aborted);
        live.set(live.get() - 1);
        self.wake();

        true
    }
}

struct Waiter<T> {
    state: Rc<WaitState>,
    slot: Rc<Cell<Option<T>>>,
    cancel: Option<(CancelToken, ListenerId)>,
}

struct QueueInner<T> {
    /// May still hold aborted waiters; they are skipped on resume and
    /// pruned when their `Block` is dropped.
    waiters: VecDeque<Waiter<T>>,
    peak: usize,
}

/// FIFO queue of suspended callers, each waiting for a `T`.
pub struct WaitQueue<T> {
    inner: Rc<RefCell<QueueInner<T>>>,
    live: Rc<Cell<usize>>,
    relay: bool,
}

impl<T> Default for WaitQueue<T> {
    fn default() -> Self {
        Self {
            inner: Rc::new(RefCell::new(QueueInner {
                waiters: VecDeque::new(),
                peak: 0,
            })),
            live: Rc::new(Cell::new(0)),
            relay: false,
        }
    }
}

impl<T> fmt::Debug for WaitQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitQueue")
            .field("len", &self.len())
            .field("peak", &self.peak_len())
            .field("relay", &self.relay)
            .finish()
    }
}

impl<T> WaitQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue of wakeups rather than values: a resumed waiter is only told
    /// to retry.
    ///
    /// Resuming a waiter never claims its select group, and a value whose
    /// `Block` is dropped before taking it is handed to the next waiter.
    pub fn relaying() -> Self {
        Self {
            relay: true,
            ..Self::default()
        }
    }

    /// Appends a waiter to the tail right away and returns the future that
    /// resolves once it is resumed.
    ///
    /// If `cancel` fires first, the waiter leaves the queue and the future
    /// resolves to [`ChannelError::Aborted`]. Dropping the future before it
    /// resolves also leaves the queue; dropping it after a value was handed
    /// over loses that value.
    pub fn block(&self, cancel: Option<&CancelToken>) -> Block<T> {
        let state = Rc::new(WaitState {
            phase: Cell::new(Phase::Waiting),
            waker: Cell::new(None),
        });
        let slot = Rc::new(Cell::new(None));

        let registration = match cancel {
            Some(token) => {
                let listener = {
                    let state = state.clone();
                    let live = self.live.clone();
                    move || {
                        if state.abort(&live) {
                            log::trace!("waiter aborted by cancellation");
                        }
                    }
                };

                match token.on_cancel(listener) {
                    Some(id) => Some((token.clone(), id)),
                    None => {
                        state.phase.set(Phase::Aborted);
                        return Block {
                            queue: self.inner.clone(),
                            live: self.live.clone(),
                            relay: self.relay,
                            state,
                            slot,
                        };
                    }
                }
            }
            None => None,
        };

        let mut inner = self.inner.borrow_mut();
        inner.waiters.push_back(Waiter {
            state: state.clone(),
            slot: slot.clone(),
            cancel: registration,
        });

        self.live.set(self.live.get() + 1);
        inner.peak = inner.peak.max(self.live.get());

        log::trace!("blocked, queue length {}", self.live.get());

        Block {
            queue: self.inner.clone(),
            live: self.live.clone(),
            relay: self.relay,
            state,
            slot,
        }
    }

    /// Hands `value` to the oldest waiter.
    ///
    /// Resuming an empty queue is a logic error in the caller and is
    /// reported as [`ChannelError::EmptyWaitQueue`].
    pub fn resume(&self, value: T) -> Result<(), ChannelError> {
        match pop_live(&self.inner) {
            Some(waiter) => {
                deliver(waiter, value, &self.live, !self.relay);
                Ok(())
            }
            None => {
                log::error!("resume called on an empty wait queue");
                Err(ChannelError::EmptyWaitQueue)
            }
        }
    }

    /// Hands a copy of `value` to every waiter currently in the queue.
    pub fn resume_all(&self, value: T)
    where
        T: Clone,
    {
        self.resume_all_with(|| value.clone())
    }

    /// Like [`WaitQueue::resume_all`], building each waiter's value with
    /// `make`.
    pub fn resume_all_with(&self, mut make: impl FnMut() -> T) {
        let waiters: Vec<_> = self.inner.borrow_mut().waiters.drain(..).collect();

        for waiter in waiters {
            // A sibling delivery may have claimed this waiter's select group.
            if waiter.state.phase.get() == Phase::Waiting {
                deliver(waiter, make(), &self.live, !self.relay);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.live.get()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn peak_len(&self) -> usize {
        self.inner.borrow().peak
    }

    pub fn stat(&self) -> QueueStat {
        QueueStat {
            peak_length: self.peak_len(),
        }
    }
}

fn pop_live<T>(queue: &RefCell<QueueInner<T>>) -> Option<Waiter<T>> {
    let mut inner = queue.borrow_mut();

    while let Some(waiter) = inner.waiters.pop_front() {
        if waiter.state.phase.get() == Phase::Waiting {
            return Some(waiter);
        }
    }

    None
}

/// Hands `value` to `waiter`. With `claim`, a select group the waiter was
/// registered under is cancelled before anything else gets a chance to run,
/// retracting every sibling.
fn deliver<T>(waiter: Waiter<T>, value: T, live: &Cell<usize>, claim: bool) {
    let Waiter {
        state,
        slot,
        cancel,
    } = waiter;

    slot.set(Some(value));
    state.phase.set(Phase::Ready);
    live.set(live.get() - 1);

    if let Some((token, id)) = cancel {
        token.remove_listener(id);

        if claim && token.is_group() {
            token.cancel();
        }
    }

    log::trace!("resumed, queue length {}", live.get());

    state.wake();
}

/// Future returned by [`WaitQueue::block`].
#[must_use = "futures do nothing unless polled"]
pub struct Block<T> {
    queue: Rc<RefCell<QueueInner<T>>>,
    live: Rc<Cell<usize>>,
    relay: bool,
    state: Rc<WaitState>,
    slot: Rc<Cell<Option<T>>>,
}

impl<T> Block<T> {
    pub fn is_resolved(&self) -> bool {
        self.state.phase.get() != Phase::Waiting
    }
}

impl<T> Future for Block<T> {
    type Output = Result<T, ChannelError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.state.phase.get() {
            Phase::Waiting => {
                self.state.waker.set(Some(cx.waker().clone()));
                Poll::Pending
            }
            Phase::Ready => match self.slot.take() {
                Some(value) => {
                    self.state.phase.set(Phase::Taken);
                    Poll::Ready(Ok(value))
                }
                None => panic!("`Block` resolved without a value"),
            },
            Phase::Aborted => {
                self.state.phase.set(Phase::Taken);
                Poll::Ready(Err(ChannelError::Aborted))
            }
            Phase::Taken => panic!("`Block` polled after completion"),
        }
    }
}

impl<T> Drop for Block<T> {
    fn drop(&mut self) {
        if self.state.abort(&self.live) {
            log::trace!("waiter dropped before being resumed");
        }

        let removed = {
            let mut inner = self.queue.borrow_mut();
            let position = inner
                .waiters
                .iter()
                .position(|w| Rc::ptr_eq(&w.state, &self.state));
            position.and_then(|i| inner.waiters.remove(i))
        };

        if let Some((token, id)) = removed.and_then(|w| w.cancel) {
            token.remove_listener(id);
        }

        if self.relay && self.state.phase.get() == Phase::Ready {
            self.state.phase.set(Phase::Taken);

            if let Some(value) = self.slot.take() {
                if let Some(waiter) = pop_live(&self.queue) {
                    log::trace!("passing an unclaimed wakeup on");
                    deliver(waiter, value, &self.live, false);
                }
            }
        }
    }
}

impl<T> fmt::Debug for Block<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("phase", &self.state.phase.get())
            .finish()
    }
}
