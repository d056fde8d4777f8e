use std::{cell::RefCell, fmt, mem, rc::Rc};

/// Cooperative cancellation shared between a task and the operations it
/// blocks on.
///
/// Cloning a token yields another handle to the same flag. Cancelling runs
/// every registered listener synchronously, exactly once.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Rc<RefCell<TokenInner>>,
}

#[derive(Default)]
struct TokenInner {
    cancelled: bool,
    /// Cancelled as soon as any waiter registered under it is resumed.
    group: bool,
    next_id: u64,
    listeners: Vec<(ListenerId, Box<dyn FnOnce()>)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ListenerId(u64);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token shared by the candidates of a select: the first waiter that
    /// receives a value claims it, retracting all the others.
    pub(crate) fn group() -> Self {
        let token = Self::default();
        token.inner.borrow_mut().group = true;
        token
    }

    pub fn cancel(&self) {
        let listeners = {
            let mut inner = self.inner.borrow_mut();
            if inner.cancelled {
                return;
            }
            inner.cancelled = true;
            mem::take(&mut inner.listeners)
        };

        log::trace!("cancel token fired, {} listeners", listeners.len());

        for (_, listener) in listeners {
            listener();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.borrow().cancelled
    }

    pub(crate) fn is_group(&self) -> bool {
        self.inner.borrow().group
    }

    /// Registers `listener` to run on cancellation. Returns `None`, without
    /// running it, if the token is already cancelled.
    pub(crate) fn on_cancel(&self, listener: impl FnOnce() + 'static) -> Option<ListenerId> {
        let mut inner = self.inner.borrow_mut();
        if inner.cancelled {
            return None;
        }

        let id = ListenerId(inner.next_id);
        inner.next_id += 1;
        inner.listeners.push((id, Box::new(listener)));

        Some(id)
    }

    pub(crate) fn remove_listener(&self, id: ListenerId) {
        self.inner.borrow_mut().listeners.retain(|(i, _)| *i != id);
    }

    #[cfg(test)]
    pub(crate) fn num_listeners(&self) -> usize {
        self.inner.borrow().listeners.len()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("CancelToken")
            .field("cancelled", &inner.cancelled)
            .field("group", &inner.group)
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}
