use std::future::IntoFuture;

use futures::{future::LocalBoxFuture, stream::FuturesUnordered, StreamExt};

use super::{CancelToken, Channel, ChannelError};

/// One candidate operation of a [`Select`], erased over the channel's
/// element type.
trait SelectCase<'a, R> {
    /// Whether the operation can proceed without waiting.
    fn is_ready(&self) -> bool;

    /// Performs the operation, then its callback.
    fn commit(
        self: Box<Self>,
        cancel: Option<CancelToken>,
    ) -> LocalBoxFuture<'a, Result<R, ChannelError>>;

    fn channel_id(&self) -> *const ();
}

struct SendCase<'a, T, F> {
    channel: &'a Channel<T>,
    value: T,
    on_done: F,
}

impl<'a, T: 'a, R: 'a, F: FnOnce() -> R + 'a> SelectCase<'a, R> for SendCase<'a, T, F> {
    fn is_ready(&self) -> bool {
        self.channel.can_send_immediately()
    }

    fn commit(
        self: Box<Self>,
        cancel: Option<CancelToken>,
    ) -> LocalBoxFuture<'a, Result<R, ChannelError>> {
        let SendCase {
            channel,
            value,
            on_done,
        } = *self;

        Box::pin(async move {
            channel.send_with(value, cancel.as_ref()).await?;
            Ok(on_done())
        })
    }

    fn channel_id(&self) -> *const () {
        self.channel.id()
    }
}

struct RecvCase<'a, T, F> {
    channel: &'a Channel<T>,
    on_value: F,
}

impl<'a, T: 'a, R: 'a, F: FnOnce(Option<T>) -> R + 'a> SelectCase<'a, R> for RecvCase<'a, T, F> {
    fn is_ready(&self) -> bool {
        self.channel.can_recv_immediately()
    }

    fn commit(
        self: Box<Self>,
        cancel: Option<CancelToken>,
    ) -> LocalBoxFuture<'a, Result<R, ChannelError>> {
        let RecvCase { channel, on_value } = *self;

        Box::pin(async move {
            let value = channel.recv_with(cancel.as_ref()).await?;
            Ok(on_value(value))
        })
    }

    fn channel_id(&self) -> *const () {
        self.channel.id()
    }
}

/// Performs exactly one of several channel operations: the first one that
/// can proceed.
///
/// Candidates that are ready right away win in the order they were added.
/// Otherwise, if a default callback was given it runs instead; if not, all
/// candidates wait together and the first to complete wins, retracting the
/// others before they can complete too. Only the winner's callback runs.
///
/// ```ignore
/// let msg = select()
///     .recv(&ticks, |_| Msg::Tick)
///     .recv(&timer, |_| Msg::Timeout)
///     .await?;
/// ```
pub struct Select<'a, R = ()> {
    cases: Vec<Box<dyn SelectCase<'a, R> + 'a>>,
    default: Option<Box<dyn FnOnce() -> R + 'a>>,
    cancel: Option<CancelToken>,
}

pub fn select<'a, R>() -> Select<'a, R> {
    Default::default()
}

impl<'a, R> Default for Select<'a, R> {
    fn default() -> Self {
        Self {
            cases: vec![],
            default: None,
            cancel: None,
        }
    }
}

impl<'a, R: 'a> Select<'a, R> {
    pub fn send<T: 'a>(
        mut self,
        channel: &'a Channel<T>,
        value: T,
        on_done: impl FnOnce() -> R + 'a,
    ) -> Self {
        self.cases.push(Box::new(SendCase {
            channel,
            value,
            on_done,
        }));
        self
    }

    pub fn recv<T: 'a>(
        mut self,
        channel: &'a Channel<T>,
        on_value: impl FnOnce(Option<T>) -> R + 'a,
    ) -> Self {
        self.cases.push(Box::new(RecvCase { channel, on_value }));
        self
    }

    pub fn default(mut self, on_none: impl FnOnce() -> R + 'a) -> Self {
        self.default = Some(Box::new(on_none));
        self
    }

    /// Gives up with [`ChannelError::Aborted`] if `token` fires before any
    /// candidate wins.
    pub fn cancel_on(mut self, token: &CancelToken) -> Self {
        self.cancel = Some(token.clone());
        self
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Runs the select. Returns the callback's result, or `None` if there
    /// was nothing to run.
    pub async fn run(self) -> Result<Option<R>, ChannelError> {
        let Select {
            cases,
            default,
            cancel,
        } = self;

        if cases.is_empty() && default.is_none() {
            return Ok(None);
        }

        if let Some(index) = cases.iter().position(|c| c.is_ready()) {
            log::debug!("select: candidate {index} ready immediately");

            let case = cases.into_iter().nth(index);
            return match case {
                Some(case) => case.commit(cancel).await.map(Some),
                None => Ok(None),
            };
        }

        if let Some(on_none) = default {
            log::debug!("select: nothing ready, running default");
            return Ok(Some(on_none()));
        }

        debug_assert!(
            {
                let mut ids: Vec<_> = cases.iter().map(|c| c.channel_id()).collect();
                ids.sort();
                ids.windows(2).all(|w| w[0] != w[1])
            },
            "select candidates must target distinct channels"
        );

        race(cases, cancel.as_ref()).await.map(Some)
    }
}

async fn race<'a, R>(
    cases: Vec<Box<dyn SelectCase<'a, R> + 'a>>,
    cancel: Option<&CancelToken>,
) -> Result<R, ChannelError> {
    let group = CancelToken::group();

    let link = match cancel {
        Some(token) => {
            let group = group.clone();
            match token.on_cancel(move || group.cancel()) {
                Some(id) => Some((token, id)),
                None => return Err(ChannelError::Aborted),
            }
        }
        None => None,
    };

    log::debug!("select: racing {} candidates", cases.len());

    let mut armed: FuturesUnordered<_> = cases
        .into_iter()
        .map(|case| case.commit(Some(group.clone())))
        .collect();

    let mut result = Err(ChannelError::Aborted);
    while let Some(outcome) = armed.next().await {
        match outcome {
            // Retracted after another candidate won.
            Err(ChannelError::Aborted) => continue,
            outcome => {
                result = outcome;
                break;
            }
        }
    }

    if let Some((token, id)) = link {
        token.remove_listener(id);
    }

    result
}

impl<'a, R: 'a> IntoFuture for Select<'a, R> {
    type Output = Result<Option<R>, ChannelError>;
    type IntoFuture = LocalBoxFuture<'a, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.run())
    }
}
