use std::{
    any::type_name,
    cell::RefCell,
    collections::BTreeMap,
    fmt,
    rc::Rc,
};

use thiserror::Error;

use crate::{
    config::ChanConfig,
    utils::{
        path::{ChanPath, PathError},
        ringchannel::{ChanStat, Channel, ErasedChannel},
    },
};

#[derive(PartialEq, Eq, Error, Debug)]
pub enum RegistryError {
    #[error("Requested channel type '{requested}', but channel is a '{expected}'")]
    WrongChannelType { requested: String, expected: String },

    #[error("Provided channel name is not valid")]
    InvalidChannelName(#[from] PathError),
}

struct RegisteredChannel {
    typename: &'static str,
    channel: Rc<dyn ErasedChannel>,
}

impl RegisteredChannel {
    fn new<T: 'static>(channel: &Channel<T>) -> Self {
        Self {
            typename: type_name::<T>(),
            channel: channel.as_erased(),
        }
    }

    fn downcast<T: 'static>(&self) -> Result<Channel<T>, RegistryError> {
        self.channel
            .as_any()
            .downcast_ref::<Channel<T>>()
            .cloned()
            .ok_or_else(|| RegistryError::WrongChannelType {
                requested: type_name::<T>().to_string(),
                expected: self.typename.to_string(),
            })
    }
}

#[derive(Default)]
struct RegistryInner {
    config: ChanConfig,
    channels: BTreeMap<ChanPath, RegisteredChannel>,
}

/// Hands out typed channels by name.
///
/// Channels are created on first request, with the capacity the
/// [`ChanConfig`] declares for them, and shared by every later request for
/// the same name. Clones of the registry share its channels.
#[derive(Default, Clone)]
pub struct ChanRegistry {
    inner: Rc<RefCell<RegistryInner>>,
}

impl ChanRegistry {
    pub fn new(config: ChanConfig) -> Self {
        ChanRegistry {
            inner: Rc::new(RefCell::new(RegistryInner {
                config,
                channels: BTreeMap::new(),
            })),
        }
    }

    /// Returns the channel named `name`, creating it if needed.
    ///
    /// Fails if the name is not a valid path, or if the channel already
    /// exists with a different element type.
    pub fn channel<T: 'static>(&self, name: &str) -> Result<Channel<T>, RegistryError> {
        let name = ChanPath::new(name)?;

        let mut inner = self.inner.borrow_mut();
        let name = inner.config.resolve(&name).clone();

        if let Some(registered) = inner.channels.get(&name) {
            return registered.downcast();
        }

        let capacity = inner.config.capacity_of(&name);
        log::debug!(
            "Creating channel '{name}' of '{}' with capacity {capacity}",
            type_name::<T>()
        );

        let channel = Channel::<T>::new(capacity);
        inner
            .channels
            .insert(name, RegisteredChannel::new(&channel));

        Ok(channel)
    }

    /// Closes every channel created so far.
    pub fn close_all(&self) {
        // Closing wakes receivers, which may call back into the registry.
        let channels: Vec<_> = self
            .inner
            .borrow()
            .channels
            .values()
            .map(|c| c.channel.clone())
            .collect();

        log::debug!("Closing {} channels", channels.len());

        for channel in channels {
            channel.close();
        }
    }

    pub fn names(&self) -> Vec<ChanPath> {
        self.inner.borrow().channels.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> BTreeMap<String, ChanStat> {
        self.inner
            .borrow()
            .channels
            .iter()
            .map(|(name, c)| (name.to_string(), c.channel.stat()))
            .collect()
    }
}

impl fmt::Debug for ChanRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ChanRegistry")
            .field(
                "channels",
                &inner
                    .channels
                    .iter()
                    .map(|(name, c)| (name.as_str(), c.typename))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
