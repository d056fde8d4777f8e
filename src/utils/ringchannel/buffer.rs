use ringbuffer::{AllocRingBuffer, GrowableAllocRingBuffer, RingBuffer};

use crate::utils::capacity::Capacity;

#[derive(Debug, Clone)]
enum BufType<T> {
    Rendezvous,
    Bounded(AllocRingBuffer<T>),
    Unbounded(GrowableAllocRingBuffer<T>),
}

/// Value storage of a channel.
///
/// Unlike a plain ring buffer, a full `Buffer` rejects new values instead of
/// overwriting the oldest one.
#[derive(Debug, Clone)]
pub struct Buffer<T> {
    buf: BufType<T>,
    capacity: Capacity,
}

impl<T> Buffer<T> {
    pub fn new(capacity: Capacity) -> Self {
        let buf = match capacity {
            Capacity::Rendezvous => BufType::Rendezvous,
            Capacity::Bounded(n) => BufType::Bounded(AllocRingBuffer::new(n.get())),
            Capacity::Unbounded => BufType::Unbounded(GrowableAllocRingBuffer::new()),
        };

        Self { buf, capacity }
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    pub fn has_room(&self) -> bool {
        self.capacity.admits(self.len())
    }

    /// Appends `value`, handing it back if the buffer has no room.
    pub fn push(&mut self, value: T) -> Result<(), T> {
        if !self.has_room() {
            return Err(value);
        }

        match &mut self.buf {
            BufType::Rendezvous => return Err(value),
            BufType::Bounded(b) => b.push(value),
            BufType::Unbounded(b) => b.push(value),
        }
        Ok(())
    }

    pub fn dequeue(&mut self) -> Option<T> {
        match &mut self.buf {
            BufType::Rendezvous => None,
            BufType::Bounded(b) => b.dequeue(),
            BufType::Unbounded(b) => b.dequeue(),
        }
    }

    pub fn len(&self) -> usize {
        match &self.buf {
            BufType::Rendezvous => 0,
            BufType::Bounded(b) => b.len(),
            BufType::Unbounded(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
