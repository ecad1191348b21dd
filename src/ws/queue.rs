use std::collections::VecDeque;

/// Serialized frames waiting for an open connection, in send order.
#[derive(Debug)]
pub(crate) struct PendingQueue {
    frames: VecDeque<String>,
    capacity: usize,
}

impl PendingQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append a frame. Returns the oldest frame if it had to be evicted to make room.
    pub(crate) fn push(&mut self, frame: String) -> Option<String> {
        let evicted = if self.frames.len() >= self.capacity {
            self.frames.pop_front()
        } else {
            None
        };
        self.frames.push_back(frame);
        evicted
    }

    /// Put frames that were never written back at the head of the queue, keeping their order.
    ///
    /// Restored frames are older than anything already queued, so when the result exceeds the
    /// capacity they are the first to be evicted. Returns the number of evicted frames.
    pub(crate) fn restore<I>(&mut self, frames: I) -> usize
    where
        I: IntoIterator<Item = String>,
        I::IntoIter: DoubleEndedIterator,
    {
        for frame in frames.into_iter().rev() {
            self.frames.push_front(frame);
        }

        let mut evicted = 0;
        while self.frames.len() > self.capacity {
            self.frames.pop_front();
            evicted += 1;
        }
        evicted
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = String> + '_ {
        self.frames.drain(..)
    }

    pub(crate) fn clear(&mut self) {
        self.frames.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }
}
