//! Transmit queue abstraction

use heapless::spsc::Queue;

use crate::{error::Error, frame::Frame};

/// Frames waiting for transmission, consumed by the MAC
pub trait TxQueue {
    /// A frame is available for transmission
    fn can_dequeue(&self) -> bool;

    /// Remove the next frame, fails when empty
    fn dequeue(&mut self) -> Result<Frame, Error>;

    fn is_empty(&self) -> bool;
}

/// Bounded FIFO transmit queue holding up to `N - 1` frames
pub struct FifoQueue<const N: usize> {
    inner: Queue<Frame, N>,
}

impl <const N: usize> FifoQueue<N> {
    pub fn new() -> Self {
        Self { inner: Queue::new() }
    }

    /// Append a frame, returning it when the queue is full
    pub fn enqueue(&mut self, frame: Frame) -> Result<(), Error> {
        self.inner.enqueue(frame).map_err(Error::QueueFull)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl <const N: usize> Default for FifoQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl <const N: usize> TxQueue for FifoQueue<N> {
    fn can_dequeue(&self) -> bool {
        !self.inner.is_empty()
    }

    fn dequeue(&mut self) -> Result<Frame, Error> {
        self.inner.dequeue().ok_or(Error::QueueEmpty)
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
