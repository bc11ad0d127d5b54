//! Fixed-size buffers for socket data
//!
//! Stream sockets use a [`ByteRing`], datagram sockets a [`DatagramQueue`].
//! Both are sized by const generics and never allocate.

use crate::net::addr::IpAddress;
use crate::net::error::NetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    Full,
    Empty,
    PacketTooLarge,
}

impl From<BufferError> for NetError {
    fn from(err: BufferError) -> Self {
        match err {
            BufferError::Full | BufferError::Empty => NetError::WouldBlock,
            BufferError::PacketTooLarge => NetError::Parameter,
        }
    }
}

/// Circular byte buffer with an adjustable usable size
///
/// `limit` caps how much of the `N` bytes of storage may be in use, which is
/// how buffer-size options take effect without reallocating.
pub struct ByteRing<const N: usize> {
    data: [u8; N],
    head: usize,
    count: usize,
    limit: usize,
}

impl<const N: usize> ByteRing<N> {
    pub const fn new() -> Self {
        Self {
            data: [0; N],
            head: 0,
            count: 0,
            limit: N,
        }
    }

    /// Copy as much of `src` as fits, returns the number of bytes taken
    pub fn write(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.free());
        let tail = (self.head + self.count) % N;
        let first = n.min(N - tail);
        self.data[tail..tail + first].copy_from_slice(&src[..first]);
        self.data[..n - first].copy_from_slice(&src[first..n]);
        self.count += n;
        n
    }

    /// Move up to `dst.len()` bytes out, returns the number of bytes read
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.count);
        let first = n.min(N - self.head);
        dst[..first].copy_from_slice(&self.data[self.head..self.head + first]);
        dst[first..n].copy_from_slice(&self.data[..n - first]);
        self.head = (self.head + n) % N;
        self.count -= n;
        n
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Bytes that can still be written under the current limit
    pub fn free(&self) -> usize {
        self.limit.saturating_sub(self.count)
    }

    /// Change the usable size; fails if outside `1..=N`
    pub fn set_limit(&mut self, limit: usize) -> Result<(), BufferError> {
        if limit == 0 || limit > N {
            return Err(BufferError::PacketTooLarge);
        }
        self.limit = limit;
        Ok(())
    }
}

impl<const N: usize> Default for ByteRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy)]
struct DatagramSlot<const SIZE: usize> {
    source: IpAddress,
    port: u16,
    len: usize,
    data: [u8; SIZE],
}

/// Metadata of a datagram popped from a [`DatagramQueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatagramInfo {
    pub source: IpAddress,
    pub port: u16,
    /// Bytes copied into the caller's buffer
    pub len: usize,
}

/// Queue of up to `DEPTH` datagrams of at most `SIZE` bytes each
pub struct DatagramQueue<const DEPTH: usize, const SIZE: usize> {
    slots: [DatagramSlot<SIZE>; DEPTH],
    head: usize,
    count: usize,
}

impl<const DEPTH: usize, const SIZE: usize> DatagramQueue<DEPTH, SIZE> {
    pub const fn new() -> Self {
        const {
            assert!(DEPTH > 0, "datagram queue needs at least one slot");
        }
        Self {
            slots: [DatagramSlot {
                source: IpAddress::UNSPECIFIED,
                port: 0,
                len: 0,
                data: [0; SIZE],
            }; DEPTH],
            head: 0,
            count: 0,
        }
    }

    /// Queue a datagram
    /// Returns an error if the queue is full or the payload is too large
    pub fn push(&mut self, source: IpAddress, port: u16, payload: &[u8]) -> Result<(), BufferError> {
        if payload.len() > SIZE {
            return Err(BufferError::PacketTooLarge);
        }
        if self.count == DEPTH {
            return Err(BufferError::Full);
        }

        let slot = &mut self.slots[(self.head + self.count) % DEPTH];
        slot.source = source;
        slot.port = port;
        slot.len = payload.len();
        slot.data[..payload.len()].copy_from_slice(payload);

        self.count += 1;
        Ok(())
    }

    /// Pop the oldest datagram into `dst`
    ///
    /// A datagram longer than `dst` is truncated; the excess is discarded.
    pub fn pop(&mut self, dst: &mut [u8]) -> Result<DatagramInfo, BufferError> {
        if self.count == 0 {
            return Err(BufferError::Empty);
        }

        let slot = &self.slots[self.head];
        let len = slot.len.min(dst.len());
        dst[..len].copy_from_slice(&slot.data[..len]);
        let info = DatagramInfo {
            source: slot.source,
            port: slot.port,
            len,
        };

        self.head = (self.head + 1) % DEPTH;
        self.count -= 1;
        Ok(info)
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn len(&self) -> usize {
        self.count
    }
}

impl<const DEPTH: usize, const SIZE: usize> Default for DatagramQueue<DEPTH, SIZE> {
    fn default() -> Self {
        Self::new()
    }
}
