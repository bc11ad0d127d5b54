//! Socket handles and the live-handle table
//!
//! A [`SocketHandle`] is a slot index plus a generation counter. Stacks keep
//! their sockets in a [`SocketPool`]; closing a socket bumps the slot's
//! generation, so any copy of the old handle is rejected with
//! [`NetError::NoSocket`] instead of reaching whatever reuses the slot.

use core::fmt;

use crate::net::error::{NetError, NetResult};

/// Opaque token for one open socket of one stack
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketHandle {
    index: u16,
    generation: u16,
}

impl SocketHandle {
    /// Pack into a single integer, for stacks that hand tokens to firmware
    pub const fn into_raw(self) -> u32 {
        ((self.generation as u32) << 16) | self.index as u32
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self {
            index: raw as u16,
            generation: (raw >> 16) as u16,
        }
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl fmt::Debug for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SocketHandle({}#{})", self.index, self.generation)
    }
}

impl fmt::Display for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "sock{}#{}", self.index, self.generation)
    }
}

/// Lifecycle state of a socket as seen through the interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// Handle not yet issued
    Unopened,
    /// Opened, possibly bound
    Open,
    /// Passive TCP socket accepting connections
    Listening,
    /// Connected TCP socket
    Connected,
    /// Handle released, terminal
    Closed,
}

struct Slot<T> {
    generation: u16,
    value: Option<T>,
}

/// Fixed-capacity table of live sockets
pub struct SocketPool<T, const N: usize> {
    slots: [Slot<T>; N],
    len: usize,
}

impl<T, const N: usize> SocketPool<T, N> {
    pub fn new() -> Self {
        assert!(N <= u16::MAX as usize, "socket pool too large for handle index");
        Self {
            slots: core::array::from_fn(|_| Slot {
                generation: 0,
                value: None,
            }),
            len: 0,
        }
    }

    /// Store a socket and issue its handle
    ///
    /// Fails with `NoSocket` when every slot is taken.
    pub fn insert(&mut self, value: T) -> NetResult<SocketHandle> {
        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.value.is_none())
            .ok_or(NetError::NoSocket)?;
        slot.value = Some(value);
        self.len += 1;
        Ok(SocketHandle {
            index: index as u16,
            generation: slot.generation,
        })
    }

    fn slot(&self, handle: SocketHandle) -> NetResult<&Slot<T>> {
        self.slots
            .get(handle.index())
            .filter(|slot| slot.generation == handle.generation && slot.value.is_some())
            .ok_or(NetError::NoSocket)
    }

    pub fn get(&self, handle: SocketHandle) -> NetResult<&T> {
        self.slot(handle)?.value.as_ref().ok_or(NetError::NoSocket)
    }

    pub fn get_mut(&mut self, handle: SocketHandle) -> NetResult<&mut T> {
        let slot = self
            .slots
            .get_mut(handle.index())
            .filter(|slot| slot.generation == handle.generation)
            .ok_or(NetError::NoSocket)?;
        slot.value.as_mut().ok_or(NetError::NoSocket)
    }

    /// Release a socket and invalidate every copy of its handle
    pub fn remove(&mut self, handle: SocketHandle) -> NetResult<T> {
        self.slot(handle)?;
        let slot = &mut self.slots[handle.index()];
        let value = slot.value.take().ok_or(NetError::NoSocket)?;
        slot.generation = slot.generation.wrapping_add(1);
        self.len -= 1;
        Ok(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SocketHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    SocketHandle {
                        index: index as u16,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == N
    }
}

impl<T, const N: usize> Default for SocketPool<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_exhaustion() {
        let mut pool: SocketPool<u32, 2> = SocketPool::new();
        pool.insert(1).unwrap();
        pool.insert(2).unwrap();
        assert!(pool.is_full());
        assert_eq!(pool.insert(3), Err(NetError::NoSocket));
    }

    #[test]
    fn test_stale_handle_rejected_after_reuse() {
        let mut pool: SocketPool<u32, 1> = SocketPool::new();
        let old = pool.insert(1).unwrap();
        assert_eq!(pool.remove(old), Ok(1));
        let new = pool.insert(2).unwrap();

        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert_eq!(pool.get(old), Err(NetError::NoSocket));
        assert_eq!(pool.remove(old), Err(NetError::NoSocket));
        assert_eq!(pool.get(new), Ok(&2));
    }

    #[test]
    fn test_raw_round_trip() {
        let mut pool: SocketPool<(), 4> = SocketPool::new();
        let handle = pool.insert(()).unwrap();
        assert_eq!(SocketHandle::from_raw(handle.into_raw()), handle);
    }
}
