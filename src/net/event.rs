//! Socket readiness notification
//!
//! Stacks report readiness changes by calling [`SocketNotify::notify`], possibly
//! from an interrupt handler and possibly without any real change. The
//! [`EventQueue`] turns those calls into tokens on a bounded lock-free queue
//! that the caller drains from its normal context, where it re-polls the
//! socket. Nothing blocking ever runs inside `notify`.

use core::pin::Pin;
use core::sync::atomic::{AtomicBool, Ordering};
use core::task::{Context, Poll};

use crossbeam_queue::ArrayQueue;
use futures_util::stream::Stream;
use futures_util::task::AtomicWaker;

use crate::net::socket::SocketHandle;

/// Receiver of readiness notifications
///
/// Implementations must be callable from interrupt context: no blocking, no
/// locks that a socket operation could hold, and no calls back into the stack.
pub trait SocketNotify: Sync {
    fn notify(&self, socket: SocketHandle);
}

/// Token drained from an [`EventQueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketEvent {
    /// Something may have changed on this socket
    Ready(SocketHandle),
    /// Notifications were dropped, every attached socket should be re-polled
    Resync,
}

/// Bounded queue of readiness tokens
pub struct EventQueue {
    queue: ArrayQueue<SocketHandle>,
    overflowed: AtomicBool,
    waker: AtomicWaker,
}

impl EventQueue {
    /// Create a queue holding up to `capacity` pending tokens
    ///
    /// This is the only allocation of the crate and happens once, at setup.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            overflowed: AtomicBool::new(false),
            waker: AtomicWaker::new(),
        }
    }

    /// Take the next pending event, if any
    pub fn pop(&self) -> Option<SocketEvent> {
        if self.overflowed.swap(false, Ordering::AcqRel) {
            return Some(SocketEvent::Resync);
        }
        self.queue.pop().map(SocketEvent::Ready)
    }

    /// Hand every pending event to `f`, returns how many were handled
    pub fn drain(&self, mut f: impl FnMut(SocketEvent)) -> usize {
        let mut count = 0;
        while let Some(event) = self.pop() {
            f(event);
            count += 1;
        }
        count
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty() && !self.overflowed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Async view of the queue, one consumer at a time
    pub fn stream(&self) -> EventStream<'_> {
        EventStream { queue: self }
    }
}

impl SocketNotify for EventQueue {
    fn notify(&self, socket: SocketHandle) {
        if self.queue.push(socket).is_err() {
            // the caller re-polls everything on Resync, the token is not needed
            self.overflowed.store(true, Ordering::Release);
        }
        self.waker.wake();
    }
}

/// Stream of events from an [`EventQueue`]
///
/// Never terminates.
pub struct EventStream<'a> {
    queue: &'a EventQueue,
}

impl Stream for EventStream<'_> {
    type Item = SocketEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<SocketEvent>> {
        // fast path
        if let Some(event) = self.queue.pop() {
            return Poll::Ready(Some(event));
        }

        self.queue.waker.register(cx.waker());
        match self.queue.pop() {
            Some(event) => {
                self.queue.waker.take();
                Poll::Ready(Some(event))
            }
            None => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use futures_util::task::noop_waker_ref;

    fn handle(raw: u32) -> SocketHandle {
        SocketHandle::from_raw(raw)
    }

    #[test]
    fn test_fifo_order() {
        let queue = EventQueue::new(4);
        queue.notify(handle(1));
        queue.notify(handle(2));
        assert_eq!(queue.pop(), Some(SocketEvent::Ready(handle(1))));
        assert_eq!(queue.pop(), Some(SocketEvent::Ready(handle(2))));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_overflow_reports_resync_first() {
        let queue = EventQueue::new(1);
        queue.notify(handle(1));
        queue.notify(handle(2));
        assert_eq!(queue.pop(), Some(SocketEvent::Resync));
        assert_eq!(queue.pop(), Some(SocketEvent::Ready(handle(1))));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_stream_pending_then_ready() {
        let queue = EventQueue::new(2);
        let mut stream = queue.stream();
        let mut cx = Context::from_waker(noop_waker_ref());

        assert_eq!(stream.poll_next_unpin(&mut cx), Poll::Pending);
        queue.notify(handle(7));
        assert_eq!(
            stream.poll_next_unpin(&mut cx),
            Poll::Ready(Some(SocketEvent::Ready(handle(7))))
        );
    }
}
