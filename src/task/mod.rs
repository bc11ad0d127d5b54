//! Cooperative scheduling helpers

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

/// Yields execution to allow other tasks to run
///
/// Returns `Poll::Pending` once, waking itself, then `Poll::Ready` on the
/// next poll.
pub async fn yield_now() {
    struct YieldNow {
        yielded: bool,
    }

    impl Future for YieldNow {
        type Output = ();

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            if self.yielded {
                Poll::Ready(())
            } else {
                self.yielded = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }

    YieldNow { yielded: false }.await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::task::noop_waker_ref;

    #[test]
    fn test_yield_now_pends_once() {
        let mut cx = Context::from_waker(noop_waker_ref());
        let mut fut = core::pin::pin!(yield_now());

        assert_eq!(fut.as_mut().poll(&mut cx), Poll::Pending);
        assert_eq!(fut.as_mut().poll(&mut cx), Poll::Ready(()));
    }
}
