//! Awaiting a deferred value from async code.
use crate::{deferred::Deferred, Error};
use futures::{channel::oneshot, FutureExt};
use std::{
    cell::Cell,
    fmt::Debug,
    future::{Future, IntoFuture},
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
};

/// Future returned by awaiting a [`Deferred`].
///
/// Awaiting counts as observing: a rejection delivered here is not reported as
/// unobserved.
#[derive(Debug)]
pub struct Settlement<T, E> {
    receiver: oneshot::Receiver<Result<T, E>>,
}

impl<T, E> Future for Settlement<T, E> {
    type Output = Result<T, Error<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.receiver.poll_unpin(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome.map_err(Error::Rejected)),
            // Every handle and capability went away while still pending.
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(Error::Dropped)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T, E> IntoFuture for Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + Debug + 'static,
{
    type Output = Result<T, Error<E>>;
    type IntoFuture = Settlement<T, E>;

    fn into_future(self) -> Settlement<T, E> {
        let (sender, receiver) = oneshot::channel();
        let on_fulfilled = Rc::new(Cell::new(Some(sender)));
        let on_rejected = Rc::clone(&on_fulfilled);
        self.observe(
            Box::new(move |value| send(&on_fulfilled, Ok(value))),
            Box::new(move |reason| send(&on_rejected, Err(reason))),
        );
        Settlement { receiver }
    }
}

fn send<T, E>(slot: &Cell<Option<oneshot::Sender<Result<T, E>>>>, outcome: Result<T, E>) {
    if let Some(sender) = slot.take() {
        // Nobody is waiting any more; that is fine.
        let _ = sender.send(outcome);
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        report::{set_reporter, UnhandledRejection},
        scheduler::{block_on, run_until_stalled},
        Deferred, Error,
    };
    use futures::FutureExt;
    use std::{cell::Cell, future::IntoFuture, rc::Rc};

    #[test]
    fn awaits_fulfilled_value() {
        let deferred = Deferred::<String, String>::resolve("🍓".to_owned());
        assert_eq!(block_on(deferred), Ok("🍓".to_owned()));
    }

    #[test]
    fn awaiting_observes_rejection() {
        let reports = Rc::new(Cell::new(0));
        let sink = Rc::clone(&reports);
        set_reporter(Rc::new(move |_: UnhandledRejection| sink.set(sink.get() + 1)));

        let deferred = Deferred::<i32, &str>::reject("💥");
        assert_eq!(block_on(deferred), Err(Error::Rejected("💥")));
        assert_eq!(reports.get(), 0);
    }

    #[test]
    fn abandoned_value_reports_dropped() {
        let abandoned = Deferred::<i32, String>::new(|_, _| Ok(()));
        assert_eq!(abandoned.into_future().now_or_never(), Some(Err(Error::Dropped)));
    }

    #[test]
    fn stays_pending_until_settled() {
        let kept = Rc::new(Cell::new(None));
        let slot = Rc::clone(&kept);
        let deferred = Deferred::<i32, String>::new(move |fulfill, _| {
            slot.set(Some(fulfill));
            Ok(())
        });
        let mut settlement = deferred.into_future();
        run_until_stalled();
        assert_eq!((&mut settlement).now_or_never(), None);

        if let Some(fulfill) = kept.take() {
            fulfill.fulfill(3);
        }
        run_until_stalled();
        assert_eq!(settlement.now_or_never(), Some(Ok(3)));
    }

    #[test]
    fn async_blocks_can_await() {
        let sum = block_on(async {
            let a = Deferred::<i32, String>::resolve(1).await?;
            let b = Deferred::<i32, String>::resolve(2).await?;
            Ok::<_, Error<String>>(a + b)
        });
        assert_eq!(sum, Ok(3));
    }
}
