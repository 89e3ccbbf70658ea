//! `then`, `catch` and `finally`.
//!
//! Every chaining call builds a new deferred value whose setup registers one
//! observer pair on the source. Handlers run when the source's queue drains;
//! whatever they return settles the new value through its own capabilities, so
//! the downstream outcome is always at least one scheduler tick away.
use crate::{
    deferred::Deferred,
    thenable::{IntoResolution, Resolution},
};
use std::{cell::Cell, fmt::Debug, rc::Rc};

impl<T, E> Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + Debug + 'static,
{
    /// Continue with `on_fulfilled`; a rejection passes through untouched.
    ///
    /// # Examples
    ///
    /// ```
    /// use deferred::{scheduler, Deferred, Error};
    ///
    /// let parsed = Deferred::<&str, String>::resolve("12").then(|text| text.parse::<i32>().map_err(|e| e.to_string()));
    /// assert_eq!(scheduler::block_on(parsed), Ok(12));
    ///
    /// let failed = Deferred::<&str, String>::resolve("twelve").then(|text| text.parse::<i32>().map_err(|e| e.to_string()));
    /// assert!(matches!(scheduler::block_on(failed), Err(Error::Rejected(_))));
    /// ```
    #[track_caller]
    pub fn then<U, F, A>(&self, on_fulfilled: F) -> Deferred<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> A + 'static,
        A: IntoResolution<U, E>,
    {
        self.chain(
            move |value| on_fulfilled(value).into_resolution(),
            |reason| Resolution::Settled(Err(reason)),
        )
    }

    /// Continue with whichever handler matches the outcome.
    #[track_caller]
    pub fn then_catch<U, F, A, R, B>(&self, on_fulfilled: F, on_rejected: R) -> Deferred<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> A + 'static,
        A: IntoResolution<U, E>,
        R: FnOnce(E) -> B + 'static,
        B: IntoResolution<U, E>,
    {
        self.chain(
            move |value| on_fulfilled(value).into_resolution(),
            move |reason| on_rejected(reason).into_resolution(),
        )
    }

    /// Recover from a rejection; a fulfilled value passes through untouched.
    #[track_caller]
    pub fn catch<R, B>(&self, on_rejected: R) -> Deferred<T, E>
    where
        R: FnOnce(E) -> B + 'static,
        B: IntoResolution<T, E>,
    {
        self.chain(
            |value| Resolution::Settled(Ok(value)),
            move |reason| on_rejected(reason).into_resolution(),
        )
    }

    /// Run `on_finally` once the source settles either way, keeping the
    /// source's outcome unless `on_finally` itself fails.
    #[track_caller]
    pub fn finally<G>(&self, on_finally: G) -> Deferred<T, E>
    where
        G: FnOnce() -> Result<(), E> + 'static,
    {
        // Only one of the two observers ever runs.
        let on_fulfilled_slot = Rc::new(Cell::new(Some(on_finally)));
        let on_rejected_slot = Rc::clone(&on_fulfilled_slot);
        self.chain(
            move |value| Resolution::Settled(run_once(&on_fulfilled_slot).map(|()| value)),
            move |reason| Resolution::Settled(run_once(&on_rejected_slot).and(Err(reason))),
        )
    }

    #[track_caller]
    fn chain<U>(
        &self,
        on_fulfilled: impl FnOnce(T) -> Resolution<U, E> + 'static,
        on_rejected: impl FnOnce(E) -> Resolution<U, E> + 'static,
    ) -> Deferred<U, E>
    where
        U: Clone + 'static,
    {
        let source = self.clone();
        Deferred::with_scheduler(self.scheduler(), move |fulfill, reject| {
            source.observe(
                Box::new(move |value| fulfill.resolve(on_fulfilled(value))),
                Box::new(move |reason| reject.resolve(on_rejected(reason))),
            );
            Ok(())
        })
    }
}

fn run_once<G, E>(slot: &Cell<Option<G>>) -> Result<(), E>
where
    G: FnOnce() -> Result<(), E>,
{
    slot.take().map_or(Ok(()), |on_finally| on_finally())
}
