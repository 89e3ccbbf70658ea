//! Building deferred values out of plain values and out of other deferred
//! values. Everything here goes through [`Deferred::new`] and
//! [`Deferred::then_catch`] only.
use crate::{deferred::Deferred, thenable::Thenable};
use std::{
    cell::{Cell, RefCell},
    fmt::Debug,
    rc::Rc,
};

/// The outcome of one input of [`Deferred::all_settled`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled<T, E> {
    Fulfilled { value: T },
    Rejected { reason: E },
}

/// Which way an input of [`Deferred::all_settled`] went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Fulfilled,
    Rejected,
}

impl<T, E> Settled<T, E> {
    pub fn status(&self) -> Status {
        match self {
            Self::Fulfilled { .. } => Status::Fulfilled,
            Self::Rejected { .. } => Status::Rejected,
        }
    }
}

impl<T, E> From<Result<T, E>> for Settled<T, E> {
    fn from(outcome: Result<T, E>) -> Self {
        match outcome {
            Ok(value) => Self::Fulfilled { value },
            Err(reason) => Self::Rejected { reason },
        }
    }
}

impl<T, E> Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + Debug + 'static,
{
    #[track_caller]
    pub fn resolve(value: T) -> Self {
        Self::new(move |fulfill, _| {
            fulfill.fulfill(value);
            Ok(())
        })
    }

    /// A deferred value that ends up however `source` does.
    #[track_caller]
    pub fn adopt(source: impl Thenable<T, E> + 'static) -> Self {
        Self::new(move |fulfill, _| {
            fulfill.adopt(source);
            Ok(())
        })
    }

    #[track_caller]
    pub fn reject(reason: E) -> Self {
        Self::new(move |_, reject| {
            reject.reject(reason);
            Ok(())
        })
    }

    /// Fulfills with every input's value, in input order, once all of them
    /// have fulfilled. The first rejection rejects the aggregate with that
    /// reason unchanged.
    ///
    /// An empty input fulfills with an empty vector.
    ///
    /// # Examples
    ///
    /// ```
    /// use deferred::{scheduler, Deferred, Error};
    ///
    /// let all = Deferred::<i32, &str>::all([Deferred::resolve(1), Deferred::resolve(2)]);
    /// assert_eq!(scheduler::block_on(all), Ok(vec![1, 2]));
    ///
    /// let all = Deferred::all([Deferred::resolve(1), Deferred::reject("x")]);
    /// assert_eq!(scheduler::block_on(all), Err(Error::Rejected("x")));
    /// ```
    #[track_caller]
    pub fn all<I>(deferreds: I) -> Deferred<Vec<T>, E>
    where
        I: IntoIterator<Item = Deferred<T, E>>,
    {
        let deferreds: Vec<_> = deferreds.into_iter().collect();
        Deferred::new(move |fulfill, reject| {
            let total = deferreds.len();
            if total == 0 {
                fulfill.fulfill(Vec::new());
                return Ok(());
            }

            let values = Rc::new(RefCell::new(vec![None; total]));
            let completed = Rc::new(Cell::new(0));
            for (index, deferred) in deferreds.into_iter().enumerate() {
                let values = Rc::clone(&values);
                let completed = Rc::clone(&completed);
                let fulfill = fulfill.clone();
                let reject = reject.clone();
                deferred.then_catch(
                    move |value| {
                        values.borrow_mut()[index] = Some(value);
                        completed.set(completed.get() + 1);
                        if completed.get() == total {
                            let values = values.borrow_mut().drain(..).flatten().collect();
                            fulfill.fulfill(values);
                        }
                        Ok(())
                    },
                    move |reason| {
                        reject.reject(reason);
                        Ok(())
                    },
                );
            }
            Ok(())
        })
    }

    /// Fulfills with every input's outcome, in input order, once all of them
    /// have settled. Never rejects.
    ///
    /// Each input is observed with a single `then_catch`, so the aggregate
    /// settles on the scheduler tick right after its last input settles.
    #[track_caller]
    pub fn all_settled<I>(deferreds: I) -> Deferred<Vec<Settled<T, E>>, E>
    where
        I: IntoIterator<Item = Deferred<T, E>>,
    {
        let deferreds: Vec<_> = deferreds.into_iter().collect();
        Deferred::new(move |fulfill, _| {
            let total = deferreds.len();
            if total == 0 {
                fulfill.fulfill(Vec::new());
                return Ok(());
            }

            let outcomes = Rc::new(RefCell::new(vec![None; total]));
            let completed = Rc::new(Cell::new(0));
            let record = Rc::new(move |index: usize, outcome: Settled<T, E>| {
                outcomes.borrow_mut()[index] = Some(outcome);
                completed.set(completed.get() + 1);
                if completed.get() == total {
                    let outcomes = outcomes.borrow_mut().drain(..).flatten().collect();
                    fulfill.fulfill(outcomes);
                }
            });
            for (index, deferred) in deferreds.into_iter().enumerate() {
                let on_fulfilled = Rc::clone(&record);
                let on_rejected = Rc::clone(&record);
                deferred.then_catch(
                    move |value| {
                        on_fulfilled(index, Settled::Fulfilled { value });
                        Ok(())
                    },
                    move |reason| {
                        on_rejected(index, Settled::Rejected { reason });
                        Ok(())
                    },
                );
            }
            Ok(())
        })
    }

    /// Settles like whichever input settles first. An empty input never
    /// settles.
    #[track_caller]
    pub fn race<I>(deferreds: I) -> Deferred<T, E>
    where
        I: IntoIterator<Item = Deferred<T, E>>,
    {
        let deferreds: Vec<_> = deferreds.into_iter().collect();
        Deferred::new(move |fulfill, reject| {
            for deferred in deferreds {
                let fulfill = fulfill.clone();
                let reject = reject.clone();
                deferred.then_catch(
                    move |value| {
                        fulfill.fulfill(value);
                        Ok(())
                    },
                    move |reason| {
                        reject.reject(reason);
                        Ok(())
                    },
                );
            }
            Ok(())
        })
    }
}
