//! The single-assignment container and its settlement protocol.
use crate::{
    report::{self, UnhandledRejection},
    scheduler::{self, Scheduler},
    thenable::{IntoResolution, Resolution, Thenable},
};
use std::{
    any::Any,
    cell::{Cell, RefCell},
    collections::VecDeque,
    fmt,
    fmt::Debug,
    mem,
    panic::Location,
    rc::Rc,
};

pub(crate) type Observer<V> = Box<dyn FnOnce(V)>;

/// Where a deferred value is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Pending,
    Fulfilled,
    Rejected,
}

enum Slot<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(E),
}

struct Inner<T: 'static, E: 'static> {
    slot: Slot<T, E>,
    on_fulfilled: VecDeque<Observer<T>>,
    on_rejected: VecDeque<Observer<E>>,
    scheduler: Rc<dyn Scheduler>,
    origin: &'static Location<'static>,
}

thread_local! {
    static RELEASED: RefCell<Vec<Box<dyn Any>>> = const { RefCell::new(Vec::new()) };
    static RELEASING: Cell<bool> = const { Cell::new(false) };
}

/// Observer queues of a pending value own the next value in the chain, so
/// freeing them in place recurses once per link. They are parked on a
/// thread-local list instead, and the outermost drop frees that list in a loop.
impl<T: 'static, E: 'static> Drop for Inner<T, E> {
    fn drop(&mut self) {
        if self.on_fulfilled.is_empty() && self.on_rejected.is_empty() {
            return;
        }
        let queues: Box<dyn Any> = Box::new((
            mem::take(&mut self.on_fulfilled),
            mem::take(&mut self.on_rejected),
        ));
        // During thread teardown the list may already be gone; fall back to
        // dropping in place.
        let _ = RELEASED.try_with(move |released| released.borrow_mut().push(queues));

        if RELEASING.with(|releasing| releasing.replace(true)) {
            return;
        }
        while let Some(queues) = RELEASED
            .try_with(|released| released.borrow_mut().pop())
            .ok()
            .flatten()
        {
            drop(queues);
        }
        RELEASING.with(|releasing| releasing.set(false));
    }
}

/// A value that becomes available later, exactly once.
///
/// The handle is cheap to clone; every clone refers to the same instance.
/// Construction runs the setup routine synchronously and hands it the
/// instance's only [`Fulfill`] and [`Reject`] capabilities. Settlement never
/// happens inline: each call to either capability queues a task on the
/// scheduler that was current at construction, and the first of those tasks to
/// run decides the outcome for good.
///
/// # Examples
///
/// ```
/// use deferred::{scheduler, Deferred, State};
///
/// let greeting = Deferred::<String, String>::new(|fulfill, _reject| {
///     fulfill.fulfill("hello".to_owned());
///     Ok(())
/// });
/// assert_eq!(greeting.state(), State::Pending);
///
/// scheduler::run_until_stalled();
/// assert_eq!(greeting.peek(), Some(Ok("hello".to_owned())));
/// ```
pub struct Deferred<T: 'static, E: 'static> {
    inner: Rc<RefCell<Inner<T, E>>>,
}

/// The fulfill capability of one deferred value.
pub struct Fulfill<T: 'static, E: 'static> {
    inner: Rc<RefCell<Inner<T, E>>>,
}

/// The reject capability of one deferred value.
pub struct Reject<T: 'static, E: 'static> {
    inner: Rc<RefCell<Inner<T, E>>>,
}

impl<T: 'static, E: 'static> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static, E: 'static> Clone for Fulfill<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static, E: 'static> Clone for Reject<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static, E: 'static> Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("state", &self.state())
            .field("origin", &self.inner.borrow().origin)
            .finish_non_exhaustive()
    }
}

impl<T: 'static, E: 'static> Debug for Fulfill<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fulfill").finish_non_exhaustive()
    }
}

impl<T: 'static, E: 'static> Debug for Reject<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reject").finish_non_exhaustive()
    }
}

impl<T: 'static, E: 'static> Deferred<T, E> {
    pub fn state(&self) -> State {
        match self.inner.borrow().slot {
            Slot::Pending => State::Pending,
            Slot::Fulfilled(_) => State::Fulfilled,
            Slot::Rejected(_) => State::Rejected,
        }
    }

    pub(crate) fn scheduler(&self) -> Rc<dyn Scheduler> {
        Rc::clone(&self.inner.borrow().scheduler)
    }
}

impl<T, E> Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + Debug + 'static,
{
    /// Build a deferred value on the thread's current scheduler.
    ///
    /// `setup` runs before this returns. An `Err` from it rejects the new value
    /// with that reason instead of escaping to the caller.
    #[track_caller]
    pub fn new<F>(setup: F) -> Self
    where
        F: FnOnce(Fulfill<T, E>, Reject<T, E>) -> Result<(), E>,
    {
        Self::with_scheduler(scheduler::current(), setup)
    }

    /// Like [`Deferred::new`], settling through `scheduler` instead of the
    /// current one. Values chained from this one share the scheduler.
    #[track_caller]
    pub fn with_scheduler<F>(scheduler: Rc<dyn Scheduler>, setup: F) -> Self
    where
        F: FnOnce(Fulfill<T, E>, Reject<T, E>) -> Result<(), E>,
    {
        let inner = Rc::new(RefCell::new(Inner {
            slot: Slot::Pending,
            on_fulfilled: VecDeque::new(),
            on_rejected: VecDeque::new(),
            scheduler,
            origin: Location::caller(),
        }));
        let reject = Reject {
            inner: Rc::clone(&inner),
        };
        let fulfill = Fulfill {
            inner: Rc::clone(&inner),
        };
        if let Err(reason) = setup(fulfill, reject.clone()) {
            tracing::debug!("deferred setup failed, rejecting");
            reject.reject(reason);
        }
        Self { inner }
    }

    /// A clone of the settlement, or `None` while pending.
    pub fn peek(&self) -> Option<Result<T, E>> {
        match &self.inner.borrow().slot {
            Slot::Pending => None,
            Slot::Fulfilled(value) => Some(Ok(value.clone())),
            Slot::Rejected(reason) => Some(Err(reason.clone())),
        }
    }

    /// Queue an observer pair and run whatever the current state already allows.
    pub(crate) fn observe(&self, on_fulfilled: Observer<T>, on_rejected: Observer<E>) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.on_fulfilled.push_back(on_fulfilled);
            inner.on_rejected.push_back(on_rejected);
        }
        drain(&self.inner);
    }
}

impl<T, E> Thenable<T, E> for Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + Debug + 'static,
{
    fn subscribe(&self, on_fulfilled: Box<dyn FnOnce(T)>, on_rejected: Box<dyn FnOnce(E)>) {
        self.observe(on_fulfilled, on_rejected);
    }
}

impl<T, E> IntoResolution<T, E> for Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + Debug + 'static,
{
    fn into_resolution(self) -> Resolution<T, E> {
        Resolution::adopt(self)
    }
}

impl<T, E> Fulfill<T, E>
where
    T: Clone + 'static,
    E: Clone + Debug + 'static,
{
    pub fn fulfill(&self, value: T) {
        request(&self.inner, Resolution::Settled(Ok(value)));
    }

    /// Settle the same way `source` eventually does.
    pub fn adopt(&self, source: impl Thenable<T, E> + 'static) {
        request(&self.inner, Resolution::adopt(source));
    }

    pub(crate) fn resolve(&self, resolution: Resolution<T, E>) {
        request(&self.inner, resolution);
    }
}

impl<T, E> Reject<T, E>
where
    T: Clone + 'static,
    E: Clone + Debug + 'static,
{
    pub fn reject(&self, reason: E) {
        request(&self.inner, Resolution::Settled(Err(reason)));
    }

    /// Settle the same way `source` eventually does, exactly as
    /// [`Fulfill::adopt`] would.
    pub fn adopt(&self, source: impl Thenable<T, E> + 'static) {
        request(&self.inner, Resolution::adopt(source));
    }

    pub(crate) fn resolve(&self, resolution: Resolution<T, E>) {
        request(&self.inner, resolution);
    }
}

fn request<T, E>(inner: &Rc<RefCell<Inner<T, E>>>, resolution: Resolution<T, E>)
where
    T: Clone + 'static,
    E: Clone + Debug + 'static,
{
    let scheduler = Rc::clone(&inner.borrow().scheduler);
    let inner = Rc::clone(inner);
    scheduler.schedule(Box::new(move || settle(&inner, resolution)));
}

fn settle<T, E>(inner: &Rc<RefCell<Inner<T, E>>>, resolution: Resolution<T, E>)
where
    T: Clone + 'static,
    E: Clone + Debug + 'static,
{
    if !matches!(inner.borrow().slot, Slot::Pending) {
        tracing::debug!("deferred value already settled, ignoring request");
        return;
    }

    let outcome = match resolution {
        Resolution::Settled(outcome) => outcome,
        Resolution::Adopt(source) => {
            tracing::debug!("deferred value adopting a thenable");
            let fulfill = Fulfill {
                inner: Rc::clone(inner),
            };
            let reject = Reject {
                inner: Rc::clone(inner),
            };
            source.subscribe(
                Box::new(move |value| fulfill.fulfill(value)),
                Box::new(move |reason| reject.reject(reason)),
            );
            return;
        }
    };

    let unhandled = {
        let mut inner = inner.borrow_mut();
        let unhandled = match &outcome {
            Err(reason) if inner.on_rejected.is_empty() => {
                Some(UnhandledRejection::new(reason, Some(inner.origin)))
            }
            _ => None,
        };
        inner.slot = match outcome {
            Ok(value) => Slot::Fulfilled(value),
            Err(reason) => Slot::Rejected(reason),
        };
        unhandled
    };
    tracing::trace!(unhandled = unhandled.is_some(), "deferred value settled");

    drain(inner);
    if let Some(rejection) = unhandled {
        report::report(rejection);
    }
}

enum Next<T, E> {
    Fulfilled(Observer<T>, T),
    Rejected(Observer<E>, E),
}

/// Run queued observers one at a time, in registration order.
///
/// The borrow is released around each call so observers may register more
/// observers on this same value; those run in this same pass.
fn drain<T: Clone + 'static, E: Clone + 'static>(inner: &Rc<RefCell<Inner<T, E>>>) {
    loop {
        let next = {
            let mut guard = inner.borrow_mut();
            let Inner {
                slot,
                on_fulfilled,
                on_rejected,
                ..
            } = &mut *guard;
            match slot {
                Slot::Pending => return,
                Slot::Fulfilled(value) => {
                    on_rejected.clear();
                    match on_fulfilled.pop_front() {
                        Some(observer) => Next::Fulfilled(observer, value.clone()),
                        None => return,
                    }
                }
                Slot::Rejected(reason) => {
                    on_fulfilled.clear();
                    match on_rejected.pop_front() {
                        Some(observer) => Next::Rejected(observer, reason.clone()),
                        None => return,
                    }
                }
            }
        };
        match next {
            Next::Fulfilled(observer, value) => observer(value),
            Next::Rejected(observer, reason) => observer(reason),
        }
    }
}
