//! The deferral point every settlement step goes through.
//!
//! A [`Scheduler`] runs each task after the code that is executing right now has
//! returned, strictly in the order the tasks were handed over. Deferred values
//! never run an observer inline from `fulfill`/`reject`; they hand a task to the
//! scheduler that was current when they were constructed.
//!
//! The stock scheduler is [`EventLoop`], a thin adapter over
//! [`futures::executor::LocalPool`]. Every thread lazily owns one default loop,
//! which is what [`current`] returns unless another scheduler was installed
//! with [`set_current`].
use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;
use std::{
    cell::RefCell,
    fmt,
    future::IntoFuture,
    rc::Rc,
};

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

/// FIFO deferral of work until the current synchronous execution completes.
pub trait Scheduler {
    /// Queue `task` behind everything scheduled before it.
    fn schedule(&self, task: Task);
}

impl Scheduler for LocalSpawner {
    fn schedule(&self, task: Task) {
        tracing::trace!("scheduling deferred task");
        if let Err(err) = self.spawn_local(async move { task() }) {
            tracing::warn!("dropping deferred task, its event loop has shut down: {err}");
        }
    }
}

/// Single-threaded event loop backed by a `futures` local pool.
///
/// # Examples
///
/// ```
/// use deferred::{scheduler::EventLoop, Deferred};
///
/// let event_loop = EventLoop::new();
/// let answer = Deferred::<i32, String>::with_scheduler(event_loop.scheduler(), |fulfill, _| {
///     fulfill.fulfill(42);
///     Ok(())
/// });
/// assert_eq!(event_loop.block_on(answer), Ok(42));
/// ```
pub struct EventLoop {
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
}

impl EventLoop {
    pub fn new() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            pool: RefCell::new(pool),
            spawner,
        }
    }

    /// A handle that schedules onto this loop.
    pub fn scheduler(&self) -> Rc<dyn Scheduler> {
        Rc::new(self.spawner.clone())
    }

    /// Run queued tasks, including the ones they queue in turn, until none is left.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a task running on this same loop, and
    /// propagates any panic raised by a task (e.g. the default unobserved
    /// rejection reporter).
    pub fn run_until_stalled(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }

    /// Drive the loop until `future` completes.
    ///
    /// Blocks the thread forever if `future` waits on a deferred value that
    /// never settles.
    pub fn block_on<F: IntoFuture>(&self, future: F) -> F::Output {
        self.pool.borrow_mut().run_until(future.into_future())
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop").finish_non_exhaustive()
    }
}

thread_local! {
    static EVENT_LOOP: EventLoop = EventLoop::new();
    static CURRENT: RefCell<Option<Rc<dyn Scheduler>>> = const { RefCell::new(None) };
}

/// The scheduler new deferred values on this thread will use.
pub fn current() -> Rc<dyn Scheduler> {
    CURRENT
        .with(|current| current.borrow().clone())
        .unwrap_or_else(|| EVENT_LOOP.with(EventLoop::scheduler))
}

/// Install `scheduler` as this thread's current scheduler, returning the one it
/// replaces (`None` if the default loop was in use).
pub fn set_current(scheduler: Rc<dyn Scheduler>) -> Option<Rc<dyn Scheduler>> {
    CURRENT.with(|current| current.replace(Some(scheduler)))
}

/// Go back to the thread's default event loop.
pub fn reset_current() -> Option<Rc<dyn Scheduler>> {
    CURRENT.with(|current| current.take())
}

/// [`EventLoop::run_until_stalled`] on the thread's default loop.
pub fn run_until_stalled() {
    EVENT_LOOP.with(EventLoop::run_until_stalled);
}

/// [`EventLoop::block_on`] on the thread's default loop.
pub fn block_on<F: IntoFuture>(future: F) -> F::Output {
    EVENT_LOOP.with(|event_loop| event_loop.block_on(future))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Task) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let task_log = Rc::clone(&log);
        let make = move |name: &'static str| -> Task {
            let log = Rc::clone(&task_log);
            Box::new(move || log.borrow_mut().push(name))
        };
        (log, make)
    }

    #[test]
    fn tasks_run_in_fifo_order() {
        let event_loop = EventLoop::new();
        let scheduler = event_loop.scheduler();
        let (log, task) = recorder();
        scheduler.schedule(task("first"));
        scheduler.schedule(task("second"));
        scheduler.schedule(task("third"));
        assert!(log.borrow().is_empty());

        event_loop.run_until_stalled();
        assert_eq!(*log.borrow(), ["first", "second", "third"]);
    }

    #[test]
    fn tasks_scheduled_by_tasks_queue_behind_existing_ones() {
        let event_loop = EventLoop::new();
        let scheduler = event_loop.scheduler();
        let (log, task) = recorder();

        let nested = task("nested");
        let inner_scheduler = Rc::clone(&scheduler);
        let outer_log = Rc::clone(&log);
        scheduler.schedule(Box::new(move || {
            outer_log.borrow_mut().push("outer");
            inner_scheduler.schedule(nested);
        }));
        scheduler.schedule(task("sibling"));

        event_loop.run_until_stalled();
        assert_eq!(*log.borrow(), ["outer", "sibling", "nested"]);
    }

    #[test]
    fn run_until_stalled_on_empty_loop_returns() {
        let event_loop = EventLoop::default();
        event_loop.run_until_stalled();
        run_until_stalled();
    }

    #[test]
    fn block_on_drives_scheduled_tasks() {
        let event_loop = EventLoop::new();
        let (sender, receiver) = futures::channel::oneshot::channel();
        event_loop.scheduler().schedule(Box::new(move || {
            let _ = sender.send(7);
        }));
        assert_eq!(event_loop.block_on(receiver), Ok(7));
    }

    struct Manual(RefCell<VecDeque<Task>>);

    impl Scheduler for Manual {
        fn schedule(&self, task: Task) {
            self.0.borrow_mut().push_back(task);
        }
    }

    #[test]
    fn current_can_be_replaced_and_reset() {
        let manual = Rc::new(Manual(RefCell::new(VecDeque::new())));
        assert!(set_current(manual.clone()).is_none());

        let (log, task) = recorder();
        current().schedule(task("manual"));
        assert_eq!(manual.0.borrow().len(), 1);

        assert!(reset_current().is_some());
        current().schedule(task("default"));
        run_until_stalled();
        assert_eq!(*log.borrow(), ["default"]);

        let queued = manual.0.borrow_mut().pop_front();
        if let Some(queued) = queued {
            queued();
        }
        assert_eq!(*log.borrow(), ["default", "manual"]);
    }
}
