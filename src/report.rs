//! Escalation of rejections nobody was listening for.
//!
//! A deferred value that settles to rejected while its failure queue is empty
//! hands an [`UnhandledRejection`] to the thread's current [`Reporter`]. The
//! default reporter treats it as fatal and panics out of whatever is driving
//! the scheduler.
use std::{cell::RefCell, fmt::Debug, panic::Location, rc::Rc};

/// A rejection that settled with no failure observer attached.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("uncaught (in deferred) {reason}{}", at(.origin))]
pub struct UnhandledRejection {
    reason: String,
    origin: Option<&'static Location<'static>>,
}

fn at(origin: &Option<&'static Location<'static>>) -> String {
    origin.map(|location| format!(" at {location}")).unwrap_or_default()
}

impl UnhandledRejection {
    pub fn new<E: Debug + ?Sized>(reason: &E, origin: Option<&'static Location<'static>>) -> Self {
        Self {
            reason: format!("{reason:?}"),
            origin,
        }
    }

    /// The `Debug` rendering of the original reason.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Where the rejected deferred value was constructed.
    pub fn origin(&self) -> Option<&'static Location<'static>> {
        self.origin
    }
}

pub trait Reporter {
    fn report(&self, rejection: UnhandledRejection);
}

impl<F: Fn(UnhandledRejection)> Reporter for F {
    fn report(&self, rejection: UnhandledRejection) {
        self(rejection)
    }
}

/// Logs the rejection and panics with it. Installed by default.
#[derive(Debug, Default, Clone, Copy)]
pub struct PanicReporter;

impl Reporter for PanicReporter {
    fn report(&self, rejection: UnhandledRejection) {
        tracing::error!("{rejection}");
        panic!("{rejection}");
    }
}

/// Logs the rejection and carries on.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, rejection: UnhandledRejection) {
        tracing::error!("{rejection}");
    }
}

thread_local! {
    static REPORTER: RefCell<Rc<dyn Reporter>> = RefCell::new(Rc::new(PanicReporter));
}

/// Install `reporter` for this thread, returning the previous one.
pub fn set_reporter(reporter: Rc<dyn Reporter>) -> Rc<dyn Reporter> {
    REPORTER.with(|current| current.replace(reporter))
}

pub(crate) fn report(rejection: UnhandledRejection) {
    let reporter = REPORTER.with(|current| Rc::clone(&current.borrow()));
    reporter.report(rejection);
}
