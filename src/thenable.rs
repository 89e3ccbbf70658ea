//! Values that settle later, and how a settlement request is expressed.
use std::fmt;

/// Anything that can report its eventual outcome to a pair of observers.
///
/// Exactly one of the two callbacks is expected to be called, at most once.
/// [`Deferred`](crate::Deferred) implements this, and a deferred value
/// settled with another thenable adopts that thenable's outcome as its own.
pub trait Thenable<T, E> {
    fn subscribe(&self, on_fulfilled: Box<dyn FnOnce(T)>, on_rejected: Box<dyn FnOnce(E)>);
}

/// What a fulfill or reject request carries: a final outcome, or a thenable
/// whose outcome should be adopted.
pub enum Resolution<T, E> {
    Settled(Result<T, E>),
    Adopt(Box<dyn Thenable<T, E>>),
}

impl<T, E> Resolution<T, E> {
    pub fn adopt(source: impl Thenable<T, E> + 'static) -> Self {
        Self::Adopt(Box::new(source))
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for Resolution<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Settled(outcome) => f.debug_tuple("Settled").field(outcome).finish(),
            Self::Adopt(_) => f.write_str("Adopt(..)"),
        }
    }
}

/// Return types accepted from `then`/`catch` handlers.
///
/// `Ok` fulfills the downstream value, `Err` rejects it, and a deferred value
/// is adopted.
pub trait IntoResolution<T, E> {
    fn into_resolution(self) -> Resolution<T, E>;
}

impl<T, E> IntoResolution<T, E> for Resolution<T, E> {
    fn into_resolution(self) -> Resolution<T, E> {
        self
    }
}

impl<T, E> IntoResolution<T, E> for Result<T, E> {
    fn into_resolution(self) -> Resolution<T, E> {
        Resolution::Settled(self)
    }
}
