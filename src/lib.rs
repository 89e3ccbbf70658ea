//! Single-threaded deferred values with promise-style chaining.
//!
//! A [`Deferred`] is a single-assignment container whose value arrives later.
//! Observers registered with [`then`](Deferred::then),
//! [`catch`](Deferred::catch) and [`finally`](Deferred::finally) run once, in
//! registration order, after the value settles. Settlement is always deferred
//! through a [`Scheduler`](scheduler::Scheduler), so chained values advance one
//! scheduler tick at a time in a reproducible order.
//!
//! ```
//! use deferred::{scheduler, Deferred, Error};
//!
//! let doubled = Deferred::<i32, String>::resolve(21).then(|value| Ok(value * 2));
//! assert_eq!(scheduler::block_on(doubled), Ok(42));
//!
//! let recovered = Deferred::<i32, String>::reject("💥".to_owned())
//!     .then(|value| Ok(value + 1))
//!     .catch(|reason| Ok(reason.len() as i32));
//! assert_eq!(scheduler::block_on(recovered), Ok(4));
//!
//! let failed = Deferred::<i32, String>::reject("💥".to_owned());
//! assert_eq!(scheduler::block_on(failed), Err(Error::Rejected("💥".to_owned())));
//! ```
//!
//! A rejection that settles while nothing observes it is handed to the
//! thread's [`Reporter`](report::Reporter), which panics by default.
mod chain;
mod combinators;
mod deferred;
mod future;
pub mod report;
pub mod scheduler;
mod thenable;

pub use combinators::{Settled, Status};
pub use deferred::{Deferred, Fulfill, Reject, State};
pub use future::Settlement;
pub use report::UnhandledRejection;
pub use thenable::{IntoResolution, Resolution, Thenable};

/// Why awaiting a deferred value produced no value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error<E> {
    #[error("deferred value rejected: {0:?}")]
    Rejected(E),
    #[error("deferred value dropped before it settled")]
    Dropped,
}
