// Session engine for ttyrelay
//
// A session pairs a backend (which owns an inferior: a PTY child, a piped
// child or an in-process entry point) with a flow-controlled output sink. The
// registry hands out session IDs and routes renderer input to the right
// backend; transports sit on top of the registry.

pub mod backend;
mod factory;
pub mod inferior;
mod link;
mod logger;
mod registry;
mod relay;
mod session;
pub mod sink;

use std::sync::{Mutex, MutexGuard, PoisonError};

// Re-export public API
pub use backend::{Backend, BackendError, BackendOptions};
pub use factory::BackendFactory;
pub use inferior::{
    EntryPoint, InferiorError, InferiorKind, InferiorSpec, InvocationContext, InvocationTable,
};
pub use link::{checked_link, LinkOpener, LogLinkOpener, INVALID_LINK};
pub use logger::TranscriptLogger;
pub use registry::{RegistryConfig, RegistryError, SessionRegistry};
pub use session::{Session, SessionId, SessionInfo};
pub use sink::{Delivery, OutputSink, SinkConfig, SinkError};

// Constants
pub const MAX_CONCURRENT_SESSIONS: usize = 64;

/// Lock a mutex, taking over the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
