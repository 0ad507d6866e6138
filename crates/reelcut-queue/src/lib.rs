//! Job store and intake queue.
//!
//! [`JobStore`] is the single source of truth for job state. Every write to a
//! record happens under that record's lock and is published to subscribers.
//! [`IntakeQueue`] is the FIFO the worker slots consume.

pub mod error;
pub mod intake;
pub mod snapshot;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use intake::IntakeQueue;
pub use snapshot::StoreSnapshot;
pub use store::JobStore;
