//! Client-side access to an append-only event stream store.
//!
//! Names aggregate and projection streams, encodes events through an
//! explicit type registry, appends batches under optimistic concurrency and
//! reassembles paginated forward reads into complete histories. The storage
//! backend, the publish bus and connection observers plug in through traits;
//! this crate contains no infrastructure code.

pub mod aggregate;
pub mod append;
pub mod backend;
pub mod codec;
pub mod error;
pub mod event;
pub mod naming;
pub mod observer;
pub mod publisher;
pub mod reader;
pub mod store;

pub use backend::{ExpectedVersion, MAX_PAGE_SIZE};
pub use error::StoreError;
pub use store::EventStore;
