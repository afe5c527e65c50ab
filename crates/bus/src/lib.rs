//! Dispatch bus abstraction and in-process implementation.
//!
//! - [`DispatchBus`]: the publish/subscribe seam the dispatcher talks to.
//!   Real transports (Pub/Sub, queues, HTTP callbacks) implement it
//!   outside this workspace.
//! - [`Subscription`]: a cancellable handle scoped to one dispatch call.
//! - [`InMemoryBus`]: `tokio::sync::broadcast` backed bus used by the
//!   loopback binary and by tests.

pub mod bus;
pub mod memory;

pub use bus::{BusError, DispatchBus, ResultHandler, Subscription};
pub use memory::InMemoryBus;
