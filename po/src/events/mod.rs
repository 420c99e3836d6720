//! Run event stream
//!
//! Every run owns a bounded broadcast bus. The orchestrator emits one event
//! per inference transition plus run-level outcomes; consumers (the WS
//! surface, the persisted log) subscribe. Emission is fire-and-forget: with
//! no subscribers events are dropped, and a lagging subscriber loses the
//! oldest events rather than stalling the run.

mod bus;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventEmitter, create_event_bus};
pub use types::RunEvent;
