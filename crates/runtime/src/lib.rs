pub mod event_bus;
pub mod write_queue;

pub use event_bus::*;
pub use write_queue::*;
