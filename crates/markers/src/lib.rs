//! User map markers: an in-memory collection mirrored as a JSON snapshot
//! into durable key-value storage.

pub mod config;
pub mod error;
pub mod model;
pub mod snapshot;
pub mod store;
pub mod surface;

pub use config::*;
pub use error::*;
pub use model::*;
pub use store::*;
pub use surface::*;
