pub mod geo;
pub mod text;

// Foundation crate: small, well-tested primitives only.
pub use geo::*;
pub use text::*;
