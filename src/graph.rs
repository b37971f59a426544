pub mod discovery;
mod state;
mod types;

// Re-export public types
pub use state::DeviceGraph;
pub use types::*;

pub use discovery::apply_event;
