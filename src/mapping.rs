pub mod gain;
mod model;
pub mod records;
pub mod search;
mod types;

// Re-export public types
pub use model::MappingModel;
pub use records::{BusRecord, ChannelRecord, FullRecord, DEFAULT_TARGET_NAME};
pub use search::Direction;
pub use types::*;
