mod buffer;
mod feed;
pub mod peak;
mod router;

// Re-export public types
pub use buffer::{MAX_QUEUED_CHUNKS, PlaybackBuffer, RESYNC_SKIP_FRAMES, RESYNC_THRESHOLD};
pub use feed::RouteFeed;
pub use peak::{PeakMeter, PeakSummary};
pub use router::{RouteInfo, RouteState, Router, RouterConfig};
