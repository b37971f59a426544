mod driver;
pub mod mock;
pub mod null;

// Re-export public types
pub use driver::{AudioBackend, PendingSink, SinkRequest};
pub use mock::{MockBackend, MockCall, MockControl};
pub use null::NullBackend;

/// Backend named in the settings, if known.
pub fn by_name(name: &str, period_frames: u32) -> Option<Box<dyn AudioBackend>> {
    match name {
        "null" => Some(Box::new(NullBackend::new(period_frames))),
        _ => None,
    }
}
