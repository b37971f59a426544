mod mixer;
mod selection;

// Re-export public types
pub use mixer::MixerEditor;
pub use selection::{EditorAction, Group, Selection, SelectionKind};
