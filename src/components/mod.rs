// ============================================================================
// COMPONENTS — editor state machines that know nothing about the network
// ============================================================================
//
//   history.rs — linear undo/redo over committed artifacts
//   mask.rs    — brush and bounding-box mask surface
//   tools.rs   — tool catalogue and recorded parameter maps
// ============================================================================

pub mod history;
pub mod mask;
pub mod tools;

pub use history::{HistoryEntry, HistoryError, HistoryManager, OperationKind, OperationRecord};
pub use mask::{BoundingBox, MaskCanvas};
pub use tools::{ToolId, ToolParams};
