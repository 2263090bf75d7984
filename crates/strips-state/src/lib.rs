//! # STRIPStream State
//!
//! Monotonic universe of objects and static facts, plus the bookkeeping
//! that makes stream evaluation resumable across planner levels.

pub mod cursor;
pub mod snapshot;
pub mod store;

pub use cursor::{CursorArena, CursorSummary, GeneratorCursor, InstanceKey, Pull, TestMemo};
pub use snapshot::{LevelSummary, UniverseSnapshot};
pub use store::{FactEntry, FactSource, ObjectEntry, Universe};
