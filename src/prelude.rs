//! Convenient re-exports for common usage.
//!
//! ```
//! use ot_kit::prelude::*;
//! ```

pub use crate::transform;
pub use crate::Conflict;
pub use crate::Coordinator;
pub use crate::Document;
pub use crate::Edit;
pub use crate::Operation;
pub use crate::SyncEvents;
pub use crate::SyncState;
