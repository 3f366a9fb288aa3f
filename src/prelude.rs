//! Convenient imports for tl2stm.
//!
//! ```
//! use tl2stm::prelude::*;
//!
//! let region = Region::create(8, 8)?;
//! let tx = region.begin(true)?;
//! assert!(region.end(tx));
//! # Ok::<(), Error>(())
//! ```

// Main entry points
pub use crate::retry::{atomically, RetryPolicy};
pub use tl2_engine::{Region, RegionBuilder, Transaction};

// Error handling
pub use tl2_core::{AbortReason, Error, Result};

// Core types
pub use tl2_core::{Address, LockOrder, TxKind, Version};
