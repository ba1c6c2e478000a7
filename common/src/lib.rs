//! fxledger Common Types
//!
//! Shared types used across the fxledger workspace: identifiers, currency and
//! amount handling, the conversion job state machine and the error taxonomy.

pub mod identifiers;
pub mod monetary;
pub mod job;
pub mod error;

pub use identifiers::*;
pub use monetary::*;
pub use job::*;
pub use error::*;
