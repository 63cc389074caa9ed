//! Ofistur Common Types
//!
//! Shared types for the credit-account ledger: identifiers, currency and
//! amount parsing, the caller's auth context, pagination and errors.

pub mod identifiers;
pub mod monetary;
pub mod auth;
pub mod pagination;
pub mod error;

pub use identifiers::*;
pub use monetary::*;
pub use auth::*;
pub use pagination::*;
pub use error::*;
