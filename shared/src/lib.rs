//! Shared domain types for the Halal Certification Platform
//!
//! Value objects, lifecycle state tables and validation rules used by the
//! backend services. Nothing in this crate performs I/O.

pub mod error;
pub mod models;
pub mod types;
pub mod validation;

pub use error::*;
pub use models::*;
pub use types::*;
pub use validation::*;
