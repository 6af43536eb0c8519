//! Domain models for the Halal Certification Platform

mod application;
mod audit;
mod certificate;
mod inspection;
mod store;
mod user;

pub use application::*;
pub use audit::*;
pub use certificate::*;
pub use inspection::*;
pub use store::*;
pub use user::*;
