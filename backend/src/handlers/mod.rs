//! HTTP handlers

pub mod applications;
pub mod audit;
pub mod auth;
pub mod certificates;
pub mod documents;
pub mod health;
pub mod inspections;
pub mod users;

pub use health::health_check;
