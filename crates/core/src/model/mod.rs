pub mod analytics;
pub mod counter;
pub mod exception;
pub mod service;
pub mod span;
