pub mod config;
pub mod controller;
pub mod error;
pub mod group;
pub mod io;
pub mod orchestrator;
pub mod provider;
pub mod runtime;
pub mod scheduler;
pub mod types;

pub use error::{Result, ToggleError};
