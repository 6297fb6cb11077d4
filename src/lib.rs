pub mod actions;
pub mod case;
pub mod client;
pub mod config;
pub mod error;
pub mod log;
pub mod store;
pub mod util;
pub mod variables;

// Decoupled game loop architecture
pub mod actors;
pub mod app;
pub mod render;
pub mod tea;
pub mod ui;

pub use case::{Case, CaseId, CaseStatus, TaskStatus};
pub use error::{Error, Result};
