pub mod config;
pub mod env;
pub mod error;

pub use config::SchedConfig;
pub use error::{Result, SchedError};
