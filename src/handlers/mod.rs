pub mod analyze;
pub mod config;

pub use analyze::*;
pub use config::*;
