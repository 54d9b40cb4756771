pub mod config;
pub mod errors;
pub mod feedback;
pub mod logging;
