pub mod config;
pub mod routes;

pub use config::ServerConfig;
pub use routes::{AppState, router};
