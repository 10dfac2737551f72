pub mod auth;
mod catalog_routes;
pub mod config;
pub mod error;
mod http_layers;
pub mod metrics;
pub mod server;
pub mod state;
mod sync_routes;

pub use config::ServerConfig;
pub use http_layers::*;
pub use server::{make_app, run_server};
pub use state::ServerState;
