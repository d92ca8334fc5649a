// Web server modules for Sigil Chat

pub mod config;
pub mod logger;
pub mod request_parsing;
pub mod response_helpers;
pub mod routes;
pub mod server;
pub mod state;

pub use config::AppConfig;
pub use server::{handle_request, serve};
pub use state::AppState;
