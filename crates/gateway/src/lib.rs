pub mod config;
pub mod errors;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::GatewayConfig;
pub use errors::ApiError;
pub use routes::{build_router, run_server};
pub use state::AppState;
