pub mod server;
pub mod types;

pub use server::{ApiError, AppState, GatewayServer};
pub use types::{AdminRequest, AdminResponse, ErrorBody, PairQuery, UpdateAffectionRequest};
