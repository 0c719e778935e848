pub mod auth;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod rate_limit;
pub mod utils;

pub use auth::{AuthContext, Claims, IssuedToken, TokenError, TokenService};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use gateway::{GatewayState, build_router, build_router_with};
