pub mod allocator;
pub mod bulk_loader;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod mobile;
pub mod models;
pub mod rate_limit;
pub mod response;
pub mod server;
pub mod storage;

pub use config::Config;
pub use error::{CouponError, Result};
pub use response::ApiResponse;
pub use server::{create_app, Server};
