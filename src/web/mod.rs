//! Config Mode web server

mod handlers;
pub mod server;
mod static_files;
mod types;

pub use handlers::AppState;
pub use server::{router, start_server};
pub use types::{human_size, ApiResponse};
