//! HTTP transport using axum.

mod routes;
mod server;

pub use routes::routes;
pub use server::serve;
