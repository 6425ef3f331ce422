// HTTP surface: the populate action plus a health probe

pub mod auth;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use handlers::ApiState;
pub use server::ApiServer;
