pub mod handlers;
pub mod routes;

pub use routes::health_routes;
