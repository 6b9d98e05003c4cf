pub mod batches;
pub mod documents;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod ws;

pub use routes::create_router;
