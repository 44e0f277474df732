pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod repository;
pub mod response;
pub mod rooms;
pub mod routes;
pub mod seed;
pub mod state;
pub mod utils;

pub use routes::build_router;
