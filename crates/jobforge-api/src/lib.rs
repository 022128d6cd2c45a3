pub mod error;
pub mod request_id;
pub mod routes;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
