pub mod error;
pub mod extract;
pub mod logging;
pub mod middleware;
pub mod repositories;
pub mod routes;
pub mod sse;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
