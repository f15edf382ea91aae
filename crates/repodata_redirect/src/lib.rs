//! The Redirect Frontend: serves the published Link Table as a thin HTTP
//! redirect surface, with a signed webhook to trigger reloads.

pub mod routes;
pub mod state;
pub mod webhook;

pub use routes::router;
pub use state::AppState;
