pub mod auth;
pub mod middleware;
pub mod persistence_task;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

// Re-export the main WebSocket handler to make it easily accessible
// to the binary that will build the web server router.
pub use middleware::{identify, require_auth};
pub use rest::{get_document_handler, list_competencies_handler, suggest_handler};
pub use ws_handler::ws_handler;
