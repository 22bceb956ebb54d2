pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod state;

pub use error::*;
pub use models::*;
pub use router::identifier_routes;
pub use services::*;
pub use state::IdentifierCellState;
