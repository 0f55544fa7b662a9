pub mod router;
pub mod types;
pub mod handlers {
    pub mod auth;
    pub mod bindings;
    pub mod catalog;
    pub mod common;
    pub mod health;
    pub mod instances;
}

pub use router::{create_router, ApiDoc};
pub use types::AppState;
