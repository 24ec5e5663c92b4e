pub mod controller;
pub mod cookie;
pub mod crud;
pub mod extractor;
pub mod interface;
pub mod memory;
pub mod model;
pub mod routes;
pub mod schema;
pub mod service;

pub use crud::MySqlAccountStore;
pub use interface::{AccountRepository, AuthError};
pub use memory::InMemoryAccountStore;
pub use routes::account_routes;
pub use service::AccountService;
