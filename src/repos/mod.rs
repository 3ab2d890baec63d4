pub mod consumer_repo;
pub mod error;
pub mod jwt_secret_repo;
pub mod memory_store;
pub mod store;

pub use error::RepoError;
pub use memory_store::MemoryAuthStore;
pub use store::{AuthStore, PgAuthStore};
