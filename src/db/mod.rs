pub mod models;
pub mod queries;

pub use models::{Link, LinkedSecret, NewSecret, PreparedSecret, Secret};
#[cfg(test)]
pub use queries::setup_test_db;
pub use queries::{init_db, DbPool, LinkRepo, SecretRepo};
