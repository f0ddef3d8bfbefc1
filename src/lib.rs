pub mod clock;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod secrets;
pub mod web;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use secrets::SecretService;
