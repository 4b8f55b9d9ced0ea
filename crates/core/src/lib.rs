pub mod basket;
pub mod config;
pub mod error;
pub mod types;

pub use basket::BasketMatrix;
pub use config::AppConfig;
pub use error::{CoborrowError, CoborrowResult, Phase};
