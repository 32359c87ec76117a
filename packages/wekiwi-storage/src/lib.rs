pub mod dates;
pub mod directus;
pub mod filter;
pub mod models;
pub mod qdrant;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
