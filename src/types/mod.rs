mod models;
pub mod version;

pub use models::*;
