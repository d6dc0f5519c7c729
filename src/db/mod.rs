pub mod core;
pub mod export;
pub mod migrate;
pub mod news;
pub mod schema;

pub use core::{Backend, PgConfig, Store};
