//! Core abstractions shared by the translator and the database drivers.
//!
//! - [`value`]: scalar values returned by queries
//! - [`traits`]: the [`Dao`] interface consumed by the translator

pub mod traits;
pub mod value;

pub use traits::Dao;
pub use value::{Row, SqlValue};
