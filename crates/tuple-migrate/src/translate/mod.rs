//! Translation engine.
//!
//! For every root curr the [`Translator`] walks the tuple tree depth first:
//!
//! 1. [`query::select_currs`] lists the source values driving a tuple
//! 2. [`insert::insert_tuple`] resolves each match (through
//!    [`query::select_match`] and the [`normalize`] rules) into one INSERT
//! 3. the generated key becomes the frame's `top` and the children run
//!
//! Each root tree is bracketed by a savepoint on the target and committed
//! when it finishes.

pub mod engine;
pub mod frame;
pub mod insert;
pub mod normalize;
pub mod query;
pub mod reference;
pub mod sql;

#[cfg(test)]
pub(crate) mod test_support;

pub use engine::{TranslationOptions, TranslationOutcome, TranslationResult, Translator};
pub use insert::TupleOutcome;
