//! Confab Bridge library target.
//!
//! The binary entry point is in `main.rs`; the modules live here so
//! `tests/` can reach them.

pub mod replay;
pub mod terminal;
pub mod transcript;
pub mod util;
