//! Property-based tests
//!
//! Invariants of the rights encoding, path template matching and both OT types.

pub mod json0_proptest;
pub mod path_template_proptest;
pub mod rich_text_proptest;
pub mod rights_proptest;
