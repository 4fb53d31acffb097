//! Run history and its exports.

pub mod history;
pub mod json;
