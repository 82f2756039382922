//! Pattern matching for context selection and output filtering
//!
//! Two consumers share one tagged [`Pattern`] type:
//! - context include/exclude filters understand literal and `/regex/` patterns
//! - the `--grep` line filter additionally treats `a|b` as alternation

pub mod contexts;
pub mod pattern;

pub use contexts::filter_contexts;
pub use pattern::{Pattern, line_matches, matches};
