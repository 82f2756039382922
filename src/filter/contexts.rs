//! Include/exclude filtering of context names

use super::pattern::Pattern;

/// Filter contexts by include and exclude patterns, preserving order.
///
/// A context is kept when it matches at least one include pattern (or no
/// include patterns were given) and matches none of the exclude patterns.
/// Exclusion always wins. With no patterns at all the input is returned as is.
pub fn filter_contexts(contexts: Vec<String>, include: &[String], exclude: &[String]) -> Vec<String> {
    if include.is_empty() && exclude.is_empty() {
        return contexts;
    }

    let include: Vec<Pattern> = include.iter().map(|p| Pattern::parse(p)).collect();
    let exclude: Vec<Pattern> = exclude.iter().map(|p| Pattern::parse(p)).collect();

    contexts
        .into_iter()
        .filter(|ctx| {
            let included = include.is_empty() || include.iter().any(|p| p.is_match(ctx));
            included && !exclude.iter().any(|p| p.is_match(ctx))
        })
        .collect()
}
