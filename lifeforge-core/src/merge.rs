//! Folding context patches into stored context
//!
//! | Field | Rule |
//! |-------|------|
//! | `goals` | replaced wholesale when the patch has any |
//! | `recent5` | replaced when the patch has any, then bounded to the newest entries |
//! | `progress` | key-wise union, patch values win |
//!
//! An empty patch field never clears stored state.

use crate::types::{Context, ContextPatch};

/// Default bound for the recent-actions log.
pub const DEFAULT_RECENT_LIMIT: usize = 5;

/// Merge `patch` into `old` keeping at most [`DEFAULT_RECENT_LIMIT`] recent actions.
pub fn merge(old: &Context, patch: &ContextPatch) -> Context {
    merge_with_limit(old, patch, DEFAULT_RECENT_LIMIT)
}

/// Merge `patch` into `old`.
///
/// When the patch supplies recent actions only the last `recent_limit` are
/// kept. A zero limit disables the bound.
pub fn merge_with_limit(old: &Context, patch: &ContextPatch, recent_limit: usize) -> Context {
    let mut merged = old.clone();

    if !patch.goals.is_empty() {
        merged.goals = patch.goals.clone();
    }

    if !patch.recent5.is_empty() {
        let skip = match recent_limit {
            0 => 0,
            limit => patch.recent5.len().saturating_sub(limit),
        };
        merged.recent5 = patch.recent5[skip..].to_vec();
    }

    merged.progress.extend(
        patch
            .progress
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );

    merged
}
