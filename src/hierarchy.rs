//! Parent inference for the flat, indent-leveled HTSUS listing.
//!
//! The published schedule is a flat CSV where nesting is expressed only
//! through an indent column. Walking the rows in listing order, a row at
//! indent L belongs under the nearest preceding row at a shallower
//! indent. [`infer_parent`] threads that walk through a small amount of
//! trailing state, one call per row.

use std::collections::BTreeMap;

/// The most recently seen code at each indent level, for rows processed
/// so far in listing order.
#[derive(Debug, Default, Clone)]
pub struct TrailingLevels {
    last_seen: BTreeMap<i64, String>,
}

impl TrailingLevels {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Infer the parent of `code` at indent `level`, updating the trailing
/// state so subsequent rows see this code.
///
/// The parent is the nearest tracked code at a level strictly below
/// `level`. After the lookup, `code` becomes the last-seen entry at
/// `level` and every tracked level deeper than `level` is cleared, so a
/// later sibling cannot attach under this row's children.
///
/// Arbitrary indent jumps are fine: a row at level 3 directly after a
/// level-0 row simply gets the level-0 row as its parent, and a level-0
/// row gets no parent at all.
pub fn infer_parent(code: &str, level: i64, trailing: &mut TrailingLevels) -> Option<String> {
    let parent = if level > 0 {
        trailing
            .last_seen
            .range(..level)
            .next_back()
            .map(|(_, c)| c.clone())
    } else {
        None
    };

    trailing.last_seen.insert(level, code.to_string());
    trailing.last_seen.retain(|&l, _| l <= level);

    parent
}
