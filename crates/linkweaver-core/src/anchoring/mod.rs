//! Link anchoring engine.
//!
//! Pure text/offset algorithms, no I/O:
//! - locate a candidate phrase in a document ([`find_link_position`])
//! - detect spans that already sit inside markup ([`is_already_anchored`],
//!   [`overlaps_markup`])
//! - splice approved candidates into content as anchors
//!   ([`apply_approved_links`]) or as reviewer highlights ([`highlight`])
//!
//! Positions are UTF-8 byte offsets. Splicing always runs from the highest
//! offset down, so every offset not yet applied still points into untouched
//! content.

mod locate;
mod splice;

pub use self::locate::{
    eq_ignore_case, find_link_position, is_already_anchored, matches_at, overlaps_markup,
};
pub use self::splice::{
    HighlightClasses, anchor_markup, apply_approved_links, escape_attr, highlight,
    select_non_overlapping,
};
