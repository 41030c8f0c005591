//! Descending-offset splicing of candidates into content.

use std::cmp::Ordering;

use tracing::debug;

use super::locate::{matches_at, overlaps_markup};
use crate::domain::{LinkCandidate, LinkStatus};

/// CSS classes for the reviewer preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightClasses {
    pub approved: String,
    pub pending: String,
}

impl Default for HighlightClasses {
    fn default() -> Self {
        Self {
            approved: "bg-green-200 border-b-2 border-green-500".to_string(),
            pending: "bg-yellow-200 border-b-2 border-yellow-500".to_string(),
        }
    }
}

/// Escape text for use inside a double-quoted HTML attribute.
pub fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// `<a href="{href}" title="{alt}">{text}</a>`; `text` is the original slice.
pub fn anchor_markup(href: &str, alt_text: &str, text: &str) -> String {
    format!(
        r#"<a href="{}" title="{}">{}</a>"#,
        escape_attr(href),
        escape_attr(alt_text),
        text
    )
}

/// Overlap policy: among candidates whose spans overlap, the highest
/// confidence wins (ties: earlier position, then earlier creation).
///
/// Returns the survivors sorted by `link_position` descending, ready to splice.
pub fn select_non_overlapping<'a, I>(candidates: I) -> Vec<&'a LinkCandidate>
where
    I: IntoIterator<Item = &'a LinkCandidate>,
{
    let mut ranked: Vec<&LinkCandidate> = candidates
        .into_iter()
        .filter(|c| !c.link_text.is_empty())
        .collect();
    ranked.sort_by(|a, b| {
        b.confidence
            .cmp(&a.confidence)
            .then_with(|| a.link_position.cmp(&b.link_position))
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut kept: Vec<&LinkCandidate> = Vec::with_capacity(ranked.len());
    for candidate in ranked {
        if kept.iter().any(|k| k.overlaps(candidate)) {
            debug!(link_id = %candidate.id, "dropping candidate overlapping a higher-confidence span");
            continue;
        }
        kept.push(candidate);
    }

    kept.sort_by(|a, b| descending_position(a, b));
    kept
}

fn descending_position(a: &LinkCandidate, b: &LinkCandidate) -> Ordering {
    b.link_position
        .cmp(&a.link_position)
        .then_with(|| a.id.cmp(&b.id))
}

/// Splice `wrap(candidate, original_slice)` over each candidate's span,
/// highest offset first. Candidates whose text drifted, or whose span now
/// overlaps markup, are skipped.
fn splice_descending<F>(content: &str, selected: &[&LinkCandidate], wrap: F) -> String
where
    F: Fn(&LinkCandidate, &str) -> Option<String>,
{
    let mut out = content.to_string();
    for candidate in selected {
        let position = candidate.link_position;
        let Some(slice) = matches_at(&out, position, &candidate.link_text).map(str::to_string)
        else {
            debug!(link_id = %candidate.id, position, "link text drifted; skipping");
            continue;
        };
        if overlaps_markup(&out, position, slice.len()) {
            debug!(link_id = %candidate.id, position, "span overlaps existing markup; skipping");
            continue;
        }
        let Some(replacement) = wrap(candidate, &slice) else {
            continue;
        };
        out.replace_range(position..position + slice.len(), &replacement);
    }
    out
}

/// Materialize approved candidates as anchors.
///
/// Non-approved candidates are ignored. `href_for` resolves the target's
/// address; candidates it cannot resolve are skipped. The input order does
/// not matter: candidates are sorted internally.
pub fn apply_approved_links<'a, I, F>(content: &str, candidates: I, href_for: F) -> String
where
    I: IntoIterator<Item = &'a LinkCandidate>,
    F: Fn(&LinkCandidate) -> Option<String>,
{
    let selected = select_non_overlapping(
        candidates
            .into_iter()
            .filter(|c| c.status == LinkStatus::Approved),
    );
    splice_descending(content, &selected, |candidate, text| {
        let href = href_for(candidate)?;
        Some(anchor_markup(&href, &candidate.alt_text, text))
    })
}

/// Reviewer preview: wrap approved and pending spans in status-coloured
/// `<span>`s. Rejected candidates are excluded.
pub fn highlight<'a, I>(content: &str, candidates: I, classes: &HighlightClasses) -> String
where
    I: IntoIterator<Item = &'a LinkCandidate>,
{
    let selected = select_non_overlapping(
        candidates
            .into_iter()
            .filter(|c| c.status != LinkStatus::Rejected),
    );
    splice_descending(content, &selected, |candidate, text| {
        let class = match candidate.status {
            LinkStatus::Approved => &classes.approved,
            LinkStatus::Pending => &classes.pending,
            LinkStatus::Rejected => return None,
        };
        Some(format!(r#"<span class="{}">{}</span>"#, escape_attr(class), text))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::link::fixtures::candidate;

    const DOC: &str = "AB link1 CD link2 EF";

    fn href(c: &LinkCandidate) -> Option<String> {
        Some(format!("/blog/doc-{}", c.target_document_id))
    }

    fn approved(position: usize, text: &str) -> LinkCandidate {
        candidate(position, text, LinkStatus::Approved)
    }

    /// Ascending application without re-sorting (negative control).
    fn apply_naively_ascending(content: &str, candidates: &[LinkCandidate]) -> String {
        let mut out = content.to_string();
        for c in candidates {
            let Some(slice) = matches_at(&out, c.link_position, &c.link_text).map(str::to_string)
            else {
                continue;
            };
            let markup = anchor_markup("/blog/x", &c.alt_text, &slice);
            out.replace_range(c.link_position..c.link_position + slice.len(), &markup);
        }
        out
    }

    #[test]
    fn applies_both_links_regardless_of_input_order() {
        let first = approved(3, "link1");
        let second = approved(12, "link2");

        let forward = apply_approved_links(DOC, [&first, &second], href);
        let backward = apply_approved_links(DOC, [&second, &first], href);

        assert_eq!(forward, backward);
        assert_eq!(
            forward,
            r#"AB <a href="/blog/doc-2" title="About link1">link1</a> CD <a href="/blog/doc-2" title="About link2">link2</a> EF"#
        );
    }

    #[test]
    fn naive_ascending_order_loses_the_later_link() {
        let candidates = vec![approved(3, "link1"), approved(12, "link2")];

        let naive = apply_naively_ascending(DOC, &candidates);

        // The first splice shifted "link2" away from offset 12.
        assert_eq!(naive.matches("<a ").count(), 1);
        assert_ne!(naive, apply_approved_links(DOC, &candidates, href));
    }

    #[test]
    fn applying_twice_to_original_is_deterministic() {
        let candidates = vec![approved(12, "link2"), approved(3, "link1")];
        let once = apply_approved_links(DOC, &candidates, href);
        let twice = apply_approved_links(DOC, &candidates, href);
        assert_eq!(once, twice);
    }

    #[test]
    fn reapplying_to_materialized_content_does_not_nest_anchors() {
        let candidates = vec![approved(3, "link1"), approved(12, "link2")];
        let materialized = apply_approved_links(DOC, &candidates, href);

        let again = apply_approved_links(&materialized, &candidates, href);

        assert_eq!(again, materialized);
    }

    #[test]
    fn only_approved_candidates_are_anchored() {
        let candidates = vec![
            candidate(3, "link1", LinkStatus::Pending),
            candidate(12, "link2", LinkStatus::Rejected),
        ];
        assert_eq!(apply_approved_links(DOC, &candidates, href), DOC);
    }

    #[test]
    fn drifted_candidate_is_skipped() {
        let candidates = vec![approved(4, "link1"), approved(12, "link2")];
        let out = apply_approved_links(DOC, &candidates, href);
        assert_eq!(out.matches("<a ").count(), 1);
        assert!(out.contains(">link2</a>"));
    }

    #[test]
    fn span_inside_existing_anchor_is_never_anchored() {
        let content = r#"Read <a href="/blog/old">the loan guide</a> first."#;
        let position = content.find("loan guide").unwrap();
        let candidates = vec![approved(position, "loan guide")];

        assert_eq!(apply_approved_links(content, &candidates, href), content);
    }

    #[test]
    fn keeps_original_casing_of_the_slice() {
        let content = "Apply for an SBA Loan today";
        let candidates = vec![approved(13, "sba loan")];
        let out = apply_approved_links(content, &candidates, href);
        assert!(out.contains(">SBA Loan</a>"));
    }

    #[test]
    fn unresolvable_target_is_skipped() {
        let candidates = vec![approved(3, "link1")];
        assert_eq!(apply_approved_links(DOC, &candidates, |_| None), DOC);
    }

    #[test]
    fn overlapping_spans_keep_highest_confidence() {
        let mut low = approved(3, "link1 CD");
        low.confidence = 75;
        let mut high = approved(9, "CD link2");
        high.confidence = 90;

        let out = apply_approved_links(DOC, [&low, &high], href);

        assert_eq!(out.matches("<a ").count(), 1);
        assert!(out.contains(">CD link2</a>"));
    }

    #[test]
    fn alt_text_is_attribute_escaped() {
        let mut c = approved(3, "link1");
        c.alt_text = r#"Say "hi" & <go>"#.to_string();
        let out = apply_approved_links(DOC, [&c], href);
        assert!(out.contains(r#"title="Say &quot;hi&quot; &amp; &lt;go&gt;""#));
    }

    #[test]
    fn highlight_colours_by_status_and_drops_rejected() {
        let candidates = vec![
            candidate(3, "link1", LinkStatus::Approved),
            candidate(12, "link2", LinkStatus::Pending),
            candidate(0, "AB", LinkStatus::Rejected),
        ];
        let classes = HighlightClasses::default();

        let out = highlight(DOC, &candidates, &classes);

        assert_eq!(
            out,
            format!(
                r#"AB <span class="{}">link1</span> CD <span class="{}">link2</span> EF"#,
                classes.approved, classes.pending
            )
        );
    }

    #[test]
    fn selection_is_sorted_descending() {
        let a = approved(3, "link1");
        let b = approved(12, "link2");
        let c = approved(18, "EF");
        let order: Vec<usize> = select_non_overlapping([&a, &c, &b])
            .into_iter()
            .map(|c| c.link_position)
            .collect();
        assert_eq!(order, vec![18, 12, 3]);
    }
}
