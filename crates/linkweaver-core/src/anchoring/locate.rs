//! Phrase location and markup-overlap checks.

/// Unicode-aware case-insensitive equality without allocating.
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

/// Byte offset of `link_text` in `content`.
///
/// First exact match wins; otherwise the first case-insensitive match over a
/// window of the same byte length. `None` when the phrase does not occur.
pub fn find_link_position(content: &str, link_text: &str) -> Option<usize> {
    if link_text.is_empty() {
        return None;
    }
    if let Some(position) = content.find(link_text) {
        return Some(position);
    }
    content
        .char_indices()
        .map(|(start, _)| start)
        .find(|&start| matches_at(content, start, link_text).is_some())
}

/// The slice of `content` at `[position, position + link_text.len())` if it
/// still equals `link_text` case-insensitively. This is the drift guard.
pub fn matches_at<'a>(content: &'a str, position: usize, link_text: &str) -> Option<&'a str> {
    if link_text.is_empty() {
        return None;
    }
    let end = position.checked_add(link_text.len())?;
    let slice = content.get(position..end)?;
    eq_ignore_case(slice, link_text).then_some(slice)
}

/// True when `[position, position + length)` falls inside an existing anchor.
///
/// Finds the nearest opening `<a` tag before `position` that has not been
/// closed before `position`; the span is anchored only if that tag's
/// closing `</a>` comes at or after `position + length`. An anchor that is
/// never closed does not count here (`overlaps_markup` still rejects it).
pub fn is_already_anchored(content: &str, position: usize, length: usize) -> bool {
    let bytes = content.as_bytes();
    let start = position.min(bytes.len());
    let Some(open) = open_anchor_before(bytes, start) else {
        return false;
    };
    find_ignore_ascii_case(&bytes[open..], b"</a>")
        .is_some_and(|relative_close| open + relative_close >= position.saturating_add(length))
}

/// The last `<a` before `start` with no `</a>` between it and `start`.
fn open_anchor_before(bytes: &[u8], start: usize) -> Option<usize> {
    let before = &bytes[..start];
    let open = last_anchor_open(before)?;
    if rfind_ignore_ascii_case(before, b"</a>").is_some_and(|close| close > open) {
        return None;
    }
    Some(open)
}

/// Broader check used before persisting or splicing: the span is inside an
/// anchor (closed or not), inside a tag's own `<...>` text, or contains tag
/// delimiters.
pub fn overlaps_markup(content: &str, position: usize, length: usize) -> bool {
    if is_already_anchored(content, position, length) {
        return true;
    }
    let bytes = content.as_bytes();
    let start = position.min(bytes.len());
    if open_anchor_before(bytes, start).is_some() {
        return true;
    }
    let end = position.saturating_add(length).min(bytes.len());

    let inside_tag = match (
        bytes[..start].iter().rposition(|&b| b == b'<'),
        bytes[..start].iter().rposition(|&b| b == b'>'),
    ) {
        (Some(lt), Some(gt)) => lt > gt,
        (Some(_), None) => true,
        _ => false,
    };

    inside_tag || bytes[start..end].iter().any(|&b| b == b'<' || b == b'>')
}

/// Index of the last `<a` that starts an anchor tag (`<a>` or `<a` + whitespace).
fn last_anchor_open(haystack: &[u8]) -> Option<usize> {
    let mut end = haystack.len();
    while let Some(idx) = rfind_ignore_ascii_case(&haystack[..end], b"<a") {
        match haystack.get(idx + 2) {
            Some(b) if b.is_ascii_whitespace() || *b == b'>' => return Some(idx),
            _ => end = idx,
        }
    }
    None
}

fn find_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .find(|&i| haystack[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

fn rfind_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| haystack[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn exact_match_wins_over_case_insensitive() {
        let content = "An SBA Loan differs from an SBA loan application.";
        assert_eq!(find_link_position(content, "SBA loan"), Some(28));
    }

    #[test]
    fn falls_back_to_case_insensitive() {
        let content = "Apply for an SBA Loan today";
        assert_eq!(find_link_position(content, "sba loan"), Some(13));
    }

    #[test]
    fn missing_phrase_is_none() {
        assert_eq!(find_link_position("nothing here", "buy a business"), None);
        assert_eq!(find_link_position("anything", ""), None);
    }

    #[test]
    fn case_insensitive_search_respects_char_boundaries() {
        let content = "Über café Owners";
        let position = find_link_position(content, "café owners").unwrap();
        assert_eq!(&content[position..position + "café owners".len()], "café Owners");
    }

    #[test]
    fn drift_guard_compares_case_insensitively() {
        let content = "AB link1 CD";
        assert_eq!(matches_at(content, 3, "LINK1"), Some("link1"));
        assert_eq!(matches_at(content, 4, "link1"), None);
        assert_eq!(matches_at(content, 100, "link1"), None);
    }

    #[rstest]
    #[case::inside_anchor(r#"see <a href="/x">the loan guide</a> now"#, "loan", true)]
    #[case::after_closed_anchor(r#"<a href="/x">guide</a> the loan guide"#, "loan", false)]
    #[case::plain_text("just the loan guide", "loan", false)]
    #[case::uppercase_tag(r#"<A HREF="/x">the loan guide</A>"#, "loan", true)]
    #[case::bare_open_tag("<a>the loan guide</a>", "loan", true)]
    #[case::abbr_is_not_anchor(r#"<abbr title="x">the loan</abbr>"#, "loan", false)]
    #[case::unclosed_anchor(r#"<a href="/x">the loan guide"#, "loan", false)]
    fn anchored_detection(#[case] content: &str, #[case] phrase: &str, #[case] expected: bool) {
        let position = find_link_position(content, phrase).unwrap();
        assert_eq!(is_already_anchored(content, position, phrase.len()), expected);
    }

    #[test]
    fn anchor_closing_inside_span_is_not_anchored() {
        let content = r#"<a href="/x">loan</a> guide"#;
        let position = content.find("loan").unwrap();
        let length = "loan</a> guide".len();
        assert!(!is_already_anchored(content, position, length));
        assert!(is_already_anchored(content, position, "loan".len()));
        // still refused before splicing
        assert!(overlaps_markup(content, position, length));
    }

    #[test]
    fn unclosed_anchor_is_still_markup() {
        let content = r#"<a href="/x">the loan guide"#;
        let position = content.find("loan").unwrap();
        assert!(!is_already_anchored(content, position, 4));
        assert!(overlaps_markup(content, position, 4));
    }

    #[test]
    fn later_unrelated_anchor_does_not_count() {
        let content = r#"<a href="/a">x</a> the loan guide <a href="/b">y</a>"#;
        let position = content.find("loan").unwrap();
        assert!(!is_already_anchored(content, position, 4));
    }

    #[rstest]
    #[case::attribute_text(r#"<img alt="loan guide">"#, "loan guide", true)]
    #[case::spans_tag(r#"the <b>loan</b> guide"#, "the <b>loan", true)]
    #[case::plain(r#"<p>the loan guide</p>"#, "loan guide", false)]
    fn markup_overlap(#[case] content: &str, #[case] phrase: &str, #[case] expected: bool) {
        let position = content.find(phrase).unwrap();
        assert_eq!(overlaps_markup(content, position, phrase.len()), expected);
    }
}
