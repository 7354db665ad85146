use super::MAX_AUTHOR_LEN;

/// Split a free-text author field into individual names.
///
/// Feeds encode multiple authors as "A and B", "A; B", or "A, B". All three
/// separators are normalized to commas before splitting; empty fragments are
/// dropped.
pub fn split_author_field(raw: &str) -> Vec<String> {
    raw.replace(" and ", ", ")
        .replace(';', ",")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join author names with ", " and truncate to [`MAX_AUTHOR_LEN`].
///
/// Truncation prefers to cut at the last comma before the limit so no name is
/// chopped mid-word; if no comma falls late enough, the string is
/// hard-truncated. Either way an ellipsis marker is appended. Returns `None`
/// when there are no names.
pub fn join_authors(names: &[String]) -> Option<String> {
    if names.is_empty() {
        return None;
    }
    let joined = names.join(", ");
    if joined.len() <= MAX_AUTHOR_LEN {
        return Some(joined);
    }

    let mut cut: String = joined.chars().take(MAX_AUTHOR_LEN - 3).collect();
    match cut.rfind(',') {
        // A comma in the back half of the budget gives a clean name boundary.
        Some(pos) if pos > MAX_AUTHOR_LEN / 2 => cut.truncate(pos),
        _ => {}
    }
    cut.push_str("...");
    Some(cut)
}

/// Strip HTML tags from feed content, leaving plain text.
///
/// Deliberately minimal: a single pass that drops everything between `<` and
/// `>`. Good enough for abstracts and summaries; full HTML rendering is not a
/// goal here.
pub fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}
