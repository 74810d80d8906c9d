//! Task title normalization and request decomposition.

/// Longest task title kept before clipping.
pub const MAX_TITLE_CHARS: usize = 80;

/// Titles used when a request yields fewer than three fragments.
pub const PADDING_TITLES: [&str; 3] = [
    "Clarify request scope",
    "Produce initial plan",
    "Prepare deliverable draft",
];

/// Collapse whitespace, drop one trailing `.`, `!` or `?`, and clip to
/// [`MAX_TITLE_CHARS`] with a `...` suffix.
///
/// Blank input becomes `Task {fallback_index + 1}`.
pub fn normalize_task_title(fragment: &str, fallback_index: u64) -> String {
    let text = fragment.trim();
    if text.is_empty() {
        return format!("Task {}", fallback_index.saturating_add(1));
    }
    let mut normalized = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                normalized.push(' ');
            }
            in_space = true;
        } else {
            normalized.push(c);
            in_space = false;
        }
    }
    if normalized.ends_with(['.', '!', '?']) {
        normalized.pop();
    }
    if normalized.chars().count() <= MAX_TITLE_CHARS {
        return normalized;
    }
    let mut clipped: String = normalized
        .chars()
        .take(MAX_TITLE_CHARS.saturating_sub(3))
        .collect();
    clipped.push_str("...");
    clipped
}

/// Split request text into exactly three task titles.
///
/// The text is split on `.`, `;` and newlines; blank fragments are dropped.
/// The first three survivors are kept, or the list is padded from
/// [`PADDING_TITLES`].
pub fn decompose_request_text(text: &str) -> Vec<String> {
    let fragments: Vec<String> = text
        .split(['.', '\n', ';'])
        .map(|fragment| normalize_task_title(fragment, 0))
        .filter(|fragment| fragment != "Task 1")
        .collect();
    PADDING_TITLES
        .iter()
        .enumerate()
        .map(|(index, padding)| {
            let title = fragments.get(index).map_or(*padding, String::as_str);
            normalize_task_title(title, u64::try_from(index).unwrap_or(0))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_are_normalized() {
        assert_eq!(normalize_task_title("  Draft   launch\tmessaging. ", 0), "Draft launch messaging");
        assert_eq!(normalize_task_title("Ship it!!", 0), "Ship it!");
        assert_eq!(normalize_task_title("   ", 4), "Task 5");
        let long = "x".repeat(90);
        let clipped = normalize_task_title(&long, 0);
        assert_eq!(clipped.chars().count(), MAX_TITLE_CHARS);
        assert!(clipped.ends_with("..."));
    }

    #[test]
    fn request_splits_into_three_tasks() {
        let titles = decompose_request_text(
            "Research competitors. Draft launch messaging. Prepare rollout checklist. Extra work",
        );
        assert_eq!(
            titles,
            vec![
                "Research competitors",
                "Draft launch messaging",
                "Prepare rollout checklist"
            ]
        );
    }

    #[test]
    fn short_request_is_padded() {
        let titles = decompose_request_text("Build a landing page;;\n");
        assert_eq!(
            titles,
            vec![
                "Build a landing page",
                "Produce initial plan",
                "Prepare deliverable draft"
            ]
        );
    }
}
