//! `<system-reminder>` tags.
//!
//! A reminder is an annotation visible to the model for one turn. Tags
//! carrying a `persist="true"` attribute survive turn cleanup:
//!
//! ```text
//! <system-reminder>file changed on disk</system-reminder>
//! <system-reminder persist="true">never edit generated files</system-reminder>
//! ```

use std::sync::LazyLock;

use regex::Regex;

static REMINDER_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<system-reminder(?P<attrs>[^>]*)>.*?</system-reminder>")
        .expect("reminder tag pattern")
});

static PERSIST_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bpersist(?:\s*=\s*["']?true["']?)?(?:\s|/|$)"#)
        .expect("persist attribute pattern")
});

static TRAILING_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+\n").expect("trailing space pattern"));

static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank line pattern"));

/// Wrap text in an ephemeral reminder tag.
#[must_use]
pub fn wrap(text: &str) -> String {
    format!("<system-reminder>{text}</system-reminder>")
}

/// Wrap text in a persistent reminder tag.
#[must_use]
pub fn wrap_persistent(text: &str) -> String {
    format!(r#"<system-reminder persist="true">{text}</system-reminder>"#)
}

/// Whether `content` contains any reminder tag.
#[must_use]
pub fn has_reminder(content: &str) -> bool {
    REMINDER_TAG.is_match(content)
}

/// Whether `content` contains at least one persistent reminder tag.
#[must_use]
pub fn has_persistent_reminder(content: &str) -> bool {
    REMINDER_TAG.captures_iter(content).any(|c| is_persistent(&c))
}

/// Whether `content` is nothing but reminder tags and whitespace.
#[must_use]
pub fn is_reminder_only(content: &str) -> bool {
    has_reminder(content) && REMINDER_TAG.replace_all(content, "").trim().is_empty()
}

/// Remove every non-persistent tag, evaluating each tag on its own.
///
/// Returns `None` when nothing was removed. Whitespace left behind by the
/// removed tags is collapsed.
#[must_use]
pub fn strip_ephemeral(content: &str) -> Option<String> {
    let mut removed = false;
    let stripped = REMINDER_TAG.replace_all(content, |caps: &regex::Captures<'_>| {
        if is_persistent(caps) {
            caps[0].to_string()
        } else {
            removed = true;
            String::new()
        }
    });
    removed.then(|| collapse_whitespace(&stripped))
}

fn is_persistent(caps: &regex::Captures<'_>) -> bool {
    caps.name("attrs")
        .is_some_and(|attrs| PERSIST_ATTR.is_match(attrs.as_str()))
}

fn collapse_whitespace(text: &str) -> String {
    let text = TRAILING_SPACE.replace_all(text, "\n");
    BLANK_RUNS.replace_all(&text, "\n\n").trim().to_string()
}
