//! Conventional commit message rules and automatic fixes.
//!
//! Only the first line is checked; bodies and footers pass through.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Longest first line accepted.
pub const MAX_SUBJECT_LEN: usize = 72;

/// Characters kept when a first line is truncated, before the ellipsis.
const TRUNCATED_LEN: usize = 69;

const ELLIPSIS: &str = "...";

#[allow(clippy::unwrap_used)] // Compile-time constant regex pattern
static CONVENTIONAL_SUBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(feat|fix|docs|style|refactor|perf|test|chore|ci|build)(\([^)]+\))?!?: .+")
        .unwrap()
});

#[allow(clippy::unwrap_used)] // Compile-time constant regex pattern
static TYPE_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(feat|fix|docs|style|refactor|perf|test|chore|ci|build)(\([^)]*\))?!?: ")
        .unwrap()
});

/// A rule the first line breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum MessageIssue {
    /// Not `type(scope)?!?: description`.
    NotConventional,
    /// First line longer than [`MAX_SUBJECT_LEN`] characters.
    SubjectTooLong {
        /// Actual length in characters.
        length: usize,
    },
    /// Description starts with an uppercase letter.
    CapitalizedDescription,
    /// Description ends with a period.
    TrailingPeriod,
}

impl fmt::Display for MessageIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConventional => {
                f.write_str("Must follow conventional commit format: type(scope): description")
            }
            Self::SubjectTooLong { length } => write!(
                f,
                "First line should be {MAX_SUBJECT_LEN} characters or less (found {length})"
            ),
            Self::CapitalizedDescription => {
                f.write_str("Description should not start with capital letter")
            }
            Self::TrailingPeriod => f.write_str("Description should not end with period"),
        }
    }
}

/// Result of checking, and possibly fixing, a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// The message after any fixes.
    pub message: String,
    /// Issues found in the original message.
    pub issues: Vec<MessageIssue>,
    /// Whether fixes were applied.
    pub auto_fixed: bool,
    /// Issues the fixes could not resolve.
    pub remaining: Vec<MessageIssue>,
}

fn split_first_line(message: &str) -> (&str, &str) {
    match message.split_once('\n') {
        Some((first, rest)) => (first, rest),
        None => (message, ""),
    }
}

/// The text after the first `": "` of a subject line.
fn description(subject: &str) -> Option<&str> {
    subject.split_once(": ").map(|(_, desc)| desc)
}

/// A truncated description ends in an ellipsis, not a period.
fn ends_with_period(description: &str) -> bool {
    description.ends_with('.') && !description.ends_with(ELLIPSIS)
}

/// Checks the first line against every rule.
pub fn validate(message: &str) -> Vec<MessageIssue> {
    let (subject, _) = split_first_line(message);
    let mut issues = Vec::new();

    if !CONVENTIONAL_SUBJECT.is_match(subject) {
        issues.push(MessageIssue::NotConventional);
    }

    let length = subject.chars().count();
    if length > MAX_SUBJECT_LEN {
        issues.push(MessageIssue::SubjectTooLong { length });
    }

    if let Some(desc) = description(subject) {
        if desc.chars().next().is_some_and(char::is_uppercase) {
            issues.push(MessageIssue::CapitalizedDescription);
        }
        if ends_with_period(desc) {
            issues.push(MessageIssue::TrailingPeriod);
        }
    }

    issues
}

/// Lowercases a word written in title case (`Thing`), leaving acronyms and
/// mixed-case identifiers (`HTTP`, `GitHub`) alone.
fn sentence_case_word(word: &str) -> String {
    let mut chars = word.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    let rest = chars.as_str();
    if first.is_uppercase() && !rest.chars().any(char::is_uppercase) {
        first.to_lowercase().chain(rest.chars()).collect()
    } else {
        word.to_string()
    }
}

fn fix_description(desc: &str) -> String {
    let mut fixed = desc
        .split(' ')
        .map(sentence_case_word)
        .collect::<Vec<_>>()
        .join(" ");

    while ends_with_period(&fixed) {
        fixed.pop();
    }
    fixed
}

/// Applies every automatic fix to the first line.
///
/// The type keyword is lowercased, the description is put in sentence case
/// without a trailing period, and an overlong line is cut to
/// [`TRUNCATED_LEN`] characters plus an ellipsis.
pub fn autofix(message: &str) -> String {
    let (subject, rest) = split_first_line(message);

    let mut fixed = match TYPE_KEYWORD.captures(subject) {
        Some(caps) => {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            let keyword = caps.get(1).map_or("", |m| m.as_str());
            let prefix = format!("{}{}", keyword.to_lowercase(), &whole[keyword.len()..]);
            format!("{prefix}{}", fix_description(&subject[whole.len()..]))
        }
        None => match subject.split_once(": ") {
            Some((head, desc)) => format!("{head}: {}", fix_description(desc)),
            None => subject.to_string(),
        },
    };

    if fixed.chars().count() > MAX_SUBJECT_LEN {
        fixed = fixed.chars().take(TRUNCATED_LEN).collect::<String>() + ELLIPSIS;
    }

    if message.contains('\n') {
        format!("{fixed}\n{rest}")
    } else {
        fixed
    }
}

/// Validates a message and fixes it when any rule fails.
pub fn validate_and_fix(message: &str) -> ValidationOutcome {
    let issues = validate(message);
    if issues.is_empty() {
        return ValidationOutcome {
            message: message.to_string(),
            issues,
            auto_fixed: false,
            remaining: Vec::new(),
        };
    }

    let fixed = autofix(message);
    let remaining = validate(&fixed);
    ValidationOutcome {
        auto_fixed: fixed != message,
        message: fixed,
        issues,
        remaining,
    }
}
