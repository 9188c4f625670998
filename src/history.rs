//! Commit history parsing, categorization and release impact summaries.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::version::BumpKind;

/// Separates the fields of a raw log entry produced by the VCS reader.
pub const FIELD_SEPARATOR: &str = "\x1f";

/// Conventional commit types, in changelog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitType {
    /// New features.
    Feat,
    /// Bug fixes.
    Fix,
    /// Documentation only.
    Docs,
    /// Formatting, whitespace.
    Style,
    /// Restructuring without behaviour change.
    Refactor,
    /// Performance improvements.
    Perf,
    /// Tests.
    Test,
    /// Maintenance, and anything non-conforming.
    Chore,
    /// CI configuration.
    Ci,
    /// Build system and dependencies.
    Build,
}

impl CommitType {
    /// Every type in vocabulary order.
    pub const ALL: [Self; 10] = [
        Self::Feat,
        Self::Fix,
        Self::Docs,
        Self::Style,
        Self::Refactor,
        Self::Perf,
        Self::Test,
        Self::Chore,
        Self::Ci,
        Self::Build,
    ];

    /// Returns the keyword used in commit subjects.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Feat => "feat",
            Self::Fix => "fix",
            Self::Docs => "docs",
            Self::Style => "style",
            Self::Refactor => "refactor",
            Self::Perf => "perf",
            Self::Test => "test",
            Self::Chore => "chore",
            Self::Ci => "ci",
            Self::Build => "build",
        }
    }

    /// Human-readable section title.
    pub const fn title(self) -> &'static str {
        match self {
            Self::Feat => "Features",
            Self::Fix => "Bug Fixes",
            Self::Docs => "Documentation",
            Self::Style => "Styling",
            Self::Refactor => "Code Refactoring",
            Self::Perf => "Performance Improvements",
            Self::Test => "Tests",
            Self::Chore => "Chores",
            Self::Ci => "Continuous Integration",
            Self::Build => "Build System",
        }
    }
}

impl fmt::Display for CommitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommitType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or(())
    }
}

/// One historical commit, parsed from a log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Full commit id.
    pub id: String,
    /// The subject line as written.
    pub message: String,
    /// The subject without its `type(scope)!: ` prefix.
    pub description: String,
    /// Conventional commit type.
    #[serde(rename = "type")]
    pub commit_type: CommitType,
    /// Optional scope from the subject.
    pub scope: Option<String>,
    /// Whether the commit announces a breaking change.
    pub breaking: bool,
    /// Author identity, `Name <email>`.
    pub author: String,
    /// Author timestamp, when the log entry carried a parseable one.
    pub timestamp: Option<DateTime<FixedOffset>>,
    /// Message body after the subject.
    pub body: String,
}

impl CommitRecord {
    /// Returns the first eight characters of the commit id.
    pub fn short_id(&self) -> &str {
        self.id.get(..8).unwrap_or(&self.id)
    }
}

/// The parts of a conventional commit subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConventionalSubject {
    /// Commit type, or `chore` for non-conforming subjects.
    pub commit_type: CommitType,
    /// Scope between the parentheses.
    pub scope: Option<String>,
    /// Whether the `!` marker is present.
    pub breaking: bool,
    /// Everything after `: `.
    pub description: String,
}

#[allow(clippy::unwrap_used)] // Compile-time constant regex pattern
static SUBJECT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<type>\w+)(?:\((?P<scope>[\w\-/]+)\))?(?P<breaking>!)?: (?P<desc>.+)$")
        .unwrap()
});

#[allow(clippy::unwrap_used)] // Compile-time constant regex pattern
static BREAKING_FOOTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^BREAKING[ -]CHANGE: ").unwrap());

/// Splits a subject line into its conventional commit parts.
///
/// Subjects that do not match, or whose type is outside the vocabulary, come
/// back as `chore` with the whole subject as description.
pub fn parse_subject(subject: &str) -> ConventionalSubject {
    let subject = subject.trim();

    let parsed = SUBJECT_PATTERN.captures(subject).and_then(|caps| {
        let commit_type = caps.name("type")?.as_str().parse().ok()?;
        Some(ConventionalSubject {
            commit_type,
            scope: caps.name("scope").map(|m| m.as_str().to_string()),
            breaking: caps.name("breaking").is_some(),
            description: caps.name("desc")?.as_str().to_string(),
        })
    });

    parsed.unwrap_or_else(|| ConventionalSubject {
        commit_type: CommitType::Chore,
        scope: None,
        breaking: false,
        description: subject.to_string(),
    })
}

/// Joins the fields of one commit into a raw log entry.
pub fn format_log_entry(
    id: &str,
    author: &str,
    timestamp: &DateTime<FixedOffset>,
    subject: &str,
    body: &str,
) -> String {
    let timestamp = timestamp.to_rfc3339();
    [id, author, timestamp.as_str(), subject, body].join(FIELD_SEPARATOR)
}

/// Parses one raw log entry into a commit record. Never fails.
///
/// Entries are `id, author, timestamp, subject, body` joined by
/// [`FIELD_SEPARATOR`]. Text without separators is treated as a bare subject.
pub fn parse_log_entry(raw: &str) -> CommitRecord {
    let fields: Vec<&str> = raw.splitn(5, FIELD_SEPARATOR).collect();

    let (id, author, timestamp, subject, body) = match fields.as_slice() {
        [id, author, timestamp, subject, body] => (*id, *author, Some(*timestamp), *subject, *body),
        [id, author, timestamp, subject] => (*id, *author, Some(*timestamp), *subject, ""),
        _ => ("", "", None, raw, ""),
    };

    let subject = subject.lines().next().unwrap_or_default();
    let parsed = parse_subject(subject);
    let body = body.trim();
    let breaking = parsed.breaking || BREAKING_FOOTER.is_match(body);

    CommitRecord {
        id: id.trim().to_string(),
        message: subject.trim().to_string(),
        description: parsed.description,
        commit_type: parsed.commit_type,
        scope: parsed.scope,
        breaking,
        author: author.trim().to_string(),
        timestamp: timestamp.and_then(|t| DateTime::parse_from_rfc3339(t.trim()).ok()),
        body: body.to_string(),
    }
}

/// Commits grouped by type; buckets keep encounter order.
pub type Categorized = BTreeMap<CommitType, Vec<CommitRecord>>;

/// Groups records by commit type.
pub fn categorize(records: &[CommitRecord]) -> Categorized {
    let mut categories = Categorized::new();
    for record in records {
        categories
            .entry(record.commit_type)
            .or_default()
            .push(record.clone());
    }
    categories
}

/// Aggregate release impact of a set of commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    /// Number of commits considered.
    pub total_commits: usize,
    /// Commits per type; types with no commits are absent.
    pub counts_by_type: BTreeMap<CommitType, usize>,
    /// Number of `feat` commits.
    pub features: usize,
    /// Number of `fix` commits.
    pub fixes: usize,
    /// Number of breaking commits of any type.
    pub breaking_changes: usize,
    /// Distinct authors in first-seen order.
    pub contributors: Vec<String>,
    /// Earliest commit timestamp.
    pub first_commit_at: Option<DateTime<FixedOffset>>,
    /// Latest commit timestamp.
    pub last_commit_at: Option<DateTime<FixedOffset>>,
    /// Bump implied by the commits.
    pub suggested_bump: BumpKind,
}

impl ChangeSummary {
    /// Number of commits of the given type.
    pub fn count(&self, commit_type: CommitType) -> usize {
        self.counts_by_type.get(&commit_type).copied().unwrap_or(0)
    }
}

/// Summarizes a set of commits.
///
/// Breaking changes force a major bump, then features a minor bump; anything
/// else, including no commits at all, is a patch.
pub fn summarize(records: &[CommitRecord]) -> ChangeSummary {
    let mut counts_by_type = BTreeMap::new();
    let mut contributors: Vec<String> = Vec::new();

    for record in records {
        *counts_by_type.entry(record.commit_type).or_insert(0) += 1;

        let author = record.author.trim();
        if !author.is_empty() && !contributors.iter().any(|c| c == author) {
            contributors.push(author.to_string());
        }
    }

    let features = counts_by_type.get(&CommitType::Feat).copied().unwrap_or(0);
    let fixes = counts_by_type.get(&CommitType::Fix).copied().unwrap_or(0);
    let breaking_changes = records.iter().filter(|r| r.breaking).count();

    let suggested_bump = if breaking_changes > 0 {
        BumpKind::Major
    } else if features > 0 {
        BumpKind::Minor
    } else {
        BumpKind::Patch
    };

    ChangeSummary {
        total_commits: records.len(),
        counts_by_type,
        features,
        fixes,
        breaking_changes,
        contributors,
        first_commit_at: records.iter().filter_map(|r| r.timestamp).min(),
        last_commit_at: records.iter().filter_map(|r| r.timestamp).max(),
        suggested_bump,
    }
}

/// Parsed commit history with its categorization and summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryAnalysis {
    /// Records in log order.
    pub commits: Vec<CommitRecord>,
    /// Records grouped by type.
    pub categorized: Categorized,
    /// Aggregate impact.
    pub summary: ChangeSummary,
}

impl HistoryAnalysis {
    /// Parses raw log entries and derives the categorization and summary.
    pub fn from_log<S: AsRef<str>>(entries: &[S]) -> Self {
        let commits: Vec<CommitRecord> = entries
            .iter()
            .map(|e| parse_log_entry(e.as_ref()))
            .collect();
        Self::from_records(commits)
    }

    /// Builds the analysis from already parsed records.
    pub fn from_records(commits: Vec<CommitRecord>) -> Self {
        let categorized = categorize(&commits);
        let summary = summarize(&commits);
        Self {
            commits,
            categorized,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(subject: &str, author: &str) -> CommitRecord {
        CommitRecord {
            author: author.to_string(),
            ..parse_log_entry(subject)
        }
    }

    // ── parse_log_entry ──────────────────────────────────────────────

    #[test]
    fn scoped_feature() {
        let r = parse_log_entry("feat(auth): add login");
        assert_eq!(r.commit_type, CommitType::Feat);
        assert_eq!(r.scope.as_deref(), Some("auth"));
        assert!(!r.breaking);
        assert_eq!(r.description, "add login");
        assert_eq!(r.message, "feat(auth): add login");
    }

    #[test]
    fn bang_marks_breaking() {
        let r = parse_log_entry("feat(api)!: change shape");
        assert!(r.breaking);
        assert_eq!(r.scope.as_deref(), Some("api"));
    }

    #[test]
    fn breaking_without_scope() {
        let r = parse_log_entry("refactor!: drop legacy config");
        assert_eq!(r.commit_type, CommitType::Refactor);
        assert!(r.scope.is_none());
        assert!(r.breaking);
    }

    #[test]
    fn scope_allows_slash_and_hyphen() {
        let r = parse_log_entry("fix(core/http-client): retry on reset");
        assert_eq!(r.scope.as_deref(), Some("core/http-client"));
    }

    #[test]
    fn non_conforming_falls_back_to_chore() {
        let r = parse_log_entry("Fixed the thing");
        assert_eq!(r.commit_type, CommitType::Chore);
        assert!(r.scope.is_none());
        assert!(!r.breaking);
        assert_eq!(r.description, "Fixed the thing");
    }

    #[test]
    fn unknown_type_falls_back_to_chore() {
        let r = parse_log_entry("release: bump version to 1.0.0");
        assert_eq!(r.commit_type, CommitType::Chore);
        assert_eq!(r.description, "release: bump version to 1.0.0");
    }

    #[test]
    fn missing_space_after_colon_is_non_conforming() {
        let r = parse_log_entry("feat:add login");
        assert_eq!(r.commit_type, CommitType::Chore);
    }

    #[test]
    fn structured_entry_fields() -> anyhow::Result<()> {
        let ts = DateTime::parse_from_rfc3339("2024-03-01T10:00:00+01:00")?;
        let raw = format_log_entry(
            "0123456789abcdef0123456789abcdef01234567",
            "Ada <ada@example.com>",
            &ts,
            "fix(parser): handle empty input",
            "Longer explanation.\n\nRefs #4",
        );
        let r = parse_log_entry(&raw);
        assert_eq!(r.id, "0123456789abcdef0123456789abcdef01234567");
        assert_eq!(r.short_id(), "01234567");
        assert_eq!(r.author, "Ada <ada@example.com>");
        assert_eq!(r.timestamp, Some(ts));
        assert_eq!(r.commit_type, CommitType::Fix);
        assert_eq!(r.body, "Longer explanation.\n\nRefs #4");
        assert!(!r.breaking);
        Ok(())
    }

    #[test]
    fn breaking_change_footer_marks_breaking() -> anyhow::Result<()> {
        let ts = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")?;
        let raw = format_log_entry(
            "abc",
            "Bob <bob@example.com>",
            &ts,
            "feat: new config loader",
            "BREAKING CHANGE: config moved to .app.yaml",
        );
        assert!(parse_log_entry(&raw).breaking);
        Ok(())
    }

    #[test]
    fn bad_timestamp_is_dropped() {
        let raw = ["abc", "Bob", "yesterday", "fix: x", ""].join("\x1f");
        let r = parse_log_entry(&raw);
        assert!(r.timestamp.is_none());
        assert_eq!(r.commit_type, CommitType::Fix);
    }

    // ── categorize / summarize ──────────────────────────────────────

    #[test]
    fn categorize_preserves_encounter_order() {
        let records = vec![
            record("feat: one", "a"),
            record("fix: two", "a"),
            record("feat: three", "b"),
        ];
        let categories = categorize(&records);
        let feats: Vec<&str> = categories[&CommitType::Feat]
            .iter()
            .map(|r| r.description.as_str())
            .collect();
        assert_eq!(feats, ["one", "three"]);
        assert_eq!(categories[&CommitType::Fix].len(), 1);
        assert!(!categories.contains_key(&CommitType::Docs));
    }

    #[test]
    fn empty_history_suggests_patch() {
        let summary = summarize(&[]);
        assert_eq!(summary.suggested_bump, BumpKind::Patch);
        assert_eq!(summary.total_commits, 0);
        assert!(summary.contributors.is_empty());
    }

    #[test]
    fn features_suggest_minor() {
        let summary = summarize(&[record("feat: a", "x"), record("fix: b", "y")]);
        assert_eq!(summary.suggested_bump, BumpKind::Minor);
        assert_eq!(summary.features, 1);
        assert_eq!(summary.fixes, 1);
    }

    #[test]
    fn breaking_fix_suggests_major() {
        let summary = summarize(&[record("feat: a", "x"), record("fix!: b", "y")]);
        assert_eq!(summary.suggested_bump, BumpKind::Major);
        assert_eq!(summary.breaking_changes, 1);
    }

    #[test]
    fn chores_only_suggest_patch() {
        let summary = summarize(&[record("docs: a", "x"), record("whatever", "y")]);
        assert_eq!(summary.suggested_bump, BumpKind::Patch);
        assert_eq!(summary.count(CommitType::Chore), 1);
        assert_eq!(summary.count(CommitType::Docs), 1);
    }

    #[test]
    fn contributors_are_deduplicated_in_first_seen_order() {
        let summary = summarize(&[
            record("feat: a", "Bob"),
            record("fix: b", "Ada"),
            record("fix: c", "Bob"),
            record("fix: d", ""),
        ]);
        assert_eq!(summary.contributors, ["Bob", "Ada"]);
    }

    mod props {
        use super::*;

        fn arb_subject() -> impl Strategy<Value = String> {
            (
                prop::sample::select(vec!["feat", "fix", "docs", "chore", "perf", "Misc"]),
                any::<bool>(),
                "[a-z ]{1,20}",
            )
                .prop_map(|(t, bang, desc)| {
                    format!("{t}{}: {desc}", if bang { "!" } else { "" })
                })
        }

        proptest! {
            #[test]
            fn any_breaking_commit_forces_major(subjects in prop::collection::vec(arb_subject(), 0..12)) {
                let mut records: Vec<CommitRecord> = subjects.iter().map(|s| parse_log_entry(s)).collect();
                records.push(parse_log_entry("fix!: incompatible"));
                prop_assert_eq!(summarize(&records).suggested_bump, BumpKind::Major);
            }

            #[test]
            fn features_without_breaking_force_minor(subjects in prop::collection::vec(arb_subject(), 0..12)) {
                let mut records: Vec<CommitRecord> = subjects
                    .iter()
                    .map(|s| parse_log_entry(s))
                    .filter(|r| !r.breaking)
                    .collect();
                records.push(parse_log_entry("feat: something"));
                prop_assert_eq!(summarize(&records).suggested_bump, BumpKind::Minor);
            }

            #[test]
            fn parse_never_panics(raw in "\\PC{0,80}") {
                let _ = parse_log_entry(&raw);
            }
        }
    }
}
