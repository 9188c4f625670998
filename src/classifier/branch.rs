//! Branch name analysis.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Branch type reported when a name does not follow `type-issue-description`.
pub const UNKNOWN_BRANCH_TYPE: &str = "unknown";

/// Context extracted from a branch name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchContext {
    /// Commit type prefix of the branch, or `unknown`.
    #[serde(rename = "type")]
    pub branch_type: String,
    /// Issue number embedded in the branch name.
    pub issue_number: Option<u64>,
    /// Remaining words of the branch name, space separated.
    pub description: String,
}

impl Default for BranchContext {
    fn default() -> Self {
        Self {
            branch_type: UNKNOWN_BRANCH_TYPE.to_string(),
            issue_number: None,
            description: String::new(),
        }
    }
}

/// Issue metadata linked to a branch.
///
/// No tracker is contacted; the context only carries what the branch name
/// reveals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueContext {
    /// Issue number.
    pub number: u64,
    /// Display title.
    pub title: String,
    /// Labels, when a tracker provides them.
    pub labels: Vec<String>,
}

impl IssueContext {
    /// Builds the placeholder context for an issue number.
    pub fn for_issue(number: u64) -> Self {
        Self {
            number,
            title: format!("Issue #{number}"),
            labels: Vec::new(),
        }
    }
}

/// Branch naming pattern analyzer.
pub struct BranchAnalyzer;

impl BranchAnalyzer {
    /// Parses `type-issueNumber-description` branch names such as
    /// `feat-123-user-auth`. Anything else yields the default context.
    pub fn analyze(branch_name: &str) -> BranchContext {
        let Some(captures) = TYPED_ISSUE_BRANCH.captures(branch_name.trim()) else {
            return BranchContext::default();
        };

        let Some(issue_number) = captures
            .name("issue")
            .and_then(|m| m.as_str().parse::<u64>().ok())
        else {
            return BranchContext::default();
        };

        BranchContext {
            branch_type: captures
                .name("type")
                .map_or(UNKNOWN_BRANCH_TYPE, |m| m.as_str())
                .to_string(),
            issue_number: Some(issue_number),
            description: captures
                .name("desc")
                .map(|m| {
                    m.as_str()
                        .split(['-', '_'])
                        .filter(|w| !w.is_empty())
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .unwrap_or_default(),
        }
    }

    /// Returns the issue context for a parsed branch, if it names an issue.
    pub fn issue_context(branch: &BranchContext) -> Option<IssueContext> {
        branch.issue_number.map(IssueContext::for_issue)
    }
}

#[allow(clippy::unwrap_used)] // Compile-time constant regex pattern
static TYPED_ISSUE_BRANCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<type>feat|fix|docs|style|refactor|perf|test|chore|ci|build)-(?P<issue>\d+)-(?P<desc>.+)$",
    )
    .unwrap()
});
