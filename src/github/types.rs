//! Pull request snapshot types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies a pull request across the watched repositories.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrId {
    pub repo: String,
    pub number: u64,
}

impl fmt::Display for PrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repo, self.number)
    }
}

/// Immutable view of one open pull request at fetch time.
///
/// Review state is resolved by the fetcher: `review_count` counts every
/// review that is not a bare comment, `approved` is set when at least one
/// review is in the `APPROVED` state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub state: String,
    pub draft: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user: User,
    pub head: Branch,
    pub base: Branch,
    pub url: String,
    pub approved: bool,
    pub review_count: u32,
    pub additions: u64,
    pub deletions: u64,
    pub changed_files: u64,
}

impl PullRequest {
    pub fn id(&self) -> PrId {
        PrId {
            repo: self.repo.clone(),
            number: self.number,
        }
    }

    pub fn total_changes(&self) -> u64 {
        self.additions + self.deletions
    }

    pub fn size(&self) -> SizeCategory {
        SizeCategory::from_changes(self.total_changes())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    pub login: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Branch {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
}

/// T-shirt size of a change, by lines added plus deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeCategory {
    XS,
    S,
    M,
    L,
    XL,
}

impl SizeCategory {
    pub fn from_changes(total: u64) -> Self {
        match total {
            0..=50 => Self::XS,
            51..=200 => Self::S,
            201..=500 => Self::M,
            501..=1000 => Self::L,
            _ => Self::XL,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::XS => "XS",
            Self::S => "S",
            Self::M => "M",
            Self::L => "L",
            Self::XL => "XL",
        }
    }
}

/// Review states as reported by the GitHub reviews API.
pub mod review_state {
    pub const APPROVED: &str = "APPROVED";
    pub const COMMENTED: &str = "COMMENTED";
}

/// Resolve `(approved, review_count)` from a list of review states.
pub fn tally_reviews<'a, I>(states: I) -> (bool, u32)
where
    I: IntoIterator<Item = &'a str>,
{
    states
        .into_iter()
        .fold((false, 0), |(approved, count), state| {
            (
                approved || state == review_state::APPROVED,
                if state == review_state::COMMENTED {
                    count
                } else {
                    count + 1
                },
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_boundaries() {
        assert_eq!(SizeCategory::from_changes(0), SizeCategory::XS);
        assert_eq!(SizeCategory::from_changes(50), SizeCategory::XS);
        assert_eq!(SizeCategory::from_changes(51), SizeCategory::S);
        assert_eq!(SizeCategory::from_changes(500), SizeCategory::M);
        assert_eq!(SizeCategory::from_changes(1000), SizeCategory::L);
        assert_eq!(SizeCategory::from_changes(1001), SizeCategory::XL);
    }

    #[test]
    fn comments_do_not_count_as_reviews() {
        let (approved, count) = tally_reviews(["COMMENTED", "COMMENTED"]);
        assert!(!approved);
        assert_eq!(count, 0);
    }

    #[test]
    fn changes_requested_counts_but_does_not_approve() {
        let (approved, count) = tally_reviews(["CHANGES_REQUESTED", "COMMENTED", "DISMISSED"]);
        assert!(!approved);
        assert_eq!(count, 2);
    }

    #[test]
    fn single_approval() {
        let (approved, count) = tally_reviews(["COMMENTED", "APPROVED"]);
        assert!(approved);
        assert_eq!(count, 1);
    }

    #[test]
    fn pr_id_display() {
        let id = PrId {
            repo: "api".into(),
            number: 42,
        };
        assert_eq!(id.to_string(), "api#42");
    }
}
