//! Canonical lifecycle statuses
//!
//! Remote control planes report status as free-form strings (`CREATING`,
//! `VALID`, `available`, `modifying`, ...). They are folded into a single
//! `ResourceStatus` so the poller can reason about convergence without
//! knowing which service it is talking to.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a remote object
///
/// Parsing is case-insensitive and accepts the common spellings used by
/// AWS services. Anything unrecognised becomes `Unknown` via [`ResourceStatus::from_remote`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Being provisioned
    #[strum(
        to_string = "pending",
        serialize = "creating",
        serialize = "provisioning",
        serialize = "backing-up"
    )]
    Pending,
    /// Ready for use
    #[strum(
        to_string = "available",
        serialize = "active",
        serialize = "valid",
        serialize = "enabled"
    )]
    Available,
    /// Applying a configuration change
    #[strum(to_string = "updating", serialize = "modifying")]
    Updating,
    /// Being torn down
    #[strum(to_string = "deleting")]
    Deleting,
    /// Gone (some services keep tombstones around for a while)
    #[strum(to_string = "deleted")]
    Deleted,
    /// The remote gave up on the object
    #[strum(
        to_string = "failed",
        serialize = "invalid",
        serialize = "error",
        serialize = "create_failed",
        serialize = "delete_failed"
    )]
    Failed,
    /// Status string not recognised
    #[default]
    #[strum(to_string = "unknown")]
    Unknown,
}

impl ResourceStatus {
    /// Fold a remote status string into a canonical status.
    pub fn from_remote(s: &str) -> Self {
        s.trim().parse().unwrap_or(Self::Unknown)
    }

    /// Position along the lifecycle, used to detect regressions while polling.
    ///
    /// `Available` and `Updating` share a rank since an object legitimately
    /// flips between them. `Unknown` has no rank.
    pub fn progress_rank(self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Available | Self::Updating => Some(1),
            Self::Deleting => Some(2),
            Self::Deleted => Some(3),
            Self::Failed => Some(4),
            Self::Unknown => None,
        }
    }

    /// True when moving from `self` to `next` goes backwards in the lifecycle.
    pub fn is_regression_to(self, next: Self) -> bool {
        match (self.progress_rank(), next.progress_rank()) {
            (Some(prev), Some(next_rank)) => next_rank < prev,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_aws_spellings() {
        assert_eq!(ResourceStatus::from_remote("CREATING"), ResourceStatus::Pending);
        assert_eq!(ResourceStatus::from_remote("VALID"), ResourceStatus::Available);
        assert_eq!(ResourceStatus::from_remote("ACTIVE"), ResourceStatus::Available);
        assert_eq!(ResourceStatus::from_remote("available"), ResourceStatus::Available);
        assert_eq!(ResourceStatus::from_remote("modifying"), ResourceStatus::Updating);
        assert_eq!(ResourceStatus::from_remote("DELETING"), ResourceStatus::Deleting);
        assert_eq!(ResourceStatus::from_remote("INVALID"), ResourceStatus::Failed);
        assert_eq!(ResourceStatus::from_remote("backing-up"), ResourceStatus::Pending);
        assert_eq!(ResourceStatus::from_remote("weird"), ResourceStatus::Unknown);
    }

    #[test]
    fn display_uses_canonical_name() {
        assert_eq!(ResourceStatus::Available.to_string(), "available");
        assert_eq!(ResourceStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn regressions() {
        use ResourceStatus::*;
        assert!(Available.is_regression_to(Pending));
        assert!(Deleting.is_regression_to(Available));
        assert!(!Pending.is_regression_to(Available));
        assert!(!Available.is_regression_to(Updating));
        assert!(!Updating.is_regression_to(Available));
        assert!(!Available.is_regression_to(Unknown));
    }
}
