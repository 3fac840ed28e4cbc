use serde::{Deserialize, Serialize};

use crate::error::DomainError;

// ── Per-host status alphabet ──────────────────────────────────────────────────

/// Status of one block on one storage node, as recorded in the metadata log.
///
/// The `Display`/`FromStr` pair round-trips the exact on-disk tokens; the
/// historical misspelling `...ENFORCEING` is part of the format and must not
/// be corrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostStatus {
    ConfigInProgress,
    ConfigSuccess,
    ConfigFail,
    AuthEnforcing,
    AuthEnforced,
    AuthEnforceFail,
    AuthClearEnforcing,
    AuthClearEnforced,
    AuthClearEnforceFail,
    CleanupInProgress,
    CleanupSuccess,
    CleanupFail,
    RpInProgress,
    RpSuccess,
    RpFail,
}

impl HostStatus {
    pub fn as_token(&self) -> &'static str {
        match self {
            HostStatus::ConfigInProgress => "CONFIGINPROGRESS",
            HostStatus::ConfigSuccess => "CONFIGSUCCESS",
            HostStatus::ConfigFail => "CONFIGFAIL",
            HostStatus::AuthEnforcing => "AUTHENFORCEING",
            HostStatus::AuthEnforced => "AUTHENFORCED",
            HostStatus::AuthEnforceFail => "AUTHENFORCEFAIL",
            HostStatus::AuthClearEnforcing => "AUTHCLEARENFORCEING",
            HostStatus::AuthClearEnforced => "AUTHCLEARENFORCED",
            HostStatus::AuthClearEnforceFail => "AUTHCLEARENFORCEFAIL",
            HostStatus::CleanupInProgress => "CLEANUPINPROGRESS",
            HostStatus::CleanupSuccess => "CLEANUPSUCCESS",
            HostStatus::CleanupFail => "CLEANUPFAIL",
            HostStatus::RpInProgress => "RPINPROGRESS",
            HostStatus::RpSuccess => "RPSUCCESS",
            HostStatus::RpFail => "RPFAIL",
        }
    }

    /// Whether this status counts the host as an active participant in the
    /// block. Cleaned-up, failed-before-configure and never-touched hosts do
    /// not count; everything between configure and cleanup does.
    pub fn is_exported(&self) -> bool {
        matches!(
            self,
            HostStatus::ConfigSuccess
                | HostStatus::AuthEnforcing
                | HostStatus::AuthEnforced
                | HostStatus::AuthEnforceFail
                | HostStatus::AuthClearEnforcing
                | HostStatus::AuthClearEnforced
                | HostStatus::AuthClearEnforceFail
                | HostStatus::RpInProgress
                | HostStatus::RpSuccess
                | HostStatus::RpFail
        )
    }

    /// Legal successors of this status in a single host's history.
    ///
    /// Re-entering the same in-progress state is allowed (a crashed command
    /// re-run writes its pre-status line again); `CleanupSuccess` can only be
    /// left through an explicit replace, which configures the node afresh.
    pub fn may_precede(&self, next: HostStatus) -> bool {
        use HostStatus::*;
        let allowed: &[HostStatus] = match self {
            ConfigInProgress => &[ConfigSuccess, ConfigFail, ConfigInProgress],
            ConfigSuccess => &[
                AuthEnforced,
                AuthEnforcing,
                AuthClearEnforcing,
                CleanupInProgress,
                RpInProgress,
            ],
            ConfigFail => &[CleanupInProgress],
            AuthEnforcing => &[
                AuthEnforced,
                AuthEnforceFail,
                AuthEnforcing,
                AuthClearEnforcing,
                CleanupInProgress,
            ],
            AuthEnforced => &[AuthClearEnforcing, CleanupInProgress, RpInProgress],
            AuthEnforceFail => &[AuthEnforcing, AuthClearEnforcing, CleanupInProgress],
            AuthClearEnforcing => &[
                AuthClearEnforced,
                AuthClearEnforceFail,
                AuthClearEnforcing,
                AuthEnforcing,
                CleanupInProgress,
            ],
            AuthClearEnforced => &[AuthEnforcing, CleanupInProgress, RpInProgress],
            AuthClearEnforceFail => &[AuthEnforcing, AuthClearEnforcing, CleanupInProgress],
            CleanupInProgress => &[CleanupSuccess, CleanupFail, CleanupInProgress],
            CleanupFail => &[CleanupInProgress],
            CleanupSuccess => &[ConfigInProgress],
            RpInProgress => &[RpSuccess, RpFail, RpInProgress],
            RpSuccess => &[AuthEnforcing, AuthClearEnforcing, CleanupInProgress, RpInProgress],
            RpFail => &[AuthEnforcing, AuthClearEnforcing, CleanupInProgress, RpInProgress],
        };
        allowed.contains(&next)
    }
}

impl std::fmt::Display for HostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_token())
    }
}

impl std::str::FromStr for HostStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONFIGINPROGRESS" => Ok(HostStatus::ConfigInProgress),
            "CONFIGSUCCESS" => Ok(HostStatus::ConfigSuccess),
            "CONFIGFAIL" => Ok(HostStatus::ConfigFail),
            "AUTHENFORCEING" => Ok(HostStatus::AuthEnforcing),
            "AUTHENFORCED" => Ok(HostStatus::AuthEnforced),
            "AUTHENFORCEFAIL" => Ok(HostStatus::AuthEnforceFail),
            "AUTHCLEARENFORCEING" => Ok(HostStatus::AuthClearEnforcing),
            "AUTHCLEARENFORCED" => Ok(HostStatus::AuthClearEnforced),
            "AUTHCLEARENFORCEFAIL" => Ok(HostStatus::AuthClearEnforceFail),
            "CLEANUPINPROGRESS" => Ok(HostStatus::CleanupInProgress),
            "CLEANUPSUCCESS" => Ok(HostStatus::CleanupSuccess),
            "CLEANUPFAIL" => Ok(HostStatus::CleanupFail),
            "RPINPROGRESS" => Ok(HostStatus::RpInProgress),
            "RPSUCCESS" => Ok(HostStatus::RpSuccess),
            "RPFAIL" => Ok(HostStatus::RpFail),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

// ── Entry-level lifecycle ─────────────────────────────────────────────────────

/// Which entry-level key a lifecycle line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Create,
    Delete,
}

impl EntryKind {
    pub fn as_key(&self) -> &'static str {
        match self {
            EntryKind::Create => "ENTRYCREATE",
            EntryKind::Delete => "ENTRYDELETE",
        }
    }
}

/// State of the block entry itself (metadata header + backing file).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryStatus {
    InProgress,
    Success,
    Fail,
}

impl EntryStatus {
    pub fn as_token(&self) -> &'static str {
        match self {
            EntryStatus::InProgress => "INPROGRESS",
            EntryStatus::Success => "SUCCESS",
            EntryStatus::Fail => "FAIL",
        }
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_token())
    }
}

impl std::str::FromStr for EntryStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INPROGRESS" => Ok(EntryStatus::InProgress),
            "SUCCESS" => Ok(EntryStatus::Success),
            "FAIL" => Ok(EntryStatus::Fail),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const ALL: [HostStatus; 15] = [
        HostStatus::ConfigInProgress,
        HostStatus::ConfigSuccess,
        HostStatus::ConfigFail,
        HostStatus::AuthEnforcing,
        HostStatus::AuthEnforced,
        HostStatus::AuthEnforceFail,
        HostStatus::AuthClearEnforcing,
        HostStatus::AuthClearEnforced,
        HostStatus::AuthClearEnforceFail,
        HostStatus::CleanupInProgress,
        HostStatus::CleanupSuccess,
        HostStatus::CleanupFail,
        HostStatus::RpInProgress,
        HostStatus::RpSuccess,
        HostStatus::RpFail,
    ];

    #[test]
    fn tokens_round_trip() {
        for status in ALL {
            let parsed = HostStatus::from_str(status.as_token()).unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn enforceing_spelling_is_preserved() {
        // The wire tokens carry the historical spelling; correcting it would
        // break every already-written metadata file.
        assert_eq!(HostStatus::AuthEnforcing.as_token(), "AUTHENFORCEING");
        assert_eq!(
            HostStatus::AuthClearEnforcing.as_token(),
            "AUTHCLEARENFORCEING"
        );
    }

    #[test]
    fn unknown_token_is_rejected() {
        assert!(HostStatus::from_str("CONFIGURED").is_err());
    }

    #[test]
    fn exported_set() {
        assert!(HostStatus::ConfigSuccess.is_exported());
        assert!(HostStatus::RpFail.is_exported());
        assert!(!HostStatus::ConfigInProgress.is_exported());
        assert!(!HostStatus::ConfigFail.is_exported());
        assert!(!HostStatus::CleanupSuccess.is_exported());
    }

    #[test]
    fn cleanup_success_only_reachable_from_cleanup() {
        for status in ALL {
            if status.may_precede(HostStatus::CleanupSuccess) {
                assert_eq!(status, HostStatus::CleanupInProgress);
            }
        }
    }

    #[test]
    fn create_lifecycle_transitions() {
        assert!(HostStatus::ConfigInProgress.may_precede(HostStatus::ConfigSuccess));
        assert!(HostStatus::ConfigSuccess.may_precede(HostStatus::AuthEnforced));
        assert!(!HostStatus::CleanupSuccess.may_precede(HostStatus::AuthEnforcing));
        // A replaced node is configured afresh after its cleanup.
        assert!(HostStatus::CleanupSuccess.may_precede(HostStatus::ConfigInProgress));
    }
}
