use serde::{Deserialize, Serialize};

use crate::error::DomainError;

// ── Identifiers ──────────────────────────────────────────────────────────────

/// The 128-bit stable identifier of a block, embedded in its IQN and used as
/// the backing file name. Rendered in the canonical hyphenated uuid form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Gbid(pub String);

impl Gbid {
    pub fn generate() -> Self {
        Gbid(uuid::Uuid::new_v4().to_string())
    }

    pub fn parse(s: impl Into<String>) -> Result<Self, DomainError> {
        let s = s.into();
        if uuid::Uuid::parse_str(&s).is_err() {
            return Err(DomainError::InvalidGbid(s));
        }
        Ok(Gbid(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Gbid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generate a fresh 128-bit CHAP secret. Same shape as a gbid; the two are
/// never interchangeable, only equally random.
pub fn generate_password() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Reject names that cannot be a file inside the volume metadata directory.
pub fn validate_block_name(name: &str) -> Result<(), DomainError> {
    if name.is_empty()
        || name.len() > 255
        || name == "."
        || name == ".."
        || name == "meta.lock"
        || name.contains('/')
    {
        return Err(DomainError::InvalidBlockName(name.to_string()));
    }
    Ok(())
}

pub fn validate_volume_name(name: &str) -> Result<(), DomainError> {
    if name.is_empty() || name.len() > 255 || name.contains('/') || name.starts_with('.') {
        return Err(DomainError::InvalidVolumeName(name.to_string()));
    }
    Ok(())
}

// ── ServerList ────────────────────────────────────────────────────────────────

/// An ordered, duplicate-free list of peer addresses, parsed from the
/// comma-separated `block_hosts` request field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerList(Vec<String>);

impl ServerList {
    pub fn parse(csv: &str) -> Result<Self, DomainError> {
        if csv.trim().is_empty() {
            return Err(DomainError::EmptyServerList);
        }
        let mut hosts: Vec<String> = Vec::new();
        for part in csv.split(',') {
            let host = part.trim();
            if host.is_empty() {
                return Err(DomainError::EmptyHost);
            }
            if hosts.iter().any(|h| h == host) {
                return Err(DomainError::DuplicateHost(host.to_string()));
            }
            hosts.push(host.to_string());
        }
        Ok(ServerList(hosts))
    }

    pub fn from_hosts(hosts: Vec<String>) -> Self {
        ServerList(hosts)
    }

    pub fn hosts(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.0.iter().any(|h| h == addr)
    }
}

impl std::fmt::Display for ServerList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}

// ── Capabilities ──────────────────────────────────────────────────────────────

/// One feature flag reported by a peer's `version` procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub enabled: bool,
}

impl Capability {
    pub fn on(name: &str) -> Self {
        Capability { name: name.to_string(), enabled: true }
    }
}

/// Capability set assumed for a peer whose daemon predates the `version`
/// procedure. Substituted verbatim on "procedure unavailable"; kept as the
/// single source of truth so the fallback cannot drift from the lookup table.
pub const LEGACY_CAPS: [&str; 9] = [
    "create",
    "create_ha",
    "create_prealloc",
    "create_auth",
    "delete",
    "delete_force",
    "modify",
    "modify_auth",
    "json",
];

/// Every capability the current daemon implements, all enabled. This is what
/// our own `version` procedure reports.
pub fn self_capabilities() -> Vec<Capability> {
    let mut caps: Vec<Capability> = LEGACY_CAPS.iter().map(|c| Capability::on(c)).collect();
    caps.push(Capability::on("replace"));
    caps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_list_preserves_order() {
        let list = ServerList::parse("h3,h1,h2").unwrap();
        assert_eq!(list.hosts(), ["h3", "h1", "h2"]);
    }

    #[test]
    fn server_list_rejects_duplicates() {
        assert!(matches!(
            ServerList::parse("h1,h2,h1"),
            Err(DomainError::DuplicateHost(_))
        ));
    }

    #[test]
    fn server_list_rejects_empty_entries() {
        assert!(ServerList::parse("h1,,h2").is_err());
        assert!(ServerList::parse("").is_err());
    }

    #[test]
    fn server_list_trims_whitespace() {
        let list = ServerList::parse(" h1 , h2 ").unwrap();
        assert_eq!(list.hosts(), ["h1", "h2"]);
    }

    #[test]
    fn gbid_round_trips() {
        let gbid = Gbid::generate();
        assert_eq!(Gbid::parse(gbid.as_str()).unwrap(), gbid);
        assert!(Gbid::parse("not-a-uuid").is_err());
    }

    #[test]
    fn block_name_validation() {
        assert!(validate_block_name("blk0").is_ok());
        assert!(validate_block_name("meta.lock").is_err());
        assert!(validate_block_name("a/b").is_err());
        assert!(validate_block_name("").is_err());
    }

    #[test]
    fn self_caps_cover_legacy_set() {
        let caps = self_capabilities();
        for legacy in LEGACY_CAPS {
            assert!(caps.iter().any(|c| c.name == legacy && c.enabled));
        }
        assert!(caps.iter().any(|c| c.name == "replace"));
    }
}
