use std::str::FromStr;

use blockplane_domain::{EntryStatus, HostStatus};

use crate::error::MetaError;

// ── MetaInfo ──────────────────────────────────────────────────────────────────

/// One host's current status within a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry {
    pub addr: String,
    pub status: HostStatus,
}

/// The authoritative per-block record, projected from the append-only
/// metadata log. The log itself keeps the full history; this struct keeps
/// the last-write-wins view the orchestrators operate on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaInfo {
    pub volume: String,
    pub gbid: String,
    pub size: u64,
    pub mpath: u32,
    /// Empty string when auth is off.
    pub passwd: String,
    pub entry_create: Option<EntryStatus>,
    pub entry_delete: Option<EntryStatus>,
    /// Hosts in first-appearance order, each carrying its latest status.
    pub hosts: Vec<HostEntry>,
}

impl MetaInfo {
    /// Parse the raw log text of one block file.
    ///
    /// Unknown `KEY: VALUE` lines are skipped so newer daemons can extend the
    /// format; a line without a separator, a malformed number, or a missing
    /// GBID/HA header makes the record corrupt.
    pub fn parse(block: &str, text: &str) -> Result<MetaInfo, MetaError> {
        let corrupt = |reason: &str| MetaError::Corrupt {
            block: block.to_string(),
            reason: reason.to_string(),
        };

        let mut volume = String::new();
        let mut gbid: Option<String> = None;
        let mut size: u64 = 0;
        let mut mpath: Option<u32> = None;
        let mut passwd = String::new();
        let mut entry_create = None;
        let mut entry_delete = None;
        let mut hosts: Vec<HostEntry> = Vec::new();

        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            // Split on the last colon: host addresses may carry a port
            // (`10.0.0.1:24177: CONFIGSUCCESS`), values never contain one.
            let Some((key, value)) = line.rsplit_once(':') else {
                return Err(corrupt(&format!("line without separator: {line:?}")));
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "VOLUME" => volume = value.to_string(),
                "GBID" => gbid = Some(value.to_string()),
                "SIZE" => {
                    size = value
                        .parse()
                        .map_err(|_| corrupt(&format!("bad SIZE value: {value:?}")))?;
                }
                "HA" => {
                    mpath = Some(
                        value
                            .parse()
                            .map_err(|_| corrupt(&format!("bad HA value: {value:?}")))?,
                    );
                }
                "PASSWORD" => passwd = value.to_string(),
                "ENTRYCREATE" => {
                    entry_create = Some(
                        EntryStatus::from_str(value)
                            .map_err(|_| corrupt(&format!("bad ENTRYCREATE value: {value:?}")))?,
                    );
                }
                "ENTRYDELETE" => {
                    entry_delete = Some(
                        EntryStatus::from_str(value)
                            .map_err(|_| corrupt(&format!("bad ENTRYDELETE value: {value:?}")))?,
                    );
                }
                addr => {
                    // A host transition line, or an unknown header we skip.
                    let Ok(status) = HostStatus::from_str(value) else {
                        continue;
                    };
                    match hosts.iter_mut().find(|h| h.addr == addr) {
                        Some(entry) => entry.status = status,
                        None => hosts.push(HostEntry { addr: addr.to_string(), status }),
                    }
                }
            }
        }

        let gbid = gbid.ok_or_else(|| corrupt("missing GBID header"))?;
        let mpath = mpath.ok_or_else(|| corrupt("missing HA header"))?;

        Ok(MetaInfo {
            volume,
            gbid,
            size,
            mpath,
            passwd,
            entry_create,
            entry_delete,
            hosts,
        })
    }

    pub fn nhosts(&self) -> usize {
        self.hosts.len()
    }

    pub fn status_of(&self, addr: &str) -> Option<HostStatus> {
        self.hosts.iter().find(|h| h.addr == addr).map(|h| h.status)
    }

    /// Hosts currently participating in the block, in recorded order.
    pub fn exported_hosts(&self) -> Vec<&str> {
        self.hosts
            .iter()
            .filter(|h| h.status.is_exported())
            .map(|h| h.addr.as_str())
            .collect()
    }

    pub fn count_with(&self, pred: impl Fn(HostStatus) -> bool) -> usize {
        self.hosts.iter().filter(|h| pred(h.status)).count()
    }
}

// ── Status line formatting ────────────────────────────────────────────────────

pub fn host_line(addr: &str, status: HostStatus) -> String {
    format!("{}: {}", addr, status.as_token())
}

pub fn entry_line(kind: blockplane_domain::EntryKind, status: EntryStatus) -> String {
    format!("{}: {}", kind.as_key(), status.as_token())
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockplane_domain::EntryKind;

    const SAMPLE: &str = "\
VOLUME: v1
GBID: 5f4dcc3b-aa12-4b1e-9a2f-000000000001
HA: 2
ENTRYCREATE: INPROGRESS
SIZE: 1073741824
ENTRYCREATE: SUCCESS
PASSWORD: 5f4dcc3b-aa12-4b1e-9a2f-000000000002
h1: CONFIGINPROGRESS
h2: CONFIGINPROGRESS
h1: CONFIGSUCCESS
h2: CONFIGFAIL
h1: AUTHENFORCED
";

    #[test]
    fn parses_headers() {
        let info = MetaInfo::parse("b1", SAMPLE).unwrap();
        assert_eq!(info.volume, "v1");
        assert_eq!(info.mpath, 2);
        assert_eq!(info.size, 1_073_741_824);
        assert_eq!(info.entry_create, Some(EntryStatus::Success));
        assert_eq!(info.entry_delete, None);
        assert!(!info.passwd.is_empty());
    }

    #[test]
    fn last_write_wins_per_host() {
        let info = MetaInfo::parse("b1", SAMPLE).unwrap();
        assert_eq!(info.status_of("h1"), Some(HostStatus::AuthEnforced));
        assert_eq!(info.status_of("h2"), Some(HostStatus::ConfigFail));
        // Projection keeps one entry per host, in first-appearance order.
        assert_eq!(info.nhosts(), 2);
        assert_eq!(info.hosts[0].addr, "h1");
    }

    #[test]
    fn exported_projection_excludes_failed_config() {
        let info = MetaInfo::parse("b1", SAMPLE).unwrap();
        assert_eq!(info.exported_hosts(), vec!["h1"]);
    }

    #[test]
    fn host_addresses_may_carry_a_port() {
        let text = "\
VOLUME: v1
GBID: 5f4dcc3b-aa12-4b1e-9a2f-000000000001
HA: 1
10.0.0.1:24177: CONFIGINPROGRESS
10.0.0.1:24177: CONFIGSUCCESS
";
        let info = MetaInfo::parse("b1", text).unwrap();
        assert_eq!(
            info.status_of("10.0.0.1:24177"),
            Some(HostStatus::ConfigSuccess)
        );
    }

    #[test]
    fn unknown_keys_are_tolerated() {
        let text = format!("{SAMPLE}SOMEFUTUREKEY: whatever\n");
        let info = MetaInfo::parse("b1", &text).unwrap();
        assert_eq!(info.nhosts(), 2);
    }

    #[test]
    fn password_can_be_cleared() {
        let text = format!("{SAMPLE}PASSWORD: \n");
        let info = MetaInfo::parse("b1", &text).unwrap();
        assert_eq!(info.passwd, "");
    }

    #[test]
    fn missing_ha_is_corrupt() {
        let text = "VOLUME: v1\nGBID: 5f4dcc3b-aa12-4b1e-9a2f-000000000001\n";
        assert!(matches!(
            MetaInfo::parse("b1", text),
            Err(MetaError::Corrupt { .. })
        ));
    }

    #[test]
    fn separator_less_line_is_corrupt() {
        let text = format!("{SAMPLE}garbage-without-colon\n");
        assert!(MetaInfo::parse("b1", &text).is_err());
    }

    #[test]
    fn line_helpers_format_the_wire_tokens() {
        assert_eq!(
            host_line("h1", HostStatus::AuthEnforcing),
            "h1: AUTHENFORCEING"
        );
        assert_eq!(
            entry_line(EntryKind::Delete, EntryStatus::InProgress),
            "ENTRYDELETE: INPROGRESS"
        );
    }
}
