//! Parsed form of the `CLUSTER NODES` table.
//!
//! The table is newline separated with fields separated by a single space.
//! Rows may carry any number of fields; missing columns read as empty.
//!
//! Columns used by the operator:
//!
//! | Index | Content |
//! |-------|---------|
//! | 0 | node id |
//! | 1 | `ip:port@cport[,hostname]` |
//! | 2 | flags (`myself,master`, `slave`, `master,fail`, ...) |
//! | 7 | link state (`connected` / `disconnected`) |

use thiserror::Error;
use tracing::debug;

use crate::crd::NodeRole;

const ADDRESS_COLUMN: usize = 1;
const FLAGS_COLUMN: usize = 2;
const LINK_STATE_COLUMN: usize = 7;

/// Errors that can occur when parsing a table row.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("row has no node id: {0:?}")]
    MissingNodeId(String),
}

/// One row of the `CLUSTER NODES` table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TopologyRecord {
    pub node_id: String,
    pub address: String,
    pub role_flags: String,
    pub link_state: String,
    /// Every field of the row, in order.
    pub fields: Vec<String>,
}

impl TopologyRecord {
    /// Parse a single row. Short rows are accepted; absent columns are empty.
    pub fn parse_line(line: &str) -> Result<Self, ParseError> {
        let fields: Vec<String> = line.split(' ').map(str::to_string).collect();
        let column = |i: usize| fields.get(i).cloned().unwrap_or_default();

        let node_id = column(0);
        if node_id.is_empty() {
            return Err(ParseError::MissingNodeId(line.to_string()));
        }

        Ok(Self {
            node_id,
            address: column(ADDRESS_COLUMN),
            role_flags: column(FLAGS_COLUMN),
            link_state: column(LINK_STATE_COLUMN),
            fields,
        })
    }

    pub fn has_role(&self, role: NodeRole) -> bool {
        self.role_flags.contains(role.flag_token())
    }

    /// Flagged `fail` (or `fail?`) or reported with a disconnected link.
    pub fn is_failed(&self) -> bool {
        self.role_flags.contains("fail") || self.link_state.contains("disconnect")
    }
}

/// The membership table as seen by one node at one instant.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterTopologySnapshot {
    records: Vec<TopologyRecord>,
}

impl ClusterTopologySnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse raw `CLUSTER NODES` output.
    ///
    /// Blank lines are ignored. A row that cannot be parsed is skipped and the
    /// remaining rows are still read.
    pub fn parse(raw: &str) -> Self {
        let records = raw
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match TopologyRecord::parse_line(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    debug!(error = %e, "Skipping unparseable cluster nodes row");
                    None
                }
            })
            .collect();
        Self { records }
    }

    pub fn records(&self) -> &[TopologyRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn total_count(&self) -> usize {
        self.records.len()
    }

    /// Rows carrying the role's flag token. `None` counts every row.
    pub fn role_count(&self, role: Option<NodeRole>) -> usize {
        match role {
            Some(role) => self.records.iter().filter(|r| r.has_role(role)).count(),
            None => self.total_count(),
        }
    }

    /// Substring match against the address column, so a bare IP matches
    /// `ip:port@cport` as well. A bare IP also matches any longer IP it
    /// prefixes; use [`Self::contains_host`] to test membership of a node.
    pub fn contains_address(&self, address: &str) -> bool {
        self.records.iter().any(|r| r.address.contains(address))
    }

    /// Whether a row lists `host` followed by its port.
    ///
    /// A bare IP needle also matches longer addresses sharing its prefix
    /// (`10.0.1.1` inside `10.0.1.12:6379`). Requiring the port separator
    /// after the host, bracketed or not for IPv6, rules that out while still
    /// ignoring the port itself.
    pub fn contains_host(&self, host: &str) -> bool {
        let plain = format!("{host}:");
        let bracketed = format!("[{host}]:");
        self.records
            .iter()
            .any(|r| r.address.contains(&plain) || r.address.contains(&bracketed))
    }

    pub fn failed_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_failed()).count()
    }
}
