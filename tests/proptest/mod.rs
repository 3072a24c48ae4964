// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for redis-cluster-operator.
//!
//! Uses proptest to generate `CLUSTER NODES` tables and verify the counting
//! and decision invariants hold for any of them.

use proptest::prelude::*;

use redis_cluster_operator::client::ClusterTopologySnapshot;
use redis_cluster_operator::controller::topology::{TopologyAction, decide};
use redis_cluster_operator::crd::NodeRole;

/// Flags seen in real tables, healthy and failed.
fn any_flags() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("myself,master"),
        Just("master"),
        Just("slave"),
        Just("myself,slave"),
        Just("master,fail"),
        Just("master,fail?"),
        Just("slave,fail"),
        Just("handshake"),
        Just("noaddr"),
    ]
}

fn any_link() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("connected"), Just("disconnected")]
}

/// A full-width row, healthy or not.
fn any_row() -> impl Strategy<Value = String> {
    ("[a-f0-9]{8}", 0u8..=255, any_flags(), any_link()).prop_map(|(id, octet, flags, link)| {
        format!("{id} 10.0.0.{octet}:6379@16379 {flags} - 0 0 1 {link}")
    })
}

/// A row that is neither flagged failed nor disconnected.
fn healthy_row() -> impl Strategy<Value = String> {
    (
        "[a-f0-9]{8}",
        0u8..=255,
        prop_oneof![Just("master"), Just("slave"), Just("myself,master")],
    )
        .prop_map(|(id, octet, flags)| {
            format!("{id} 10.0.1.{octet}:6379@16379 {flags} - 0 0 1 connected")
        })
}

/// A row that counts as failed.
fn failed_row() -> impl Strategy<Value = String> {
    (
        "[a-f0-9]{8}",
        prop_oneof![
            Just(("master,fail", "connected")),
            Just(("slave,fail?", "connected")),
            Just(("master", "disconnected")),
        ],
    )
        .prop_map(|(id, (flags, link))| {
            format!("{id} 10.0.2.1:6379@16379 {flags} - 0 0 1 {link}")
        })
}

/// Any row, possibly truncated to a random number of fields.
fn ragged_row() -> impl Strategy<Value = String> {
    (any_row(), 1usize..=9).prop_map(|(row, keep)| {
        row.split(' ').take(keep).collect::<Vec<_>>().join(" ")
    })
}

proptest! {
    #[test]
    fn role_counts_never_exceed_total(rows in prop::collection::vec(ragged_row(), 0..32)) {
        let snapshot = ClusterTopologySnapshot::parse(&rows.join("\n"));
        let leaders = snapshot.role_count(Some(NodeRole::Leader));
        let followers = snapshot.role_count(Some(NodeRole::Follower));
        prop_assert!(leaders + followers <= snapshot.total_count());
        prop_assert_eq!(snapshot.role_count(None), snapshot.total_count());
        prop_assert!(snapshot.failed_count() <= snapshot.total_count());
    }

    #[test]
    fn every_nonblank_row_is_kept(rows in prop::collection::vec(ragged_row(), 0..32)) {
        let snapshot = ClusterTopologySnapshot::parse(&rows.join("\n"));
        prop_assert_eq!(snapshot.total_count(), rows.len());
    }

    #[test]
    fn healthy_tables_have_no_failures(rows in prop::collection::vec(healthy_row(), 0..32)) {
        let snapshot = ClusterTopologySnapshot::parse(&rows.join("\n"));
        prop_assert_eq!(snapshot.failed_count(), 0);
    }

    #[test]
    fn failed_count_grows_with_failed_rows(
        base in prop::collection::vec(any_row(), 0..16),
        extra in prop::collection::vec(failed_row(), 1..8),
    ) {
        let before = ClusterTopologySnapshot::parse(&base.join("\n")).failed_count();
        let mut rows = base.clone();
        rows.extend(extra.iter().cloned());
        let after = ClusterTopologySnapshot::parse(&rows.join("\n")).failed_count();
        prop_assert_eq!(after, before + extra.len());
    }

    #[test]
    fn zero_leaders_never_acts(
        followers in 0u32..10,
        rows in prop::collection::vec(any_row(), 0..16),
    ) {
        let snapshot = ClusterTopologySnapshot::parse(&rows.join("\n"));
        prop_assert_eq!(decide(0, followers, &snapshot), TopologyAction::None);
    }

    #[test]
    fn failover_only_when_counts_match(
        leaders in 1u32..8,
        followers in 0u32..8,
        rows in prop::collection::vec(any_row(), 0..20),
    ) {
        let snapshot = ClusterTopologySnapshot::parse(&rows.join("\n"));
        if decide(leaders, followers, &snapshot) == TopologyAction::Failover {
            prop_assert_eq!(snapshot.total_count(), (leaders + followers) as usize);
            prop_assert!(snapshot.failed_count() > 0);
        }
    }

    #[test]
    fn empty_table_always_bootstraps(leaders in 1u32..16, followers in 0u32..16) {
        let snapshot = ClusterTopologySnapshot::empty();
        prop_assert_eq!(decide(leaders, followers, &snapshot), TopologyAction::Bootstrap);
    }
}
