//! Party identities and role ranges
//!
//! Every participant is addressed by a small integer id. The id space is
//! partitioned so a receiver can attribute traffic to a role without a
//! directory lookup: ordinary clients sit below the authority id, the single
//! health authority owns one well-known id, and replica ids carry a fixed
//! numeric offset so broadcast-internal traffic is provably from a replica.

/// Integer id addressing one party (client, authority, or replica)
pub type PartyId = u32;

/// The single health authority's well-known id
pub const AUTHORITY_ID: PartyId = 500;

/// Replica ids are `REPLICA_ID_OFFSET + replica index`
pub const REPLICA_ID_OFFSET: PartyId = 1000;

/// Role a party id maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Ordinary user submitting and reading its own reports
    Client,
    /// Health authority, may read any user's reports
    Authority,
    /// Server replica participating in broadcast rounds
    Replica,
}

impl Role {
    /// Classify an id by its range
    pub fn of(id: PartyId) -> Role {
        if id >= REPLICA_ID_OFFSET {
            Role::Replica
        } else if id == AUTHORITY_ID {
            Role::Authority
        } else {
            Role::Client
        }
    }
}

/// Id of the replica at `index` in the cluster ordering
pub fn replica_id(index: usize) -> PartyId {
    REPLICA_ID_OFFSET + index as PartyId
}

/// Cluster index of a replica id, `None` for non-replica ids
pub fn replica_index(id: PartyId) -> Option<usize> {
    if id >= REPLICA_ID_OFFSET {
        Some((id - REPLICA_ID_OFFSET) as usize)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ranges() {
        assert_eq!(Role::of(1), Role::Client);
        assert_eq!(Role::of(499), Role::Client);
        assert_eq!(Role::of(AUTHORITY_ID), Role::Authority);
        assert_eq!(Role::of(REPLICA_ID_OFFSET), Role::Replica);
        assert_eq!(Role::of(REPLICA_ID_OFFSET + 3), Role::Replica);
    }

    #[test]
    fn test_replica_index_round_trip() {
        assert_eq!(replica_index(replica_id(2)), Some(2));
        assert_eq!(replica_index(42), None);
    }
}
