//! Connection registry: which users are online, and through which sockets.
//!
//! One user may hold many connections (tabs, devices). Every mutation that
//! changes the online set rebroadcasts presence while the registry lock is
//! still held, so snapshots never see a half-applied registration and
//! observers receive presence changes in mutation order.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::chat::model::UserId;
use crate::chat::presence;
use super::{ConnectionHandle, ConnectionId};

/// Outcome of a registry mutation, from the point of view of the affected user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// First connection for the user; presence was broadcast.
    Joined,
    /// User was already online; no broadcast.
    AlreadyOnline,
    /// Handle moved to an already-online user and its previous owner went
    /// offline; presence was broadcast.
    Moved,
    /// Handle was already registered under this user.
    Unchanged,
    /// Last connection closed; presence was broadcast.
    Left,
    /// A connection closed but the user has others; no broadcast.
    StillOnline,
    /// Handle was not registered.
    Unknown,
}

/// Registry state guarded by the registry mutex.
#[derive(Debug, Default)]
pub struct Connections {
    by_user: BTreeMap<UserId, Vec<ConnectionHandle>>,
    owners: HashMap<ConnectionId, UserId>,
}

impl Connections {
    pub fn online_users(&self) -> BTreeSet<UserId> {
        self.by_user.keys().cloned().collect()
    }

    /// Every registered handle across all users.
    pub fn handles(&self) -> impl Iterator<Item = &ConnectionHandle> {
        self.by_user.values().flatten()
    }

    pub fn handles_for(&self, user: &str) -> &[ConnectionHandle] {
        self.by_user.get(user).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Remove a handle from its owner. Returns the owner and whether the
    /// owner went offline as a result.
    fn detach(&mut self, id: ConnectionId) -> Option<(UserId, bool)> {
        let owner = self.owners.remove(&id)?;
        let mut emptied = false;
        if let Some(handles) = self.by_user.get_mut(&owner) {
            handles.retain(|h| h.id() != id);
            emptied = handles.is_empty();
        }
        if emptied {
            self.by_user.remove(&owner);
        }
        Some((owner, emptied))
    }
}

/// Injectable registry shared through `AppState`.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    inner: Mutex<Connections>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // The registry holds no invariant that a panicking pusher could break
    // halfway, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Connections> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add `handle` under `user`. Idempotent for a handle already owned by
    /// `user`; a handle owned by someone else is moved.
    pub fn register(&self, user: &str, handle: ConnectionHandle) -> Membership {
        let mut conns = self.lock();

        if conns.owners.get(&handle.id()).map(String::as_str) == Some(user) {
            return Membership::Unchanged;
        }

        let mut membership_changed = false;
        if let Some((previous_owner, emptied)) = conns.detach(handle.id()) {
            tracing::warn!(
                connection_id = %handle.id(),
                previous_owner = %previous_owner,
                user_id = %user,
                "Connection re-registered under a different user"
            );
            membership_changed |= emptied;
        }

        let joined = !conns.by_user.contains_key(user);
        membership_changed |= joined;

        conns.owners.insert(handle.id(), user.to_string());
        conns
            .by_user
            .entry(user.to_string())
            .or_default()
            .push(handle.clone());

        tracing::debug!(
            user_id = %user,
            connection_id = %handle.id(),
            connections = conns.handles_for(user).len(),
            "Connection registered"
        );

        if membership_changed {
            presence::broadcast_presence(&conns);
        } else {
            // Nobody else needs an update, but the new tab still has to
            // learn who is online.
            presence::send_snapshot(&handle, &conns.online_users(), "");
        }

        if joined {
            Membership::Joined
        } else if membership_changed {
            Membership::Moved
        } else {
            Membership::AlreadyOnline
        }
    }

    /// Remove a handle from whichever user owns it. Unknown ids are ignored;
    /// disconnect races are routine.
    pub fn unregister(&self, id: ConnectionId) -> Membership {
        let mut conns = self.lock();
        let Some((owner, emptied)) = conns.detach(id) else {
            return Membership::Unknown;
        };

        tracing::debug!(
            user_id = %owner,
            connection_id = %id,
            "Connection unregistered"
        );

        if emptied {
            presence::broadcast_presence(&conns);
            Membership::Left
        } else {
            Membership::StillOnline
        }
    }

    /// Live handles for a user; empty if offline.
    pub fn lookup(&self, user: &str) -> Vec<ConnectionHandle> {
        self.lock().handles_for(user).to_vec()
    }

    /// Live handles of both users, resolved under one lock and de-duplicated
    /// by connection id (so `a == b` never yields a handle twice).
    pub fn lookup_pair(&self, a: &str, b: &str) -> Vec<ConnectionHandle> {
        let conns = self.lock();
        let mut seen = BTreeMap::new();
        for handle in conns.handles_for(a).iter().chain(conns.handles_for(b)) {
            seen.entry(handle.id()).or_insert_with(|| handle.clone());
        }
        seen.into_values().collect()
    }

    pub fn online_users(&self) -> BTreeSet<UserId> {
        self.lock().online_users()
    }

    pub fn is_online(&self, user: &str) -> bool {
        self.lock().by_user.contains_key(user)
    }

    pub fn connection_count(&self) -> usize {
        self.lock().owners.len()
    }

    /// Send the current online set to one handle, echoing `request_id`.
    pub fn send_snapshot_to(&self, handle: &ConnectionHandle, request_id: &str) -> bool {
        let conns = self.lock();
        presence::send_snapshot(handle, &conns.online_users(), request_id)
    }
}
