//! Repair of records left divergent by a half-applied two-write operation
//!
//! Negotiators never retry a failed secondary write. They report a
//! [`Repair`] inside `NegotiationError::FatalInconsistency` and log it; an
//! operator or a background job replays it through [`Reconciler::apply`].
//! Applying the same repair twice leaves the records as applying it once.
use crate::store::UserStore;
use crate::error::StoreError;
use crate::user::{FriendRequest, FriendRequestStatus, UserAggregate};
use crate::utils::relationship_key;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repair {
    /// Bring `username`'s copy of a friend relationship in line with the other side.
    Mirror {
        relationship: String,
        username: String,
        counterpart: String,
        action: MirrorAction,
    },
    /// Make the users' trade-request reference lists agree with the request store.
    TradeReferences {
        request_id: String,
        user_ids: Vec<String>,
        action: ReferenceAction,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorAction {
    Upsert(FriendRequest),
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceAction {
    Attach,
    Detach,
}

/// Result of comparing both copies of one friend relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorAudit {
    Consistent(Option<FriendRequestStatus>),
    /// Only one side holds an entry; `username` is the side without it.
    Missing { username: String },
    StatusMismatch {
        left: FriendRequestStatus,
        right: FriendRequestStatus,
    },
}

impl Repair {
    pub fn mirror(username: &str, counterpart: &str, action: MirrorAction) -> Self {
        Repair::Mirror {
            relationship: relationship_key(username, counterpart),
            username: username.to_string(),
            counterpart: counterpart.to_string(),
            action,
        }
    }
}

pub struct Reconciler<S> {
    store: Arc<S>,
}

impl<S: UserStore> Reconciler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn apply(&self, repair: &Repair) -> Result<(), StoreError> {
        match repair {
            Repair::Mirror {
                relationship,
                username,
                counterpart,
                action,
            } => {
                let Some(mut user) = self.store.find_user_by_username(username)? else {
                    warn!(%relationship, %username, "mirror owner no longer exists, nothing to repair");
                    return Ok(());
                };
                if apply_mirror(&mut user, counterpart, action) {
                    self.store.save_user(&user)?;
                    info!(%relationship, %username, "repaired friend request mirror");
                }
                Ok(())
            }
            Repair::TradeReferences {
                request_id,
                user_ids,
                action,
            } => {
                let mut changed = Vec::new();
                for id in user_ids {
                    let Some(mut user) = self.store.find_user(id)? else {
                        continue;
                    };
                    let differs = match action {
                        ReferenceAction::Attach => {
                            let missing = !user.trade_requests.contains(request_id);
                            user.attach_trade_request(request_id);
                            missing
                        }
                        ReferenceAction::Detach => user.detach_trade_request(request_id),
                    };
                    if differs {
                        changed.push(user);
                    }
                }
                if !changed.is_empty() {
                    self.store.save_users(&changed)?;
                    info!(%request_id, users = changed.len(), ?action, "repaired trade request references");
                }
                Ok(())
            }
        }
    }

    /// Compares both users' copies of their relationship.
    pub fn audit_friendship(&self, a: &str, b: &str) -> Result<MirrorAudit, StoreError> {
        let left = self
            .store
            .find_user_by_username(a)?
            .and_then(|user| user.relationship_with(b).map(|entry| entry.status));
        let right = self
            .store
            .find_user_by_username(b)?
            .and_then(|user| user.relationship_with(a).map(|entry| entry.status));

        Ok(match (left, right) {
            (None, None) => MirrorAudit::Consistent(None),
            (Some(left), Some(right)) if left == right => MirrorAudit::Consistent(Some(left)),
            (Some(left), Some(right)) => MirrorAudit::StatusMismatch { left, right },
            (Some(_), None) => MirrorAudit::Missing {
                username: b.to_string(),
            },
            (None, Some(_)) => MirrorAudit::Missing {
                username: a.to_string(),
            },
        })
    }
}

// Returns whether the user's list changed.
fn apply_mirror(user: &mut UserAggregate, counterpart: &str, action: &MirrorAction) -> bool {
    let username = user.username.clone();
    match action {
        MirrorAction::Upsert(wanted) => {
            let requests = user.friend_requests.get_or_insert_with(Vec::new);
            match requests
                .iter_mut()
                .find(|entry| entry.links(&username, counterpart))
            {
                Some(entry) if entry == wanted => false,
                Some(entry) => {
                    *entry = wanted.clone();
                    true
                }
                None => {
                    requests.push(wanted.clone());
                    true
                }
            }
        }
        MirrorAction::Remove => match user.friend_requests.as_mut() {
            Some(requests) => {
                let before = requests.len();
                requests.retain(|entry| !entry.links(&username, counterpart));
                before != requests.len()
            }
            None => false,
        },
    }
}
