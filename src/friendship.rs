//! Friend request negotiation over mirrored per-user records
//!
//! A relationship lives twice, once in each participant's friend list. Every
//! operation validates both copies before writing, then saves the caller and
//! then the counterpart. If the second save fails the first is already on
//! disk, so the error carries the repair for the counterpart's copy.
use crate::config::NegotiationConfig;
use crate::error::{Inconsistency, NegotiationError, Result, StoreError};
use crate::reconcile::{MirrorAction, Repair};
use crate::store::UserStore;
use crate::user::{FriendRequest, FriendRequestStatus, UserAggregate};
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct FriendshipNegotiator<S> {
    store: Arc<S>,
    config: NegotiationConfig,
}

impl<S: UserStore> FriendshipNegotiator<S> {
    pub fn new(store: Arc<S>, config: NegotiationConfig) -> Self {
        Self { store, config }
    }

    /// Send a friend request from `caller` to the user named `target_username`
    pub fn send_request(
        &self,
        caller: &UserAggregate,
        target_username: &str,
    ) -> Result<UserAggregate> {
        debug!(caller = %caller.username, target = target_username, "send friend request");
        let mut caller = resolve_caller(self.store.as_ref(), caller, self.config)?;

        if caller.username.eq_ignore_ascii_case(target_username) {
            return Err(NegotiationError::SelfTarget);
        }
        let mut target = self.find_by_username(target_username)?;

        // Either copy is enough to refuse a second request for the pair
        if let Some(existing) = target
            .relationship_with(&caller.username)
            .or_else(|| caller.relationship_with(&target.username))
        {
            debug!(status = %existing.status, "friend request already exists");
            return Err(NegotiationError::RequestExists(existing.status));
        }

        let request = FriendRequest::pending(&caller.username, &target.username);
        caller.push_friend_request(request.clone());
        target.push_friend_request(request.clone());

        let saved = self.persist_pair(
            "send_friend_request",
            &caller,
            &target,
            MirrorAction::Upsert(request),
        )?;
        info!(sender = %saved.username, receiver = %target.username, "friend request sent");

        Ok(saved)
    }

    /// Accept a pending request that `friend_username` sent to the caller
    pub fn accept_request(
        &self,
        caller: &UserAggregate,
        friend_username: &str,
    ) -> Result<UserAggregate> {
        self.transition(
            "accept_friend_request",
            caller,
            friend_username,
            FriendRequestStatus::Accepted,
        )
    }

    /// Block the user `friend_username` through the request they sent
    pub fn block_request(
        &self,
        caller: &UserAggregate,
        friend_username: &str,
    ) -> Result<UserAggregate> {
        self.transition(
            "block_friend_request",
            caller,
            friend_username,
            FriendRequestStatus::Blocked,
        )
    }

    /// Deny a request from `friend_username`, removing it from both users.
    ///
    /// The entry's status is not checked; any stored request can be denied.
    pub fn deny_request(
        &self,
        caller: &UserAggregate,
        friend_username: &str,
    ) -> Result<UserAggregate> {
        debug!(caller = %caller.username, friend = friend_username, "deny friend request");
        let mut caller = resolve_caller(self.store.as_ref(), caller, self.config)?;
        let caller_name = caller.username.clone();

        let requests = caller
            .friend_requests
            .as_mut()
            .ok_or(NegotiationError::NotInitialized)?;
        if remove_between(requests, friend_username, &caller_name) == 0 {
            return Err(not_found(friend_username, &caller_name));
        }

        let mut friend = self.find_by_username(friend_username)?;
        let removed = friend
            .friend_requests
            .as_mut()
            .map(|requests| remove_between(requests, friend_username, &caller_name))
            .unwrap_or(0);
        if removed == 0 {
            return Err(not_found(friend_username, &caller_name));
        }

        let saved = self.persist_pair(
            "deny_friend_request",
            &caller,
            &friend,
            MirrorAction::Remove,
        )?;
        info!(caller = %caller_name, friend = %friend.username, "friend request denied");

        Ok(saved)
    }

    /// Usernames of everyone the caller is friends with
    pub fn friends(&self, caller: &UserAggregate) -> Result<Vec<String>> {
        self.counterparts(caller, FriendRequestStatus::Accepted)
    }

    pub fn blocked(&self, caller: &UserAggregate) -> Result<Vec<String>> {
        self.counterparts(caller, FriendRequestStatus::Blocked)
    }

    /// Usernames on the other side of requests still awaiting an answer, sent or received
    pub fn pending(&self, caller: &UserAggregate) -> Result<Vec<String>> {
        self.counterparts(caller, FriendRequestStatus::Pending)
    }

    fn counterparts(
        &self,
        caller: &UserAggregate,
        status: FriendRequestStatus,
    ) -> Result<Vec<String>> {
        let caller = resolve_caller(self.store.as_ref(), caller, self.config)?;
        Ok(caller
            .friend_requests()
            .iter()
            .filter(|entry| entry.status == status)
            .map(|entry| entry.counterpart(&caller.username).to_string())
            .collect())
    }

    // Shared shape of accept and block: same guard and mutation on each copy.
    fn transition(
        &self,
        operation: &'static str,
        caller: &UserAggregate,
        friend_username: &str,
        status: FriendRequestStatus,
    ) -> Result<UserAggregate> {
        debug!(operation, caller = %caller.username, friend = friend_username, "friend request transition");
        let mut caller = resolve_caller(self.store.as_ref(), caller, self.config)?;
        let caller_name = caller.username.clone();

        let requests = caller
            .friend_requests
            .as_mut()
            .ok_or(NegotiationError::NotInitialized)?;
        set_status(requests, friend_username, &caller_name, status)?;

        // the counterpart is always read fresh
        let mut friend = self.find_by_username(friend_username)?;
        let mirrored = match friend.friend_requests.as_mut() {
            Some(requests) => set_status(requests, friend_username, &caller_name, status)?,
            None => return Err(not_found(friend_username, &caller_name)),
        };

        let saved = self.persist_pair(operation, &caller, &friend, MirrorAction::Upsert(mirrored))?;
        info!(operation, caller = %caller_name, friend = %friend.username, %status, "friend request updated");

        Ok(saved)
    }

    fn find_by_username(&self, username: &str) -> Result<UserAggregate> {
        self.store
            .find_user_by_username(username)?
            .ok_or_else(|| NegotiationError::NoSuchUser(username.to_string()))
    }

    // Caller first, counterpart second. Only the second failure is fatal.
    fn persist_pair(
        &self,
        operation: &'static str,
        caller: &UserAggregate,
        counterpart: &UserAggregate,
        action: MirrorAction,
    ) -> Result<UserAggregate> {
        let saved = self.store.save_user(caller)?;

        if let Err(source) = self.store.save_user(counterpart) {
            let inconsistency = Inconsistency {
                operation,
                committed: format!("friend list of {}", caller.username),
                repair: Repair::mirror(&counterpart.username, &caller.username, action),
                source,
            };
            error!(
                operation,
                committed = %inconsistency.committed,
                repair = ?inconsistency.repair,
                error = %inconsistency.source,
                "friend request mirrors diverged"
            );
            return Err(NegotiationError::FatalInconsistency(Box::new(inconsistency)));
        }

        Ok(saved)
    }
}

/// The caller's aggregate as the guards should see it.
///
/// Without `reload_caller` the supplied copy must still match the stored
/// version, so a stale session copy is refused before any guard or write.
pub(crate) fn resolve_caller<S: UserStore>(
    store: &S,
    caller: &UserAggregate,
    config: NegotiationConfig,
) -> Result<UserAggregate> {
    let stored = store
        .find_user(&caller.id)?
        .ok_or_else(|| NegotiationError::NoSuchUser(caller.username.clone()))?;

    if !config.reload_caller && stored.version != caller.version {
        debug!(caller = %caller.id, supplied = caller.version, stored = stored.version, "stale caller");
        return Err(StoreError::VersionConflict {
            record: "user",
            id: caller.id.clone(),
            expected: caller.version,
        }
        .into());
    }

    Ok(stored)
}

fn set_status(
    requests: &mut [FriendRequest],
    sender: &str,
    receiver: &str,
    status: FriendRequestStatus,
) -> Result<FriendRequest> {
    let entry = requests
        .iter_mut()
        .find(|entry| entry.is_from(sender) && entry.is_to(receiver))
        .ok_or_else(|| not_found(sender, receiver))?;

    if entry.status == status {
        return Err(NegotiationError::RequestExists(status));
    }
    entry.status = status;

    Ok(entry.clone())
}

fn remove_between(requests: &mut Vec<FriendRequest>, sender: &str, receiver: &str) -> usize {
    let before = requests.len();
    requests.retain(|entry| !(entry.is_from(sender) && entry.is_to(receiver)));
    before - requests.len()
}

fn not_found(sender: &str, receiver: &str) -> NegotiationError {
    NegotiationError::RequestNotFound(format!("no friend request from {sender} to {receiver}"))
}
