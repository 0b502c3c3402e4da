//! User aggregate and the friend-request mirror it embeds
use std::fmt;

#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd,
)]
pub enum FriendRequestStatus {
    #[n(0)]
    Accepted,
    #[n(1)]
    Pending,
    #[n(2)]
    Denied, // never stored, denial removes both mirrors
    #[n(3)]
    Blocked,
}

/// One side's copy of a friend relationship. The counterparty holds an
/// identical copy; nothing below the negotiators keeps the two in step.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct FriendRequest {
    #[n(0)]
    pub sender_username: String,
    #[n(1)]
    pub receiver_username: String,
    #[n(2)]
    pub status: FriendRequestStatus,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct UserAggregate {
    #[n(0)]
    pub id: String, // bech32 "user_" id
    #[n(1)]
    pub username: String,
    #[n(2)]
    pub inventory: Vec<String>, // owned item ids
    #[n(3)]
    pub friend_requests: Option<Vec<FriendRequest>>, // None until the first request touches this user
    #[n(4)]
    pub trade_requests: Vec<String>, // trade request ids
    #[n(5)]
    pub version: u64,
}

impl FriendRequestStatus {
    pub fn label(&self) -> &'static str {
        match self {
            FriendRequestStatus::Accepted => "Accepted",
            FriendRequestStatus::Pending => "Pending",
            FriendRequestStatus::Denied => "Denied",
            FriendRequestStatus::Blocked => "Blocked",
        }
    }
}

impl fmt::Display for FriendRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FriendRequest {
    pub fn pending(sender_username: &str, receiver_username: &str) -> Self {
        Self {
            sender_username: sender_username.to_string(),
            receiver_username: receiver_username.to_string(),
            status: FriendRequestStatus::Pending,
        }
    }
    pub fn is_from(&self, username: &str) -> bool {
        self.sender_username.eq_ignore_ascii_case(username)
    }
    pub fn is_to(&self, username: &str) -> bool {
        self.receiver_username.eq_ignore_ascii_case(username)
    }
    /// True for an entry between `a` and `b` in either direction.
    pub fn links(&self, a: &str, b: &str) -> bool {
        (self.is_from(a) && self.is_to(b)) || (self.is_from(b) && self.is_to(a))
    }
    /// The username on the other side of this entry from `username`.
    pub fn counterpart(&self, username: &str) -> &str {
        if self.is_to(username) {
            &self.sender_username
        } else {
            &self.receiver_username
        }
    }
}

impl UserAggregate {
    /// A user that has not been persisted yet. The store assigns the id.
    pub fn new(username: &str, inventory: Vec<String>) -> Self {
        Self {
            id: String::new(),
            username: username.to_string(),
            inventory,
            friend_requests: None,
            trade_requests: Vec::new(),
            version: 0,
        }
    }
    pub fn friend_requests(&self) -> &[FriendRequest] {
        self.friend_requests.as_deref().unwrap_or_default()
    }
    /// Mirror entry linking this user with `other`, if any.
    pub fn relationship_with(&self, other: &str) -> Option<&FriendRequest> {
        self.friend_requests()
            .iter()
            .find(|request| request.links(&self.username, other))
    }
    pub fn push_friend_request(&mut self, request: FriendRequest) {
        self.friend_requests.get_or_insert_with(Vec::new).push(request);
    }
    pub fn attach_trade_request(&mut self, request_id: &str) {
        if !self.trade_requests.iter().any(|id| id == request_id) {
            self.trade_requests.push(request_id.to_string());
        }
    }
    /// Returns whether the reference was present.
    pub fn detach_trade_request(&mut self, request_id: &str) -> bool {
        let before = self.trade_requests.len();
        self.trade_requests.retain(|id| id != request_id);
        before != self.trade_requests.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relationship_lookup_is_case_insensitive_in_both_directions() {
        let mut alice = UserAggregate::new("alice", vec![]);
        alice.push_friend_request(FriendRequest::pending("Alice", "bob"));

        assert!(alice.relationship_with("BOB").is_some());
        assert!(alice.relationship_with("carol").is_none());

        let entry = alice.relationship_with("bob").unwrap();
        assert_eq!(entry.counterpart("alice"), "bob");
        assert_eq!(entry.counterpart("bob"), "Alice");
    }

    #[test]
    fn friend_list_starts_uninitialised() {
        let mut user = UserAggregate::new("dora", vec!["i1".into()]);
        assert!(user.friend_requests.is_none());
        assert!(user.friend_requests().is_empty());

        user.push_friend_request(FriendRequest::pending("dora", "eve"));
        assert_eq!(user.friend_requests().len(), 1);
    }

    #[test]
    fn trade_references_are_not_duplicated() {
        let mut user = UserAggregate::new("frank", vec![]);
        user.attach_trade_request("trade_1");
        user.attach_trade_request("trade_1");
        assert_eq!(user.trade_requests, vec!["trade_1".to_string()]);

        assert!(user.detach_trade_request("trade_1"));
        assert!(!user.detach_trade_request("trade_1"));
    }

    #[test]
    fn user_aggregate_survives_cbor() {
        let mut user = UserAggregate::new("gina", vec!["i1".into(), "i2".into()]);
        user.push_friend_request(FriendRequest::pending("gina", "hal"));
        user.attach_trade_request("trade_1");

        let encoding = minicbor::to_vec(&user).unwrap();
        let decoded: UserAggregate = minicbor::decode(&encoding).unwrap();

        assert_eq!(user, decoded);
    }
}
