//! Uniform `{code, data, message}` responses for the transport layer
//!
//! Codes are stable integers shared with clients. The text for each code
//! comes from a [`StatusCatalog`]; [`StaticCatalog`] holds the built-in set.
use crate::error::{NegotiationError, StatusMismatch};
use crate::user::FriendRequestStatus;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{error, warn};

pub const RETRIEVE_FRIENDS_SUCCESS: u16 = 160;
pub const RETRIEVE_FRIENDS_FAIL_NONE: u16 = 161;
pub const SEND_FRIEND_REQ_SUCCESS: u16 = 170;
pub const SEND_FRIEND_REQ_FAIL_NO_USER: u16 = 171;
pub const SEND_FRIEND_REQ_FAIL_FRIEND_EXISTS: u16 = 172;
pub const SEND_FRIEND_REQ_FAIL_BLOCKED: u16 = 173;
pub const SEND_FRIEND_REQ_FAIL_PENDING: u16 = 174;
pub const RESPONSE_FRIEND_REQ_SUCCESS: u16 = 176;
pub const RESPONSE_FRIEND_REQ_FAIL_NONE: u16 = 177;
pub const RESPONSE_FRIEND_REQ_FAIL_DUPLICATE: u16 = 178;
pub const RESPONSE_FRIEND_REQ_FAIL_INVALID: u16 = 179;
pub const COUNTER_TRADE_REQ_SUCCESS: u16 = 289;
pub const SEND_TRADE_REQ_SUCCESS: u16 = 290;
pub const SEND_TRADE_REQ_FAIL_NO_USER: u16 = 291;
pub const SEND_TRADE_REQ_FAIL_INVALID_ITEMS: u16 = 292;
pub const SEND_TRADE_REQ_FAIL_TRADE_METHOD: u16 = 293;
pub const SEND_TRADE_REQ_FAIL_NO_ITEMS: u16 = 294;
pub const SEND_TRADE_REQ_FAIL_SAME_REQUEST: u16 = 295;
pub const RESP_TRADE_REQ_SUCCESS: u16 = 296;
pub const RESP_TRADE_REQ_FAILED_WRONG_OWNER: u16 = 297;
pub const RESP_TRADE_REQ_FAILED_INVALID_STATUS: u16 = 298;
pub const TRADE_REQ_NON_EXISTENT: u16 = 299;
pub const TRADE_REQ_NOT_PENDING: u16 = 302;
pub const CANCEL_TRADE_REQ_SUCCESS: u16 = 305;
pub const CANCEL_TRADE_REQ_FAILED_INVALID_USER: u16 = 306;
pub const CANCEL_TRADE_REQ_FAILED_INVALID_STATUS: u16 = 307;
pub const RESP_TRADE_REQ_FAILED_USER_NOT_TARGET: u16 = 308;
pub const CLEAR_TRADE_REQ_SUCCESS: u16 = 310;
pub const CLEAR_TRADE_REQ_FAILED_INVALID_USER: u16 = 311;
pub const CLEAR_TRADE_REQ_FAILED_INVALID_STATUS: u16 = 312;
pub const MARK_TRADE_REQ_READ_SUCCESS: u16 = 313;
pub const MARK_TRADE_REQ_FAILED_INVALID_USER: u16 = 314;
pub const MARK_TRADE_REQ_FAILED_INVALID_STATUS: u16 = 315;
pub const MARK_TRADE_REQ_FAILED_ALREADY_MARKED: u16 = 316;
pub const GET_REQUEST_SUCCESS: u16 = 800;
pub const GET_REQUEST_FAILED: u16 = 801;
pub const CONCURRENT_MODIFICATION: u16 = 997;
pub const DATABASE_ERROR: u16 = 998;
pub const UNKNOWN_SERVER_ERROR: u16 = 999;

/// The negotiator operation a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    RetrieveFriends,
    SendFriendRequest,
    AcceptFriendRequest,
    DenyFriendRequest,
    BlockFriendRequest,
    GetTradeRequest,
    SendTradeRequest,
    RespondTradeRequest,
    CounterTradeRequest,
    MarkTradeReceived,
    CancelTradeRequest,
    ClearTradeRequest,
}

pub trait StatusCatalog {
    fn message_for(&self, code: u16) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct StaticCatalog {
    messages: HashMap<u16, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope<T> {
    pub code: u16,
    pub data: Option<T>,
    pub message: String,
}

impl Operation {
    pub fn success_code(&self) -> u16 {
        match self {
            Operation::RetrieveFriends => RETRIEVE_FRIENDS_SUCCESS,
            Operation::SendFriendRequest => SEND_FRIEND_REQ_SUCCESS,
            Operation::AcceptFriendRequest
            | Operation::DenyFriendRequest
            | Operation::BlockFriendRequest => RESPONSE_FRIEND_REQ_SUCCESS,
            Operation::GetTradeRequest => GET_REQUEST_SUCCESS,
            Operation::SendTradeRequest => SEND_TRADE_REQ_SUCCESS,
            Operation::RespondTradeRequest => RESP_TRADE_REQ_SUCCESS,
            Operation::CounterTradeRequest => COUNTER_TRADE_REQ_SUCCESS,
            Operation::MarkTradeReceived => MARK_TRADE_REQ_READ_SUCCESS,
            Operation::CancelTradeRequest => CANCEL_TRADE_REQ_SUCCESS,
            Operation::ClearTradeRequest => CLEAR_TRADE_REQ_SUCCESS,
        }
    }

    /// Code reported to clients when this operation fails with `err`.
    pub fn failure_code(&self, err: &NegotiationError) -> u16 {
        use NegotiationError as E;
        use Operation as Op;

        match (self, err) {
            (_, E::FatalInconsistency(_)) => DATABASE_ERROR,
            (_, E::Store(crate::error::StoreError::VersionConflict { .. })) => {
                CONCURRENT_MODIFICATION
            }
            (_, E::Store(_)) => DATABASE_ERROR,

            (Op::RetrieveFriends, _) => RETRIEVE_FRIENDS_FAIL_NONE,

            (Op::SendFriendRequest, E::NoSuchUser(_) | E::SelfTarget) => {
                SEND_FRIEND_REQ_FAIL_NO_USER
            }
            (Op::SendFriendRequest, E::RequestExists(status)) => match status {
                FriendRequestStatus::Accepted => SEND_FRIEND_REQ_FAIL_FRIEND_EXISTS,
                FriendRequestStatus::Blocked => SEND_FRIEND_REQ_FAIL_BLOCKED,
                FriendRequestStatus::Pending => SEND_FRIEND_REQ_FAIL_PENDING,
                // denied requests are deleted, finding one means the store is corrupt
                FriendRequestStatus::Denied => DATABASE_ERROR,
            },

            (
                Op::AcceptFriendRequest | Op::DenyFriendRequest | Op::BlockFriendRequest,
                E::RequestNotFound(_) | E::NoSuchUser(_) | E::NotInitialized,
            ) => RESPONSE_FRIEND_REQ_FAIL_NONE,
            (
                Op::AcceptFriendRequest | Op::DenyFriendRequest | Op::BlockFriendRequest,
                E::RequestExists(_),
            ) => RESPONSE_FRIEND_REQ_FAIL_DUPLICATE,

            (Op::GetTradeRequest, _) => GET_REQUEST_FAILED,

            (_, E::RequestNotFound(_)) => TRADE_REQ_NON_EXISTENT,
            (_, E::NoSuchUser(_) | E::SelfTarget) => SEND_TRADE_REQ_FAIL_NO_USER,
            (_, E::InvalidItems) => SEND_TRADE_REQ_FAIL_INVALID_ITEMS,
            (_, E::InvalidMethod(_)) => SEND_TRADE_REQ_FAIL_TRADE_METHOD,
            (_, E::NoItemsGiven) => SEND_TRADE_REQ_FAIL_NO_ITEMS,
            (_, E::DuplicateRequest(_)) => SEND_TRADE_REQ_FAIL_SAME_REQUEST,

            (Op::RespondTradeRequest, E::NotPending(_)) => TRADE_REQ_NOT_PENDING,
            (Op::RespondTradeRequest, E::WrongTarget) => RESP_TRADE_REQ_FAILED_USER_NOT_TARGET,
            (Op::RespondTradeRequest | Op::CounterTradeRequest, E::WrongOwner) => {
                RESP_TRADE_REQ_FAILED_WRONG_OWNER
            }
            (
                Op::RespondTradeRequest | Op::CounterTradeRequest,
                E::InvalidStatus(_) | E::NotPending(_),
            ) => RESP_TRADE_REQ_FAILED_INVALID_STATUS,

            (Op::MarkTradeReceived, E::WrongOwner) => MARK_TRADE_REQ_FAILED_INVALID_USER,
            (Op::MarkTradeReceived, E::InvalidStatus(_)) => MARK_TRADE_REQ_FAILED_INVALID_STATUS,
            (Op::MarkTradeReceived, E::AlreadyMarked) => MARK_TRADE_REQ_FAILED_ALREADY_MARKED,

            (Op::CancelTradeRequest, E::WrongOwner) => CANCEL_TRADE_REQ_FAILED_INVALID_USER,
            (Op::CancelTradeRequest, E::InvalidStatus(StatusMismatch::Current(_))) => {
                CANCEL_TRADE_REQ_FAILED_INVALID_STATUS
            }

            (Op::ClearTradeRequest, E::WrongOwner) => CLEAR_TRADE_REQ_FAILED_INVALID_USER,
            (Op::ClearTradeRequest, E::InvalidStatus(StatusMismatch::Current(_))) => {
                CLEAR_TRADE_REQ_FAILED_INVALID_STATUS
            }

            _ => UNKNOWN_SERVER_ERROR,
        }
    }
}

impl StaticCatalog {
    pub fn new() -> Self {
        let messages = [
            (RETRIEVE_FRIENDS_SUCCESS, "Friends retrieved"),
            (RETRIEVE_FRIENDS_FAIL_NONE, "No users found"),
            (SEND_FRIEND_REQ_SUCCESS, "Friend request sent"),
            (SEND_FRIEND_REQ_FAIL_NO_USER, "That user does not exist"),
            (SEND_FRIEND_REQ_FAIL_FRIEND_EXISTS, "You are already friends with this user"),
            (SEND_FRIEND_REQ_FAIL_BLOCKED, "This user cannot be sent a friend request"),
            (SEND_FRIEND_REQ_FAIL_PENDING, "A friend request is already pending"),
            (RESPONSE_FRIEND_REQ_SUCCESS, "Friend request updated"),
            (RESPONSE_FRIEND_REQ_FAIL_NONE, "There is no friend request from this user"),
            (RESPONSE_FRIEND_REQ_FAIL_DUPLICATE, "The friend request already has that status"),
            (RESPONSE_FRIEND_REQ_FAIL_INVALID, "You have no friend requests"),
            (COUNTER_TRADE_REQ_SUCCESS, "Counter offer sent"),
            (SEND_TRADE_REQ_SUCCESS, "Trade request sent"),
            (SEND_TRADE_REQ_FAIL_NO_USER, "That user does not exist"),
            (SEND_TRADE_REQ_FAIL_INVALID_ITEMS, "One or more items are not available for this trade"),
            (SEND_TRADE_REQ_FAIL_TRADE_METHOD, "Unknown trade method"),
            (SEND_TRADE_REQ_FAIL_NO_ITEMS, "A trade must include at least one item"),
            (SEND_TRADE_REQ_FAIL_SAME_REQUEST, "An identical trade request is already pending"),
            (RESP_TRADE_REQ_SUCCESS, "Trade request answered"),
            (RESP_TRADE_REQ_FAILED_WRONG_OWNER, "This trade request does not belong to you"),
            (RESP_TRADE_REQ_FAILED_INVALID_STATUS, "That status is not valid for this trade request"),
            (TRADE_REQ_NON_EXISTENT, "The trade request does not exist"),
            (TRADE_REQ_NOT_PENDING, "The trade request is no longer pending"),
            (CANCEL_TRADE_REQ_SUCCESS, "Trade request cancelled"),
            (CANCEL_TRADE_REQ_FAILED_INVALID_USER, "You cannot cancel this trade request"),
            (CANCEL_TRADE_REQ_FAILED_INVALID_STATUS, "This trade request can no longer be cancelled"),
            (RESP_TRADE_REQ_FAILED_USER_NOT_TARGET, "Only the recipient can answer a trade request"),
            (CLEAR_TRADE_REQ_SUCCESS, "Trade request cleared"),
            (CLEAR_TRADE_REQ_FAILED_INVALID_USER, "You cannot clear this trade request"),
            (CLEAR_TRADE_REQ_FAILED_INVALID_STATUS, "Only declined trade requests can be cleared"),
            (MARK_TRADE_REQ_READ_SUCCESS, "Trade marked as received"),
            (MARK_TRADE_REQ_FAILED_INVALID_USER, "You are not part of this trade"),
            (MARK_TRADE_REQ_FAILED_INVALID_STATUS, "Only accepted trades can be marked as received"),
            (MARK_TRADE_REQ_FAILED_ALREADY_MARKED, "You have already marked this trade as received"),
            (GET_REQUEST_SUCCESS, "Request retrieved"),
            (GET_REQUEST_FAILED, "Request could not be retrieved"),
            (CONCURRENT_MODIFICATION, "The record changed while you were editing it, please retry"),
            (DATABASE_ERROR, "A database error occurred"),
            (UNKNOWN_SERVER_ERROR, "An unknown server error occurred"),
        ]
        .into_iter()
        .map(|(code, text)| (code, text.to_string()))
        .collect();

        Self { messages }
    }

    /// Replace or add the text for `code`.
    pub fn with_message(mut self, code: u16, text: impl Into<String>) -> Self {
        self.messages.insert(code, text.into());
        self
    }
}

impl Default for StaticCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusCatalog for StaticCatalog {
    fn message_for(&self, code: u16) -> Option<String> {
        self.messages.get(&code).cloned()
    }
}

impl<T> Envelope<T> {
    pub fn new(code: u16, data: Option<T>, catalog: &impl StatusCatalog) -> Self {
        let message = catalog.message_for(code).unwrap_or_else(|| {
            warn!(code, "status code has no catalog entry");
            format!("Status {code}")
        });
        Self {
            code,
            data,
            message,
        }
    }

    /// Wraps a negotiator result. Failures carry no data.
    pub fn from_result(
        operation: Operation,
        result: Result<T, NegotiationError>,
        catalog: &impl StatusCatalog,
    ) -> Self {
        match result {
            Ok(data) => Self::new(operation.success_code(), Some(data), catalog),
            Err(err) => {
                let code = operation.failure_code(&err);
                if code == DATABASE_ERROR || code == UNKNOWN_SERVER_ERROR {
                    error!(?operation, code, error = %err, "operation failed");
                }
                Self::new(code, None, catalog)
            }
        }
    }
}

impl<T> Envelope<Vec<T>> {
    /// Wraps a list result. An empty friend list is reported as
    /// `RETRIEVE_FRIENDS_FAIL_NONE` rather than as an empty success.
    pub fn from_list(
        operation: Operation,
        result: Result<Vec<T>, NegotiationError>,
        catalog: &impl StatusCatalog,
    ) -> Self {
        match result {
            Ok(list) if list.is_empty() && operation == Operation::RetrieveFriends => {
                Self::new(RETRIEVE_FRIENDS_FAIL_NONE, None, catalog)
            }
            result => Self::from_result(operation, result, catalog),
        }
    }
}
