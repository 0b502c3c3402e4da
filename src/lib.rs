//! Negotiation core for a peer-to-peer bartering platform
//!
//! [`friendship::FriendshipNegotiator`] manages friend requests mirrored in
//! both users' records. [`trading::TradeNegotiator`] manages trade requests
//! stored once and referenced by id from both participants.
pub mod config;
pub mod envelope;
pub mod error;
pub mod friendship;
pub mod reconcile;
pub mod store;
pub mod trade;
pub mod trading;
pub mod user;
pub mod utils;
