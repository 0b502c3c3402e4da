//! Property-based tests for trade request negotiation
//!
//! Each case opens its own sled store, so the case counts are kept low.

mod common;

use barter_negotiation::error::NegotiationError;
use barter_negotiation::store::TradeRequestStore;
use barter_negotiation::trade::{TradeMethod, TradeRequest, TradeRequestStatus};
use barter_negotiation::trading::TradeNegotiator;
use common::{config, open_store};
use proptest::prelude::*;

// PROPERTY TEST STRATEGIES

/// Strategy to generate a trade method wire name
fn method_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("DROP_OFF"), Just("PICK_UP"), Just("CONTACT")]
}

fn status_strategy() -> impl Strategy<Value = TradeRequestStatus> {
    prop_oneof![
        Just(TradeRequestStatus::Accepted),
        Just(TradeRequestStatus::Pending),
        Just(TradeRequestStatus::Declined),
    ]
}

/// Strategy to generate a non-empty inventory of distinct item ids with the given prefix
fn inventory_strategy(prefix: &'static str) -> impl Strategy<Value = Vec<String>> {
    prop::collection::hash_set(0u32..1000, 1..6)
        .prop_map(move |ids| ids.into_iter().map(|id| format!("{prefix}{id}")).collect())
}

/// An inventory together with a non-empty subset of it
fn inventory_and_offer(prefix: &'static str) -> impl Strategy<Value = (Vec<String>, Vec<String>)> {
    inventory_strategy(prefix).prop_flat_map(|inventory| {
        let len = inventory.len();
        (Just(inventory), prop::sample::subsequence((0..len).collect::<Vec<_>>(), 1..=len))
            .prop_map(|(inventory, picks)| {
                let offer = picks.iter().map(|&i| inventory[i].clone()).collect();
                (inventory, offer)
            })
    })
}

// PROPERTY TESTS

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: the same offer is a duplicate whatever order its items are listed in
    #[test]
    fn duplicate_detection_ignores_item_order(
        (alice_items, from_ids) in inventory_and_offer("i"),
        (bob_items, to_ids) in inventory_and_offer("j"),
        method in method_strategy(),
    ) {
        let (_dir, store) = open_store("prop_duplicate.db").unwrap();
        let alice = store.register_user("alice", alice_items).unwrap();
        let bob = store.register_user("bob", bob_items).unwrap();
        let trades = TradeNegotiator::new(store.clone(), config());

        let first = trades
            .send_trade_request(&alice, &bob.id, &from_ids, &to_ids, method, "", false)
            .unwrap();

        let mut reversed_from = from_ids.clone();
        reversed_from.reverse();
        let mut reversed_to = to_ids.clone();
        reversed_to.reverse();

        let second = trades.send_trade_request(&alice, &bob.id, &reversed_from, &reversed_to, method, "again", false);
        prop_assert!(matches!(second, Err(NegotiationError::DuplicateRequest(ref id)) if *id == first.id));
    }

    /// Property: an offer naming any item outside the owner's inventory is refused
    #[test]
    fn foreign_items_are_rejected(
        (alice_items, from_ids) in inventory_and_offer("i"),
        (bob_items, _) in inventory_and_offer("j"),
        stray in 1000u32..2000,
        on_sender_side in any::<bool>(),
    ) {
        let (_dir, store) = open_store("prop_ownership.db").unwrap();
        let alice = store.register_user("alice", alice_items).unwrap();
        let bob = store.register_user("bob", bob_items.clone()).unwrap();
        let trades = TradeNegotiator::new(store.clone(), config());

        let mut from = from_ids.clone();
        let mut to = vec![bob_items[0].clone()];
        if on_sender_side {
            from.push(format!("i{stray}"));
        } else {
            to.push(format!("j{stray}"));
        }

        let result = trades.send_trade_request(&alice, &bob.id, &from, &to, "CONTACT", "", false);
        prop_assert!(matches!(result, Err(NegotiationError::InvalidItems)));
        prop_assert!(trades.trade_requests_for(&alice).unwrap().is_empty());
    }

    /// Property: a refused response leaves the stored request untouched
    #[test]
    fn refused_responses_do_not_mutate(
        stored_status in status_strategy(),
        requested in status_strategy(),
        by_target in any::<bool>(),
    ) {
        let (_dir, store) = open_store("prop_respond.db").unwrap();
        let alice = store.register_user("alice", vec!["i1".into()]).unwrap();
        let bob = store.register_user("bob", vec!["j1".into()]).unwrap();

        let mut request = TradeRequest::new(
            alice.id.clone(),
            bob.id.clone(),
            vec!["i1".into()],
            vec!["j1".into()],
            TradeMethod::DropOff,
            String::new(),
            false,
        );
        request.status = stored_status;
        let before = store.save_request(&request).unwrap();

        let trades = TradeNegotiator::new(store.clone(), config());
        let caller = if by_target { &bob } else { &alice };
        let result = trades.respond_to_trade_request(caller, &before.id, requested);

        let legal = stored_status == TradeRequestStatus::Pending && by_target && requested.is_response();
        prop_assert_eq!(result.is_ok(), legal);

        let after = store.find_request(&before.id).unwrap().unwrap();
        if legal {
            prop_assert_eq!(after.status, requested);
        } else {
            prop_assert_eq!(after, before);
        }
    }
}
