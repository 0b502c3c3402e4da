//! Trade request lifecycle
//!
//! ```text
//! PENDING --respond--> ACCEPTED --cancel--> (deleted)
//!    |  \--respond--> DECLINED --clear---> (deleted)
//!    |--counter--> PENDING (terms replaced, flagged as counter)
//!    \--cancel--> (deleted)
//! ```
//!
//! The request is one record referenced by id from both users. Every guard
//! runs before the first write.
use crate::config::NegotiationConfig;
use crate::error::{Inconsistency, NegotiationError, Result, StatusMismatch, StoreError};
use crate::friendship::resolve_caller;
use crate::reconcile::{ReferenceAction, Repair};
use crate::store::{TradeRequestStore, UserStore};
use crate::trade::{TradeMethod, TradeRequest, TradeRequestStatus};
use crate::user::UserAggregate;
use crate::utils::owns_all;
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct TradeNegotiator<S> {
    store: Arc<S>,
    config: NegotiationConfig,
}

impl<S: UserStore + TradeRequestStore> TradeNegotiator<S> {
    pub fn new(store: Arc<S>, config: NegotiationConfig) -> Self {
        Self { store, config }
    }

    /// Load trade request from the store
    pub fn trade_request(&self, request_id: &str) -> Result<TradeRequest> {
        self.store
            .find_request(request_id)?
            .ok_or_else(|| NegotiationError::RequestNotFound(request_id.to_string()))
    }

    /// Every stored request the caller takes part in. Dangling references are skipped.
    pub fn trade_requests_for(&self, caller: &UserAggregate) -> Result<Vec<TradeRequest>> {
        let caller = resolve_caller(self.store.as_ref(), caller, self.config)?;
        Ok(self.store.find_requests(&caller.trade_requests)?)
    }

    /// Offer `from_item_ids` from the caller's inventory for `to_item_ids`
    /// from the inventory of the user `to_user_id`.
    #[allow(clippy::too_many_arguments)]
    pub fn send_trade_request(
        &self,
        caller: &UserAggregate,
        to_user_id: &str,
        from_item_ids: &[String],
        to_item_ids: &[String],
        method: &str,
        message: &str,
        counter_request: bool,
    ) -> Result<TradeRequest> {
        debug!(caller = %caller.id, target = to_user_id, method, "send trade request");
        let mut caller = resolve_caller(self.store.as_ref(), caller, self.config)?;

        if caller.id == to_user_id {
            return Err(NegotiationError::SelfTarget);
        }
        let mut target = self.find_user(to_user_id)?;

        // Ensure that all the items given belong to the appropriate user
        if !owns_all(&caller.inventory, from_item_ids) || !owns_all(&target.inventory, to_item_ids)
        {
            return Err(NegotiationError::InvalidItems);
        }
        let method = parse_method(method)?;

        let candidate = TradeRequest::new(
            caller.id.clone(),
            target.id.clone(),
            from_item_ids.to_vec(),
            to_item_ids.to_vec(),
            method,
            message.to_string(),
            counter_request,
        );

        // Refuse a second pending offer with the same terms
        let existing = self.store.find_requests(&caller.trade_requests)?;
        if let Some(duplicate) = existing.iter().find(|request| {
            request.status == TradeRequestStatus::Pending && request.is_same_offer(&candidate)
        }) {
            debug!(existing = %duplicate.id, "duplicate trade request");
            return Err(NegotiationError::DuplicateRequest(duplicate.id.clone()));
        }

        // The request is stored first to obtain its id
        let saved = self.store.save_request(&candidate)?;

        caller.attach_trade_request(&saved.id);
        target.attach_trade_request(&saved.id);
        if let Err(source) = self.store.save_users(&[caller, target]) {
            return Err(self.inconsistency(
                "send_trade_request",
                &saved,
                ReferenceAction::Attach,
                source,
            ));
        }
        info!(request_id = %saved.id, from = %saved.from, to = %saved.to, method = %saved.method, "trade request sent");

        Ok(saved)
    }

    /// Respond to the trade request presented to the caller
    ///
    /// Only `Accepted` and `Declined` are valid responses. Counters go
    /// through [`TradeNegotiator::counter_trade_request`].
    pub fn respond_to_trade_request(
        &self,
        caller: &UserAggregate,
        request_id: &str,
        status: TradeRequestStatus,
    ) -> Result<TradeRequest> {
        debug!(caller = %caller.id, request_id, %status, "respond to trade request");
        let caller = resolve_caller(self.store.as_ref(), caller, self.config)?;
        let mut request = self.trade_request(request_id)?;

        if request.status != TradeRequestStatus::Pending {
            return Err(NegotiationError::NotPending(request.status));
        }
        if request.to != caller.id {
            return Err(NegotiationError::WrongTarget);
        }
        if !request.is_participant(&caller.id) {
            return Err(NegotiationError::WrongOwner);
        }
        if !status.is_response() {
            return Err(NegotiationError::InvalidStatus(StatusMismatch::Requested(
                status,
            )));
        }

        request.status = status;
        let saved = self.store.save_request(&request)?;
        info!(request_id, %status, "trade request answered");

        Ok(saved)
    }

    /// Replace the terms of a pending request and flag it as a counter offer.
    ///
    /// `new_from_item_ids` must belong to the caller and `new_to_item_ids` to
    /// the user who originally sent the request. Sender and target do not change.
    pub fn counter_trade_request(
        &self,
        caller: &UserAggregate,
        request_id: &str,
        method: &str,
        message: &str,
        new_from_item_ids: &[String],
        new_to_item_ids: &[String],
    ) -> Result<TradeRequest> {
        debug!(caller = %caller.id, request_id, "counter trade request");
        if new_from_item_ids.is_empty() && new_to_item_ids.is_empty() {
            return Err(NegotiationError::NoItemsGiven);
        }
        let method = parse_method(method)?;

        let caller = resolve_caller(self.store.as_ref(), caller, self.config)?;
        let mut request = self.trade_request(request_id)?;

        if request.status != TradeRequestStatus::Pending {
            return Err(NegotiationError::NotPending(request.status));
        }
        if !request.is_participant(&caller.id) {
            return Err(NegotiationError::WrongOwner);
        }

        // the original sender becomes the party being asked
        let new_target = self.find_user(&request.from)?;
        if !owns_all(&caller.inventory, new_from_item_ids)
            || !owns_all(&new_target.inventory, new_to_item_ids)
        {
            return Err(NegotiationError::InvalidItems);
        }

        request.from_items = new_from_item_ids.to_vec();
        request.to_items = new_to_item_ids.to_vec();
        request.method = method;
        request.message = message.to_string();
        request.counter_request = true;

        let saved = self.store.save_request(&request)?;
        info!(request_id, method = %saved.method, "trade request countered");

        Ok(saved)
    }

    /// Record that the caller has received their side of an accepted trade.
    ///
    /// Both flags being set does not move the request anywhere.
    pub fn mark_received(&self, caller: &UserAggregate, request_id: &str) -> Result<TradeRequest> {
        debug!(caller = %caller.id, request_id, "mark trade request received");
        let caller = resolve_caller(self.store.as_ref(), caller, self.config)?;
        let mut request = self.trade_request(request_id)?;

        if request.status != TradeRequestStatus::Accepted {
            return Err(NegotiationError::InvalidStatus(StatusMismatch::Current(
                request.status,
            )));
        }

        let is_from = request.from == caller.id;
        let is_to = request.to == caller.id;
        let flag = match (is_from, is_to) {
            (true, _) => &mut request.received_by_source,
            (false, true) => &mut request.received_by_target,
            (false, false) => return Err(NegotiationError::WrongOwner),
        };
        if *flag {
            return Err(NegotiationError::AlreadyMarked);
        }
        *flag = true;

        let saved = self.store.save_request(&request)?;
        if saved.is_fully_received() {
            info!(request_id, "both participants marked the trade as received");
        } else {
            info!(request_id, by = %caller.id, "trade marked as received");
        }

        Ok(saved)
    }

    /// Cancel a trade request. A pending request can only be cancelled by its
    /// sender, an accepted one by either participant.
    pub fn cancel_trade_request(&self, caller: &UserAggregate, request_id: &str) -> Result<()> {
        debug!(caller = %caller.id, request_id, "cancel trade request");
        let caller = resolve_caller(self.store.as_ref(), caller, self.config)?;
        let request = self.trade_request(request_id)?;

        match request.status {
            TradeRequestStatus::Pending if request.from != caller.id => {
                return Err(NegotiationError::WrongOwner);
            }
            TradeRequestStatus::Accepted if !request.is_participant(&caller.id) => {
                return Err(NegotiationError::WrongOwner);
            }
            TradeRequestStatus::Pending | TradeRequestStatus::Accepted => {}
            status => {
                return Err(NegotiationError::InvalidStatus(StatusMismatch::Current(
                    status,
                )));
            }
        }

        self.remove("cancel_trade_request", &request)
    }

    /// Clear a declined request. Only its sender may do this.
    pub fn clear_trade_request(&self, caller: &UserAggregate, request_id: &str) -> Result<()> {
        debug!(caller = %caller.id, request_id, "clear trade request");
        let caller = resolve_caller(self.store.as_ref(), caller, self.config)?;
        let request = self.trade_request(request_id)?;

        if request.status != TradeRequestStatus::Declined {
            return Err(NegotiationError::InvalidStatus(StatusMismatch::Current(
                request.status,
            )));
        }
        if request.from != caller.id {
            return Err(NegotiationError::WrongOwner);
        }

        self.remove("clear_trade_request", &request)
    }

    fn find_user(&self, user_id: &str) -> Result<UserAggregate> {
        self.store
            .find_user(user_id)?
            .ok_or_else(|| NegotiationError::NoSuchUser(user_id.to_string()))
    }

    // Delete the request, then drop the reference from both participants.
    fn remove(&self, operation: &'static str, request: &TradeRequest) -> Result<()> {
        self.store.delete_request(request)?;

        let detach = || -> std::result::Result<(), StoreError> {
            let mut changed = Vec::with_capacity(2);
            for user_id in [&request.from, &request.to] {
                if let Some(mut user) = self.store.find_user(user_id)? {
                    if user.detach_trade_request(&request.id) {
                        changed.push(user);
                    }
                }
            }
            if !changed.is_empty() {
                self.store.save_users(&changed)?;
            }
            Ok(())
        };
        if let Err(source) = detach() {
            return Err(self.inconsistency(operation, request, ReferenceAction::Detach, source));
        }
        info!(operation, request_id = %request.id, "trade request deleted");

        Ok(())
    }

    fn inconsistency(
        &self,
        operation: &'static str,
        request: &TradeRequest,
        action: ReferenceAction,
        source: StoreError,
    ) -> NegotiationError {
        let inconsistency = Inconsistency {
            operation,
            committed: format!("trade request {}", request.id),
            repair: Repair::TradeReferences {
                request_id: request.id.clone(),
                user_ids: vec![request.from.clone(), request.to.clone()],
                action,
            },
            source,
        };
        error!(
            operation,
            committed = %inconsistency.committed,
            repair = ?inconsistency.repair,
            error = %inconsistency.source,
            "trade request references diverged"
        );
        NegotiationError::FatalInconsistency(Box::new(inconsistency))
    }
}

fn parse_method(method: &str) -> Result<TradeMethod> {
    method
        .parse()
        .map_err(|_| NegotiationError::InvalidMethod(method.to_string()))
}
