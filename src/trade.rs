//! Trade request aggregate, its status machine and trade methods
use crate::utils::same_items;
use chrono::{DateTime, TimeZone, Utc};
use std::fmt;
use std::str::FromStr;

#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd,
)]
pub enum TradeRequestStatus {
    #[n(0)]
    Accepted,
    #[n(1)]
    Pending,
    #[n(2)]
    Declined,
}

/// How the two parties intend to hand items over.
#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd,
)]
pub enum TradeMethod {
    #[n(0)]
    DropOff,
    #[n(1)]
    PickUp,
    #[n(2)]
    Contact,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

/// A standalone trade offer referenced by id from both participants.
///
/// `received_by_source` and `received_by_target` only carry meaning once the
/// request has been accepted.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct TradeRequest {
    #[n(0)]
    pub id: String, // empty until first persisted
    #[n(1)]
    pub from: String, // user id
    #[n(2)]
    pub to: String, // user id
    #[n(3)]
    pub from_items: Vec<String>,
    #[n(4)]
    pub to_items: Vec<String>,
    #[n(5)]
    pub date_initiated: TimeStamp<Utc>,
    #[n(6)]
    pub status: TradeRequestStatus,
    #[n(7)]
    pub method: TradeMethod,
    #[n(8)]
    pub message: String,
    #[n(9)]
    pub counter_request: bool,
    #[n(10)]
    pub received_by_source: bool,
    #[n(11)]
    pub received_by_target: bool,
    #[n(12)]
    pub version: u64,
}

impl TradeRequestStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TradeRequestStatus::Accepted => "Accepted",
            TradeRequestStatus::Pending => "Pending",
            TradeRequestStatus::Declined => "Declined",
        }
    }
    /// Statuses a pending request may be moved to by its target.
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            TradeRequestStatus::Accepted | TradeRequestStatus::Declined
        )
    }
}

impl fmt::Display for TradeRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TradeRequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACCEPTED" => Ok(TradeRequestStatus::Accepted),
            "PENDING" => Ok(TradeRequestStatus::Pending),
            "DECLINED" => Ok(TradeRequestStatus::Declined),
            _ => Err(format!("Invalid trade request status: {}", s)),
        }
    }
}

impl TradeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeMethod::DropOff => "DROP_OFF",
            TradeMethod::PickUp => "PICK_UP",
            TradeMethod::Contact => "CONTACT",
        }
    }
    pub fn label(&self) -> &'static str {
        match self {
            TradeMethod::DropOff => "Drop-off",
            TradeMethod::PickUp => "Pick-up",
            TradeMethod::Contact => "Contact exchange",
        }
    }
}

impl FromStr for TradeMethod {
    type Err = String;

    // accepts the wire names as well as the hyphenated spelling
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "DROP_OFF" => Ok(TradeMethod::DropOff),
            "PICK_UP" => Ok(TradeMethod::PickUp),
            "CONTACT" | "CONTACT_EXCHANGE" => Ok(TradeMethod::Contact),
            _ => Err(format!("Invalid trade method: {}", s)),
        }
    }
}

impl fmt::Display for TradeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl TradeRequest {
    /// A fresh pending offer from `from` to `to`. The id is assigned by the store.
    pub fn new(
        from: String,
        to: String,
        from_items: Vec<String>,
        to_items: Vec<String>,
        method: TradeMethod,
        message: String,
        counter_request: bool,
    ) -> Self {
        Self {
            id: String::new(),
            from,
            to,
            from_items,
            to_items,
            date_initiated: TimeStamp::new(),
            status: TradeRequestStatus::Pending,
            method,
            message,
            counter_request,
            received_by_source: false,
            received_by_target: false,
            version: 0,
        }
    }
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.from == user_id || self.to == user_id
    }
    /// Same method and the same item sets on both sides, in any order.
    /// The message and the participants are not compared.
    pub fn is_same_offer(&self, other: &TradeRequest) -> bool {
        self.method == other.method
            && same_items(&self.from_items, &other.from_items)
            && same_items(&self.to_items, &other.to_items)
    }
    pub fn is_fully_received(&self) -> bool {
        self.received_by_source && self.received_by_target
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}
impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn trade_request_survives_cbor() {
        let mut request = TradeRequest::new(
            "user_a".into(),
            "user_b".into(),
            ids(&["i1"]),
            ids(&["j1", "j2"]),
            TradeMethod::PickUp,
            "after work?".into(),
            false,
        );
        request.id = "trade_x".into();

        let encoding = minicbor::to_vec(&request).unwrap();
        let decoded: TradeRequest = minicbor::decode(&encoding).unwrap();

        assert_eq!(request, decoded);
    }

    #[test]
    fn method_parsing_accepts_both_spellings() {
        assert_eq!("PICK_UP".parse::<TradeMethod>(), Ok(TradeMethod::PickUp));
        assert_eq!("pick-up".parse::<TradeMethod>(), Ok(TradeMethod::PickUp));
        assert_eq!("contact-exchange".parse::<TradeMethod>(), Ok(TradeMethod::Contact));
        assert!("teleport".parse::<TradeMethod>().is_err());
    }

    #[test]
    fn same_offer_ignores_order_and_message() {
        let a = TradeRequest::new(
            "u1".into(),
            "u2".into(),
            ids(&["i1", "i2"]),
            ids(&["j1"]),
            TradeMethod::DropOff,
            "hi".into(),
            false,
        );
        let mut b = a.clone();
        b.from_items = ids(&["i2", "i1"]);
        b.message = "different".into();
        assert!(a.is_same_offer(&b));

        b.method = TradeMethod::Contact;
        assert!(!a.is_same_offer(&b));
    }
}
