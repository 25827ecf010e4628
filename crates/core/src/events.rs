use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Free-form order metadata carried from submission to the fill event.
///
/// The router attaches exit parameters here; venues treat it as opaque.
pub type OrderMeta = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Applies the side's sign to an unsigned quantity (buy = +, sell = -).
    #[must_use]
    pub fn signed(self, quantity: Decimal) -> Decimal {
        match self {
            Self::Buy => quantity,
            Self::Sell => -quantity,
        }
    }

    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    #[serde(alias = "MKT")]
    Market,
    #[serde(alias = "LMT")]
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    #[default]
    Day,
    Gtc,
    Ioc,
}

/// Venue-assigned order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Parameters for a single order submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub order_type: OrderType,
    pub limit_price: Option<Decimal>,
    #[serde(default)]
    pub tif: TimeInForce,
    #[serde(default)]
    pub meta: OrderMeta,
}

impl OrderRequest {
    /// Creates a day market order with empty metadata.
    #[must_use]
    pub fn market(symbol: impl Into<String>, side: Side, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            order_type: OrderType::Market,
            limit_price: None,
            tif: TimeInForce::Day,
            meta: OrderMeta::new(),
        }
    }

    /// Creates a day limit order with empty metadata.
    #[must_use]
    pub fn limit(symbol: impl Into<String>, side: Side, quantity: Decimal, price: Decimal) -> Self {
        Self {
            order_type: OrderType::Limit,
            limit_price: Some(price),
            ..Self::market(symbol, side, quantity)
        }
    }

    #[must_use]
    pub fn with_meta(mut self, meta: OrderMeta) -> Self {
        self.meta = meta;
        self
    }

    #[must_use]
    pub const fn with_tif(mut self, tif: TimeInForce) -> Self {
        self.tif = tif;
        self
    }
}

/// An order resting in a venue's open-order table.
///
/// `remaining` is either `quantity` or zero; there is no partial state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub remaining: Decimal,
    pub order_type: OrderType,
    pub limit_price: Option<Decimal>,
    pub tif: TimeInForce,
    pub created_at: DateTime<Utc>,
    pub meta: OrderMeta,
}

impl Order {
    #[must_use]
    pub fn from_request(id: OrderId, request: OrderRequest, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            symbol: request.symbol,
            side: request.side,
            quantity: request.quantity,
            remaining: request.quantity,
            order_type: request.order_type,
            limit_price: request.limit_price,
            tif: request.tif,
            created_at,
            meta: request.meta,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Accepted,
    Filled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::Filled => write!(f, "filled"),
        }
    }
}

/// Immediate acknowledgment returned by `place_order`. Never waits for a fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub meta: OrderMeta,
}

/// Outcome of an order, dispatched to every `stream_orders` subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillEvent {
    pub order_id: OrderId,
    pub symbol: String,
    pub side: Side,
    #[serde(rename = "qty")]
    pub quantity: Decimal,
    pub price: Decimal,
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub meta: OrderMeta,
}

impl FillEvent {
    /// Cash impact of this fill: `-(price * signed quantity)`.
    #[must_use]
    pub fn cash_delta(&self) -> Decimal {
        -(self.price * self.side.signed(self.quantity))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub symbol: String,
    /// Signed quantity, positive = long.
    #[serde(rename = "qty")]
    pub quantity: Decimal,
    pub avg_price: Decimal,
}

/// Last trade price and bid/ask spread for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub price: Decimal,
    pub spread: Decimal,
}

impl Quote {
    #[must_use]
    pub const fn new(price: Decimal, spread: Decimal) -> Self {
        Self { price, spread }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Trade,
    Quote,
}

/// Features computed upstream by the ingestion pipeline.
///
/// Missing keys deserialize as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Features {
    #[serde(default)]
    pub ret_5s: f64,
    #[serde(default)]
    pub ret_15s: f64,
    #[serde(default)]
    pub vol_spike: f64,
}

/// One element of the market event stream consumed by the decision loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    pub symbol: String,
    pub ts: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub features: Features,
}

impl TradeEvent {
    #[must_use]
    pub fn trade(symbol: impl Into<String>, features: Features) -> Self {
        Self {
            symbol: symbol.into(),
            ts: Utc::now(),
            kind: EventKind::Trade,
            features,
        }
    }
}
