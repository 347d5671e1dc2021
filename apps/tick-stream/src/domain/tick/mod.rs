//! Market Data Tick Types
//!
//! Codec-agnostic representation of one decoded market update. The
//! subscription mode decides how much of the tick is populated:
//!
//! - **LTP**: identity, sequence, exchange time and last traded price
//! - **QUOTE**: LTP plus traded quantities, volume and OHLC
//! - **SNAP_QUOTE**: QUOTE plus open interest, circuit limits, 52-week range
//!   and the best-five depth block
//!
//! Optional groups are nested (`quote`, `snap_quote`) so a tick can never
//! claim a mode without carrying the fields that mode implies.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Subscription Mode
// =============================================================================

/// Subscription mode, shared by the wire subscribe message and the tick frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum SubscriptionMode {
    /// Last traded price only.
    Ltp,
    /// LTP plus OHLC, volume and traded quantities.
    Quote,
    /// Quote plus open interest, circuits and best-five depth.
    SnapQuote,
}

impl SubscriptionMode {
    /// Wire code of the mode.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Ltp => 1,
            Self::Quote => 2,
            Self::SnapQuote => 3,
        }
    }

    /// Parse a wire code, returning `None` for unknown modes.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Ltp),
            2 => Some(Self::Quote),
            3 => Some(Self::SnapQuote),
            _ => None,
        }
    }

    /// Exact frame length carried by this mode.
    #[must_use]
    pub const fn frame_len(self) -> usize {
        match self {
            Self::Ltp => LTP_FRAME_LEN,
            Self::Quote => QUOTE_FRAME_LEN,
            Self::SnapQuote => SNAP_QUOTE_FRAME_LEN,
        }
    }

    /// Get the mode name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ltp => "ltp",
            Self::Quote => "quote",
            Self::SnapQuote => "snap_quote",
        }
    }
}

impl From<SubscriptionMode> for u8 {
    fn from(mode: SubscriptionMode) -> Self {
        mode.code()
    }
}

impl TryFrom<u8> for SubscriptionMode {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or_else(|| format!("unknown subscription mode {code}"))
    }
}

impl fmt::Display for SubscriptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubscriptionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ltp" | "1" => Ok(Self::Ltp),
            "quote" | "2" => Ok(Self::Quote),
            "snap_quote" | "snapquote" | "3" => Ok(Self::SnapQuote),
            other => Err(format!("unknown subscription mode '{other}'")),
        }
    }
}

/// Length of an LTP frame in bytes.
pub const LTP_FRAME_LEN: usize = 51;
/// Length of a QUOTE frame in bytes.
pub const QUOTE_FRAME_LEN: usize = 123;
/// Length of a SNAP_QUOTE frame in bytes.
pub const SNAP_QUOTE_FRAME_LEN: usize = 379;

// =============================================================================
// Exchange Segment
// =============================================================================

/// Exchange + instrument class code as carried on the wire.
///
/// Unknown codes are preserved rather than rejected; the provider adds
/// segments over time and this client does not interpret them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeSegment(pub u8);

impl ExchangeSegment {
    /// NSE cash market.
    pub const NSE_CM: Self = Self(1);
    /// NSE futures & options.
    pub const NSE_FO: Self = Self(2);
    /// BSE cash market.
    pub const BSE_CM: Self = Self(3);
    /// BSE futures & options.
    pub const BSE_FO: Self = Self(4);
    /// MCX commodity derivatives.
    pub const MCX_FO: Self = Self(5);
    /// NCDEX commodity derivatives.
    pub const NCX_FO: Self = Self(7);
    /// Currency derivatives.
    pub const CDE_FO: Self = Self(13);

    /// Wire code.
    #[must_use]
    pub const fn code(self) -> u8 {
        self.0
    }

    /// Short name for a known segment.
    #[must_use]
    pub const fn name(self) -> Option<&'static str> {
        match self.0 {
            1 => Some("nse_cm"),
            2 => Some("nse_fo"),
            3 => Some("bse_cm"),
            4 => Some("bse_fo"),
            5 => Some("mcx_fo"),
            7 => Some("ncx_fo"),
            13 => Some("cde_fo"),
            _ => None,
        }
    }
}

impl From<u8> for ExchangeSegment {
    fn from(code: u8) -> Self {
        Self(code)
    }
}

impl fmt::Display for ExchangeSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "segment_{}", self.0),
        }
    }
}

/// Accepts a known short name (`nse_cm`, case-insensitive) or a raw code.
impl std::str::FromStr for ExchangeSegment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<u8>() {
            return Ok(Self(code));
        }
        let lower = s.to_ascii_lowercase();
        [
            Self::NSE_CM,
            Self::NSE_FO,
            Self::BSE_CM,
            Self::BSE_FO,
            Self::MCX_FO,
            Self::NCX_FO,
            Self::CDE_FO,
        ]
        .into_iter()
        .find(|segment| segment.name() == Some(lower.as_str()))
        .ok_or_else(|| format!("unknown exchange segment '{s}'"))
    }
}

// =============================================================================
// Tick
// =============================================================================

/// One decoded market update for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Subscription mode the frame was encoded in.
    pub mode: SubscriptionMode,
    /// Exchange segment of the instrument.
    pub exchange_segment: ExchangeSegment,
    /// Instrument token, unique within the segment.
    pub token: String,
    /// Server sequence number (informational only).
    pub sequence_number: i64,
    /// Exchange event time in epoch milliseconds.
    pub exchange_timestamp_ms: i64,
    /// Last traded price.
    pub last_traded_price: Decimal,
    /// Present for QUOTE and SNAP_QUOTE ticks.
    pub quote: Option<QuoteFields>,
    /// Present for SNAP_QUOTE ticks only.
    pub snap_quote: Option<SnapQuoteFields>,
}

impl Tick {
    /// Exchange event time, if the millisecond value is representable.
    #[must_use]
    pub fn exchange_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.exchange_timestamp_ms)
    }
}

/// Fields added by the QUOTE layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteFields {
    /// Quantity of the last trade.
    pub last_traded_quantity: i64,
    /// Volume-weighted average traded price.
    pub average_traded_price: Decimal,
    /// Traded volume for the day.
    pub volume: i64,
    /// Total pending buy quantity.
    pub total_buy_quantity: f64,
    /// Total pending sell quantity.
    pub total_sell_quantity: f64,
    /// Day open.
    pub open: Decimal,
    /// Day high.
    pub high: Decimal,
    /// Day low.
    pub low: Decimal,
    /// Previous close.
    pub close: Decimal,
}

/// Fields added by the SNAP_QUOTE layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapQuoteFields {
    /// Time of the last trade in epoch milliseconds.
    pub last_traded_timestamp_ms: i64,
    /// Open interest.
    pub open_interest: i64,
    /// Best-five bid/ask block, passed through undecoded.
    pub depth: DepthBlock,
    /// Upper circuit limit.
    pub upper_circuit: Decimal,
    /// Lower circuit limit.
    pub lower_circuit: Decimal,
    /// 52-week high.
    pub fifty_two_week_high: Decimal,
    /// 52-week low.
    pub fifty_two_week_low: Decimal,
}

impl SnapQuoteFields {
    /// Time of the last trade, if representable.
    #[must_use]
    pub fn last_traded_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.last_traded_timestamp_ms)
    }
}

// =============================================================================
// Depth
// =============================================================================

/// Size of the best-five depth block in bytes.
pub const DEPTH_BLOCK_LEN: usize = 200;

const DEPTH_PACKET_LEN: usize = 20;

/// Raw best-five bid/ask block of a SNAP_QUOTE frame.
///
/// The bytes are kept verbatim. [`DepthBlock::levels`] offers a best-effort
/// interpretation as ten 20-byte packets; the provider does not guarantee
/// that layout, so consumers relying on it should validate the result.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>")]
pub struct DepthBlock(Vec<u8>);

/// Rejects anything but exactly [`DEPTH_BLOCK_LEN`] bytes.
impl TryFrom<Vec<u8>> for DepthBlock {
    type Error = String;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        if bytes.len() != DEPTH_BLOCK_LEN {
            return Err(format!(
                "depth block must be {DEPTH_BLOCK_LEN} bytes, got {}",
                bytes.len()
            ));
        }
        Ok(Self(bytes))
    }
}

impl DepthBlock {
    /// Wrap exactly [`DEPTH_BLOCK_LEN`] bytes.
    #[must_use]
    pub fn new(bytes: [u8; DEPTH_BLOCK_LEN]) -> Self {
        Self(bytes.to_vec())
    }

    /// An all-zero block.
    #[must_use]
    pub fn empty() -> Self {
        Self(vec![0; DEPTH_BLOCK_LEN])
    }

    /// The raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Interpret the block as best-five bids and asks.
    ///
    /// Each packet is `flag:i16, quantity:i64, price:i64, orders:i16`
    /// (little-endian, price scaled by 100). Flag `1` marks a buy level.
    /// All-zero packets are skipped.
    #[must_use]
    pub fn levels(&self) -> BestFive {
        let mut best = BestFive::default();

        for packet in self.0.chunks_exact(DEPTH_PACKET_LEN) {
            if packet.iter().all(|b| *b == 0) {
                continue;
            }

            let flag = i16::from_le_bytes([packet[0], packet[1]]);
            let quantity = i64::from_le_bytes(le8(&packet[2..10]));
            let price = i64::from_le_bytes(le8(&packet[10..18]));
            let orders = i16::from_le_bytes([packet[18], packet[19]]);

            let level = DepthLevel {
                quantity,
                price: Decimal::new(price, 2),
                orders,
            };

            if flag == 1 {
                best.bids.push(level);
            } else {
                best.asks.push(level);
            }
        }

        best
    }
}

fn le8(bytes: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(bytes);
    out
}

impl fmt::Debug for DepthBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DepthBlock")
            .field("len", &self.0.len())
            .finish_non_exhaustive()
    }
}

/// One price level of the best-five book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthLevel {
    /// Quantity at this level.
    pub quantity: i64,
    /// Price of this level.
    pub price: Decimal,
    /// Number of orders at this level.
    pub orders: i16,
}

/// Best-five bid/ask levels decoded from a [`DepthBlock`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BestFive {
    /// Buy levels in packet order.
    pub bids: Vec<DepthLevel>,
    /// Sell levels in packet order.
    pub asks: Vec<DepthLevel>,
}
