//! Binary Tick Codec
//!
//! Decodes the provider's fixed-layout binary tick frames. All integers
//! are little-endian; prices travel as integers scaled by 100.
//!
//! # Frame Layout
//!
//! | Offset | Size | Field |
//! |---|---|---|
//! | 0 | 1 | mode (1=LTP, 2=QUOTE, 3=SNAP_QUOTE) |
//! | 1 | 1 | exchange segment |
//! | 2 | 25 | token (ASCII, NUL-padded) |
//! | 27 | 8 | sequence number |
//! | 35 | 8 | exchange timestamp (ms) |
//! | 43 | 8 | last traded price |
//! | 51 | 72 | QUOTE: ltq, atp, volume, total buy qty (f64), total sell qty (f64), open, high, low, close |
//! | 123 | 24 | SNAP_QUOTE: last traded timestamp, open interest, reserved |
//! | 147 | 200 | SNAP_QUOTE: best-five depth block |
//! | 347 | 32 | SNAP_QUOTE: upper circuit, lower circuit, 52w high, 52w low |
//!
//! A frame must be at least as long as its declared mode requires;
//! shorter frames are rejected whole, never partially parsed.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::domain::tick::{
    DEPTH_BLOCK_LEN, DepthBlock, ExchangeSegment, LTP_FRAME_LEN, QuoteFields, SnapQuoteFields,
    SubscriptionMode, Tick,
};

/// Width of the NUL-padded token field.
pub const TOKEN_FIELD_LEN: usize = 25;

const PRICE_SCALE: u32 = 2;

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while decoding a binary frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Frame shorter than its mode requires.
    #[error("frame too short for {mode:?}: expected {expected} bytes, was {actual}")]
    Truncated {
        /// Mode the frame declared, if it got that far.
        mode: Option<SubscriptionMode>,
        /// Minimum length required.
        expected: usize,
        /// Actual frame length.
        actual: usize,
    },

    /// Mode byte is not one of the known modes.
    #[error("unknown subscription mode {0}")]
    UnknownMode(u8),

    /// Token field is not valid ASCII/UTF-8.
    #[error("token field is not valid UTF-8")]
    InvalidToken,
}

/// Errors raised while encoding a tick into a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// Token does not fit the fixed-width field.
    #[error("token '{0}' exceeds {TOKEN_FIELD_LEN} bytes")]
    TokenTooLong(String),

    /// Price cannot be represented as a scaled 64-bit integer.
    #[error("price {0} cannot be scaled to a 64-bit integer")]
    PriceOutOfRange(Decimal),

    /// Tick fields do not match its declared mode.
    #[error("tick in {0} mode is missing fields for that mode")]
    MissingFields(SubscriptionMode),
}

// =============================================================================
// Frame Cursor
// =============================================================================

/// Bounds-checked little-endian reader over a frame.
#[derive(Debug)]
struct FrameCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FrameCursor<'a> {
    const fn new_at(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn read_i64(&mut self) -> i64 {
        i64::from_le_bytes(self.take::<8>())
    }

    fn read_f64(&mut self) -> f64 {
        f64::from_le_bytes(self.take::<8>())
    }

    fn read_price(&mut self) -> Decimal {
        Decimal::new(self.read_i64(), PRICE_SCALE)
    }

    fn skip(&mut self, n: usize) {
        self.pos += n;
    }
}

// =============================================================================
// Decode
// =============================================================================

/// Decode one binary frame into a [`Tick`].
///
/// Lengths are checked up front against the declared mode, so the field
/// reads below never run past the buffer.
///
/// # Errors
///
/// Returns [`DecodeError`] for frames shorter than 51 bytes, frames shorter
/// than their declared mode requires, unknown modes, or a non-UTF-8 token.
pub fn decode(buf: &[u8]) -> Result<Tick, DecodeError> {
    if buf.len() < LTP_FRAME_LEN {
        return Err(DecodeError::Truncated {
            mode: buf.first().copied().and_then(SubscriptionMode::from_code),
            expected: LTP_FRAME_LEN,
            actual: buf.len(),
        });
    }

    let mode = SubscriptionMode::from_code(buf[0]).ok_or(DecodeError::UnknownMode(buf[0]))?;

    if buf.len() < mode.frame_len() {
        return Err(DecodeError::Truncated {
            mode: Some(mode),
            expected: mode.frame_len(),
            actual: buf.len(),
        });
    }

    let exchange_segment = ExchangeSegment(buf[1]);
    let token = decode_token(&buf[2..2 + TOKEN_FIELD_LEN])?;

    let mut cursor = FrameCursor::new_at(buf, 2 + TOKEN_FIELD_LEN);
    let sequence_number = cursor.read_i64();
    let exchange_timestamp_ms = cursor.read_i64();
    let last_traded_price = cursor.read_price();

    let mut tick = Tick {
        mode,
        exchange_segment,
        token,
        sequence_number,
        exchange_timestamp_ms,
        last_traded_price,
        quote: None,
        snap_quote: None,
    };

    if mode == SubscriptionMode::Ltp {
        return Ok(tick);
    }

    tick.quote = Some(QuoteFields {
        last_traded_quantity: cursor.read_i64(),
        average_traded_price: cursor.read_price(),
        volume: cursor.read_i64(),
        total_buy_quantity: cursor.read_f64(),
        total_sell_quantity: cursor.read_f64(),
        open: cursor.read_price(),
        high: cursor.read_price(),
        low: cursor.read_price(),
        close: cursor.read_price(),
    });

    if mode == SubscriptionMode::Quote {
        return Ok(tick);
    }

    let last_traded_timestamp_ms = cursor.read_i64();
    let open_interest = cursor.read_i64();
    // reserved
    cursor.skip(8);
    let depth = DepthBlock::new(cursor.take::<DEPTH_BLOCK_LEN>());

    tick.snap_quote = Some(SnapQuoteFields {
        last_traded_timestamp_ms,
        open_interest,
        depth,
        upper_circuit: cursor.read_price(),
        lower_circuit: cursor.read_price(),
        fifty_two_week_high: cursor.read_price(),
        fifty_two_week_low: cursor.read_price(),
    });

    Ok(tick)
}

fn decode_token(field: &[u8]) -> Result<String, DecodeError> {
    let end = field
        .iter()
        .rposition(|b| *b != 0)
        .map_or(0, |last| last + 1);

    std::str::from_utf8(&field[..end])
        .map(ToString::to_string)
        .map_err(|_| DecodeError::InvalidToken)
}

// =============================================================================
// Encode
// =============================================================================

/// Encode a [`Tick`] into a frame of exactly its mode's length.
///
/// Used by replay tooling and tests; the live client only decodes.
///
/// # Errors
///
/// Returns [`EncodeError`] if the token is too long, a price does not fit
/// a scaled `i64`, or the tick lacks the fields its mode requires.
pub fn encode(tick: &Tick) -> Result<Vec<u8>, EncodeError> {
    let token = tick.token.as_bytes();
    if token.len() > TOKEN_FIELD_LEN {
        return Err(EncodeError::TokenTooLong(tick.token.clone()));
    }

    let mut buf = Vec::with_capacity(tick.mode.frame_len());
    buf.push(tick.mode.code());
    buf.push(tick.exchange_segment.code());
    buf.extend_from_slice(token);
    buf.resize(2 + TOKEN_FIELD_LEN, 0);
    buf.extend_from_slice(&tick.sequence_number.to_le_bytes());
    buf.extend_from_slice(&tick.exchange_timestamp_ms.to_le_bytes());
    put_price(&mut buf, tick.last_traded_price)?;

    if tick.mode == SubscriptionMode::Ltp {
        return Ok(buf);
    }

    let quote = tick
        .quote
        .as_ref()
        .ok_or(EncodeError::MissingFields(tick.mode))?;
    buf.extend_from_slice(&quote.last_traded_quantity.to_le_bytes());
    put_price(&mut buf, quote.average_traded_price)?;
    buf.extend_from_slice(&quote.volume.to_le_bytes());
    buf.extend_from_slice(&quote.total_buy_quantity.to_le_bytes());
    buf.extend_from_slice(&quote.total_sell_quantity.to_le_bytes());
    for price in [quote.open, quote.high, quote.low, quote.close] {
        put_price(&mut buf, price)?;
    }

    if tick.mode == SubscriptionMode::Quote {
        return Ok(buf);
    }

    let snap = tick
        .snap_quote
        .as_ref()
        .ok_or(EncodeError::MissingFields(tick.mode))?;
    buf.extend_from_slice(&snap.last_traded_timestamp_ms.to_le_bytes());
    buf.extend_from_slice(&snap.open_interest.to_le_bytes());
    buf.extend_from_slice(&0i64.to_le_bytes());
    buf.extend_from_slice(snap.depth.as_bytes());
    for price in [
        snap.upper_circuit,
        snap.lower_circuit,
        snap.fifty_two_week_high,
        snap.fifty_two_week_low,
    ] {
        put_price(&mut buf, price)?;
    }

    Ok(buf)
}

fn put_price(buf: &mut Vec<u8>, price: Decimal) -> Result<(), EncodeError> {
    let scaled = (price * Decimal::ONE_HUNDRED)
        .trunc()
        .to_i64()
        .ok_or(EncodeError::PriceOutOfRange(price))?;
    buf.extend_from_slice(&scaled.to_le_bytes());
    Ok(())
}
