//! Candle Domain Types
//!
//! Canonical OHLCV record and the normalization step that produces it
//! from a decoded exchange event. Normalization is a pure function:
//! every input yields either a valid `CandleRecord` or a
//! [`RejectReason`] from a closed enumeration.
//!
//! # Time unit
//!
//! `CandleRecord::time_ms` is integer epoch **milliseconds** and stays in
//! milliseconds through the whole pipeline. The single conversion to a
//! database timestamp happens in the sink's INSERT statement (see
//! `infrastructure::postgres`). Nothing else rescales.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Decoded exchange event, produced by the envelope codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandleUpdate {
    /// A kline event carrying raw (unvalidated) candle fields.
    Kline(KlineFields),
    /// Structurally valid message without a kline payload
    /// (control frames, subscription acks, other event types).
    Irrelevant,
    /// Payload that could not be parsed at all.
    Malformed,
}

/// Raw kline fields as they appear on the wire, before validation.
///
/// All fields are optional: presence is checked during normalization so
/// that missing fields produce a [`RejectReason`] instead of a decode
/// error. Field names follow the exchange's single-letter convention.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct KlineFields {
    /// Kline start time, epoch milliseconds.
    #[serde(rename = "t")]
    pub start_time_ms: Option<i64>,
    /// Trading symbol.
    #[serde(rename = "s")]
    pub symbol: Option<String>,
    /// Open price (exchange-native string encoding).
    #[serde(rename = "o")]
    pub open: Option<String>,
    /// High price.
    #[serde(rename = "h")]
    pub high: Option<String>,
    /// Low price.
    #[serde(rename = "l")]
    pub low: Option<String>,
    /// Close price.
    #[serde(rename = "c")]
    pub close: Option<String>,
    /// Base asset volume.
    #[serde(rename = "v")]
    pub volume: Option<String>,
}

/// Canonical unit of work flowing through the pipeline.
///
/// Invariants (enforced by [`normalize`]): `symbol` is non-empty,
/// `time_ms` is positive, all five price/volume fields parsed as
/// decimals. Read-only after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandleRecord {
    /// Kline start time, epoch milliseconds.
    pub time_ms: i64,
    /// Trading symbol, e.g. `BTCUSDT`.
    pub symbol: String,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Base asset volume.
    pub volume: Decimal,
}

/// Why a decoded update did not become a `CandleRecord`.
///
/// Closed enumeration; used as a metrics label, so variants map to
/// stable strings via [`RejectReason::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    /// Payload could not be parsed.
    #[error("malformed payload")]
    Malformed,
    /// Valid message without a kline payload.
    #[error("irrelevant payload")]
    Irrelevant,
    /// A required kline field was absent.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    /// A numeric field failed decimal conversion.
    #[error("unparseable number in field: {0}")]
    BadNumber(&'static str),
    /// Symbol field present but empty.
    #[error("empty symbol")]
    EmptySymbol,
    /// Start time missing, zero, or negative.
    #[error("bad start timestamp")]
    BadTimestamp,
}

impl RejectReason {
    /// Stable label for metrics and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Irrelevant => "irrelevant",
            Self::MissingField(_) => "missing_field",
            Self::BadNumber(_) => "bad_number",
            Self::EmptySymbol => "empty_symbol",
            Self::BadTimestamp => "bad_timestamp",
        }
    }
}

/// Normalize a decoded update into a canonical `CandleRecord`.
///
/// Pure function, no I/O. `Irrelevant` and `Malformed` updates pass
/// through as rejections with distinct reasons so the caller can count
/// them separately.
///
/// # Errors
///
/// Returns a [`RejectReason`] when any required field is absent, the
/// symbol is empty, the timestamp is non-positive, or a numeric field
/// fails decimal conversion.
pub fn normalize(update: CandleUpdate) -> Result<CandleRecord, RejectReason> {
    let fields = match update {
        CandleUpdate::Kline(fields) => fields,
        CandleUpdate::Irrelevant => return Err(RejectReason::Irrelevant),
        CandleUpdate::Malformed => return Err(RejectReason::Malformed),
    };

    let time_ms = fields.start_time_ms.ok_or(RejectReason::BadTimestamp)?;
    if time_ms <= 0 {
        return Err(RejectReason::BadTimestamp);
    }

    let symbol = fields.symbol.ok_or(RejectReason::MissingField("s"))?;
    if symbol.is_empty() {
        return Err(RejectReason::EmptySymbol);
    }

    Ok(CandleRecord {
        time_ms,
        symbol,
        open: parse_decimal(fields.open.as_deref(), "o")?,
        high: parse_decimal(fields.high.as_deref(), "h")?,
        low: parse_decimal(fields.low.as_deref(), "l")?,
        close: parse_decimal(fields.close.as_deref(), "c")?,
        volume: parse_decimal(fields.volume.as_deref(), "v")?,
    })
}

fn parse_decimal(raw: Option<&str>, field: &'static str) -> Result<Decimal, RejectReason> {
    let raw = raw.ok_or(RejectReason::MissingField(field))?;
    raw.trim()
        .parse::<Decimal>()
        .map_err(|_| RejectReason::BadNumber(field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn full_fields() -> KlineFields {
        KlineFields {
            start_time_ms: Some(1_700_000_000_000),
            symbol: Some("BTCUSDT".to_string()),
            open: Some("100".to_string()),
            high: Some("110".to_string()),
            low: Some("90".to_string()),
            close: Some("105".to_string()),
            volume: Some("10".to_string()),
        }
    }

    #[test]
    fn normalize_valid_kline() {
        let record = normalize(CandleUpdate::Kline(full_fields())).unwrap();

        assert_eq!(record.time_ms, 1_700_000_000_000);
        assert_eq!(record.symbol, "BTCUSDT");
        assert_eq!(record.open, Decimal::from(100));
        assert_eq!(record.high, Decimal::from(110));
        assert_eq!(record.low, Decimal::from(90));
        assert_eq!(record.close, Decimal::from(105));
        assert_eq!(record.volume, Decimal::from(10));
    }

    #[test]
    fn normalize_is_deterministic() {
        let a = normalize(CandleUpdate::Kline(full_fields()));
        let b = normalize(CandleUpdate::Kline(full_fields()));
        assert_eq!(a, b);
    }

    #[test]
    fn normalize_passes_through_irrelevant_and_malformed() {
        assert_eq!(
            normalize(CandleUpdate::Irrelevant),
            Err(RejectReason::Irrelevant)
        );
        assert_eq!(
            normalize(CandleUpdate::Malformed),
            Err(RejectReason::Malformed)
        );
    }

    #[test]
    fn normalize_rejects_missing_timestamp() {
        let mut fields = full_fields();
        fields.start_time_ms = None;
        assert_eq!(
            normalize(CandleUpdate::Kline(fields)),
            Err(RejectReason::BadTimestamp)
        );
    }

    #[test_case(0; "zero")]
    #[test_case(-1; "negative")]
    fn normalize_rejects_non_positive_timestamp(ts: i64) {
        let mut fields = full_fields();
        fields.start_time_ms = Some(ts);
        assert_eq!(
            normalize(CandleUpdate::Kline(fields)),
            Err(RejectReason::BadTimestamp)
        );
    }

    #[test]
    fn normalize_rejects_missing_symbol() {
        let mut fields = full_fields();
        fields.symbol = None;
        assert_eq!(
            normalize(CandleUpdate::Kline(fields)),
            Err(RejectReason::MissingField("s"))
        );
    }

    #[test]
    fn normalize_rejects_empty_symbol() {
        let mut fields = full_fields();
        fields.symbol = Some(String::new());
        assert_eq!(
            normalize(CandleUpdate::Kline(fields)),
            Err(RejectReason::EmptySymbol)
        );
    }

    #[test]
    fn normalize_rejects_missing_price_field() {
        let mut fields = full_fields();
        fields.close = None;
        assert_eq!(
            normalize(CandleUpdate::Kline(fields)),
            Err(RejectReason::MissingField("c"))
        );
    }

    #[test]
    fn normalize_rejects_unparseable_number() {
        let mut fields = full_fields();
        fields.volume = Some("not-a-number".to_string());
        assert_eq!(
            normalize(CandleUpdate::Kline(fields)),
            Err(RejectReason::BadNumber("v"))
        );
    }

    #[test]
    fn reject_reason_labels_are_stable() {
        assert_eq!(RejectReason::Malformed.as_str(), "malformed");
        assert_eq!(RejectReason::Irrelevant.as_str(), "irrelevant");
        assert_eq!(RejectReason::MissingField("o").as_str(), "missing_field");
        assert_eq!(RejectReason::BadNumber("v").as_str(), "bad_number");
        assert_eq!(RejectReason::EmptySymbol.as_str(), "empty_symbol");
        assert_eq!(RejectReason::BadTimestamp.as_str(), "bad_timestamp");
    }
}
