//! Mapping of comparable values onto a common number line, so that a value can be
//! placed inside a histogram bucket by linear interpolation.

use std::net::IpAddr;

use crate::datum::{DataType, Datum, TypeCategory, DAYS_PER_MONTH, SECS_PER_DAY};

/// Only this many leading characters of a string take part in the conversion.
const MAX_STRING_CHARS: usize = 20;
const MAX_BYTEA_BYTES: usize = 10;

/// Converts `value` and the two bounds of its histogram bucket to doubles.
///
/// Returns `(value, lobound, hibound)`, or `None` when the types can not be converted;
/// callers then fall back to the middle of the bucket.
pub fn convert_to_scalar(
    value: &Datum,
    valuetype: DataType,
    lobound: &Datum,
    hibound: &Datum,
    boundstype: DataType,
) -> Option<(f64, f64, f64)> {
    match valuetype.category() {
        TypeCategory::Boolean | TypeCategory::Numeric => Some((
            convert_numeric_to_scalar(value)?,
            convert_numeric_to_scalar(lobound)?,
            convert_numeric_to_scalar(hibound)?,
        )),
        TypeCategory::String => {
            if !boundstype.is_string() {
                return None;
            }
            Some(convert_string_to_scalar(
                value.as_bytes()?,
                lobound.as_bytes()?,
                hibound.as_bytes()?,
            ))
        }
        TypeCategory::Bytes => match (value, lobound, hibound) {
            (Datum::Bytea(v), Datum::Bytea(lo), Datum::Bytea(hi)) => {
                Some(convert_bytea_to_scalar(v, lo, hi))
            }
            _ => None,
        },
        TypeCategory::DateTime => Some((
            convert_timevalue_to_scalar(value)?,
            convert_timevalue_to_scalar(lobound)?,
            convert_timevalue_to_scalar(hibound)?,
        )),
        TypeCategory::Network => Some((
            convert_network_to_scalar(value)?,
            convert_network_to_scalar(lobound)?,
            convert_network_to_scalar(hibound)?,
        )),
    }
}

fn convert_numeric_to_scalar(value: &Datum) -> Option<f64> {
    match value {
        Datum::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Datum::Int2(v) => Some(*v as f64),
        Datum::Int4(v) => Some(*v as f64),
        Datum::Int8(v) => Some(*v as f64),
        Datum::Float4(v) => Some(*v as f64),
        Datum::Float8(v) | Datum::Numeric(v) => Some(*v),
        Datum::Oid(v) => Some(*v as f64),
        _ => None,
    }
}

/// Strings are read as fractions in base `rangehi - rangelo + 1`, with the range taken
/// from the bytes seen in the bounds and widened to whole character classes.
fn convert_string_to_scalar(value: &[u8], lobound: &[u8], hibound: &[u8]) -> (f64, f64, f64) {
    let mut rangelo = hibound.first().copied().unwrap_or(0);
    let mut rangehi = rangelo;
    for &c in lobound.iter().chain(hibound.iter()) {
        rangelo = rangelo.min(c);
        rangehi = rangehi.max(c);
    }
    for (lo, hi) in [(b'A', b'Z'), (b'a', b'z'), (b'0', b'9')] {
        if rangelo <= hi && rangehi >= lo {
            rangelo = rangelo.min(lo);
            rangehi = rangehi.max(hi);
        }
    }
    if rangehi - rangelo < 9 {
        rangelo = b' ';
        rangehi = 127;
    }

    let common = common_prefix_len(value, lobound, hibound);
    (
        convert_one_string_to_scalar(&value[common..], rangelo, rangehi),
        convert_one_string_to_scalar(&lobound[common..], rangelo, rangehi),
        convert_one_string_to_scalar(&hibound[common..], rangelo, rangehi),
    )
}

fn common_prefix_len(value: &[u8], lobound: &[u8], hibound: &[u8]) -> usize {
    value
        .iter()
        .zip(lobound)
        .zip(hibound)
        .take_while(|((v, lo), hi)| v == lo && lo == hi)
        .count()
}

fn convert_one_string_to_scalar(value: &[u8], rangelo: u8, rangehi: u8) -> f64 {
    let base = rangehi as f64 - rangelo as f64 + 1.0;
    let lo = rangelo as f64;
    let hi = rangehi as f64;
    let mut num = 0.0;
    let mut denom = base;
    for &c in value.iter().take(MAX_STRING_CHARS) {
        let c = (c as f64).max(lo - 1.0).min(hi + 1.0);
        num += (c - lo) / denom;
        denom *= base;
    }
    num
}

fn convert_bytea_to_scalar(value: &[u8], lobound: &[u8], hibound: &[u8]) -> (f64, f64, f64) {
    let common = common_prefix_len(value, lobound, hibound);
    (
        convert_one_bytea_to_scalar(&value[common..]),
        convert_one_bytea_to_scalar(&lobound[common..]),
        convert_one_bytea_to_scalar(&hibound[common..]),
    )
}

fn convert_one_bytea_to_scalar(value: &[u8]) -> f64 {
    let mut num = 0.0;
    let mut denom = 256.0;
    for &c in value.iter().take(MAX_BYTEA_BYTES) {
        num += c as f64 / denom;
        denom *= 256.0;
    }
    num
}

/// Seconds, with dates at day granularity and months at their average length.
fn convert_timevalue_to_scalar(value: &Datum) -> Option<f64> {
    match value {
        Datum::Timestamp(v) | Datum::Time(v) => Some(*v),
        Datum::Date(d) => Some(*d as f64 * SECS_PER_DAY),
        Datum::TimeTz { time, zone } => Some(time + *zone as f64),
        Datum::Interval { time, months } => {
            Some(time + *months as f64 * (DAYS_PER_MONTH * SECS_PER_DAY))
        }
        _ => None,
    }
}

/// Address family first, then the leading address bytes in base 256.
fn convert_network_to_scalar(value: &Datum) -> Option<f64> {
    match value {
        Datum::Inet { addr, .. } => {
            let (family, octets, len) = match addr {
                IpAddr::V4(v4) => (2.0, v4.octets().to_vec(), 4),
                IpAddr::V6(v6) => (3.0, v6.octets().to_vec(), 5),
            };
            Some(
                octets
                    .iter()
                    .take(len)
                    .fold(family, |acc, b| acc * 256.0 + *b as f64),
            )
        }
        Datum::MacAddr(m) => Some(m.iter().fold(0.0, |acc, b| acc * 256.0 + *b as f64)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn text(s: &str) -> Datum {
        Datum::text(s)
    }

    #[test]
    fn test_numeric() {
        let (v, lo, hi) = convert_to_scalar(
            &Datum::Int4(15),
            DataType::Int4,
            &Datum::Int8(10),
            &Datum::Float8(20.0),
            DataType::Int8,
        )
        .unwrap();
        assert_eq!((v, lo, hi), (15.0, 10.0, 20.0));
    }

    #[test]
    fn test_string_interpolates_between_bounds() {
        let (v, lo, hi) = convert_to_scalar(
            &text("m"),
            DataType::Text,
            &text("a"),
            &text("z"),
            DataType::Text,
        )
        .unwrap();
        assert!(lo < v && v < hi);
        let frac = (v - lo) / (hi - lo);
        assert!((frac - 12.0 / 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_string_common_prefix_is_stripped() {
        let (v, lo, hi) = convert_to_scalar(
            &text("abcm"),
            DataType::Text,
            &text("abca"),
            &text("abcz"),
            DataType::Text,
        )
        .unwrap();
        let frac = (v - lo) / (hi - lo);
        assert!((frac - 12.0 / 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_narrow_range_widens_to_printable() {
        // bounds only span 'a'..'c', widened to the whole lowercase class
        let (_, lo, hi) = convert_to_scalar(
            &text("b"),
            DataType::Text,
            &text("a"),
            &text("c"),
            DataType::Text,
        )
        .unwrap();
        assert!((hi - lo - 2.0 / 26.0).abs() < 1e-9);

        // punctuation only: range under 10, so ' '..127
        let (_, lo, hi) = convert_to_scalar(
            &text("#"),
            DataType::Text,
            &text("!"),
            &text("%"),
            DataType::Text,
        )
        .unwrap();
        assert!((hi - lo - 4.0 / 96.0).abs() < 1e-9);
    }

    #[test]
    fn test_mismatched_families() {
        assert!(convert_to_scalar(
            &text("a"),
            DataType::Text,
            &Datum::Int4(1),
            &Datum::Int4(2),
            DataType::Int4,
        )
        .is_none());
    }

    #[test]
    fn test_time_values() {
        let (v, lo, hi) = convert_to_scalar(
            &Datum::Date(2),
            DataType::Date,
            &Datum::Timestamp(0.0),
            &Datum::Timestamp(4.0 * SECS_PER_DAY),
            DataType::Timestamp,
        )
        .unwrap();
        assert_eq!((v - lo) / (hi - lo), 0.5);

        let month = convert_timevalue_to_scalar(&Datum::Interval {
            time: 0.0,
            months: 12,
        })
        .unwrap();
        assert!((month - 365.25 * SECS_PER_DAY).abs() < 1e-6);
    }

    #[test]
    fn test_network() {
        let v4 = convert_network_to_scalar(&Datum::Inet {
            addr: IpAddr::V4(Ipv4Addr::new(0, 0, 1, 0)),
            bits: 32,
        })
        .unwrap();
        assert_eq!(v4, 2.0 * 256f64.powi(4) + 256.0);
        let mac = convert_network_to_scalar(&Datum::MacAddr([0, 0, 0, 0, 1, 1])).unwrap();
        assert_eq!(mac, 257.0);
    }

    #[test]
    fn test_bytea() {
        let (v, lo, hi) = convert_to_scalar(
            &Datum::Bytea(vec![1, 128]),
            DataType::Bytea,
            &Datum::Bytea(vec![1, 0]),
            &Datum::Bytea(vec![1, 255]),
            DataType::Bytea,
        )
        .unwrap();
        assert!((v - 128.0 / 256.0).abs() < 1e-12);
        assert_eq!(lo, 0.0);
        assert!((hi - 255.0 / 256.0).abs() < 1e-12);
    }
}
