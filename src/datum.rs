//! Typed scalar values as they appear in constants and statistics slots.

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::net::IpAddr;

use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumIter, EnumString};

pub type Oid = u32;
pub const INVALID_OID: Oid = 0;

/// Seconds per day, used when flattening dates and intervals.
pub const SECS_PER_DAY: f64 = 86400.0;
/// Average days per month: 365.25 / 12.
pub const DAYS_PER_MONTH: f64 = 365.25 / 12.0;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    StrumDisplay,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DataType {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Oid,
    Char,
    Name,
    Text,
    Varchar,
    Bpchar,
    Bytea,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    TimeTz,
    Interval,
    Inet,
    Cidr,
    MacAddr,
}

/// Families that `convert_to_scalar` knows how to map to a number line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeCategory {
    Boolean,
    Numeric,
    String,
    Bytes,
    DateTime,
    Network,
}

impl DataType {
    pub fn category(&self) -> TypeCategory {
        use DataType::*;
        match self {
            Bool => TypeCategory::Boolean,
            Int2 | Int4 | Int8 | Float4 | Float8 | Numeric | Oid => TypeCategory::Numeric,
            Char | Name | Text | Varchar | Bpchar => TypeCategory::String,
            Bytea => TypeCategory::Bytes,
            Timestamp | TimestampTz | Date | Time | TimeTz | Interval => TypeCategory::DateTime,
            Inet | Cidr | MacAddr => TypeCategory::Network,
        }
    }

    pub fn is_string(&self) -> bool {
        self.category() == TypeCategory::String
    }

    /// Average stored width in bytes; variable length types use a flat guess.
    pub fn default_width(&self) -> i32 {
        use DataType::*;
        match self {
            Bool | Char => 1,
            Int2 => 2,
            Int4 | Float4 | Oid | Date => 4,
            Int8 | Float8 | Timestamp | TimestampTz | Time => 8,
            TimeTz => 12,
            Interval => 16,
            MacAddr => 6,
            Name => 64,
            Numeric | Text | Varchar | Bpchar | Bytea | Inet | Cidr => 32,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, EnumAsInner)]
#[serde(rename_all = "lowercase")]
pub enum Datum {
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Numeric(f64),
    Oid(u32),
    /// Single byte "char".
    Char(u8),
    /// Any of text, varchar, bpchar, name.
    Text(String),
    Bytea(Vec<u8>),
    /// Seconds since epoch, with or without zone.
    Timestamp(f64),
    /// Days since epoch.
    Date(i32),
    /// Seconds since midnight.
    Time(f64),
    TimeTz {
        time: f64,
        zone: i32,
    },
    Interval {
        time: f64,
        months: i32,
    },
    Inet {
        addr: IpAddr,
        bits: u8,
    },
    MacAddr([u8; 6]),
}

impl Datum {
    pub fn text<S: Into<String>>(s: S) -> Self {
        Datum::Text(s.into())
    }

    /// Raw bytes of string-like values.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Datum::Text(s) => Some(s.as_bytes()),
            Datum::Bytea(b) => Some(b.as_slice()),
            Datum::Char(c) => Some(std::slice::from_ref(c)),
            _ => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Datum::Int2(v) => Some(*v as f64),
            Datum::Int4(v) => Some(*v as f64),
            Datum::Int8(v) => Some(*v as f64),
            Datum::Float4(v) => Some(*v as f64),
            Datum::Float8(v) | Datum::Numeric(v) => Some(*v),
            Datum::Oid(v) => Some(*v as f64),
            _ => None,
        }
    }

    fn as_integer(&self) -> Option<i64> {
        match self {
            Datum::Int2(v) => Some(*v as i64),
            Datum::Int4(v) => Some(*v as i64),
            Datum::Int8(v) => Some(*v),
            Datum::Oid(v) => Some(*v as i64),
            _ => None,
        }
    }

    fn as_instant(&self) -> Option<f64> {
        match self {
            Datum::Timestamp(v) => Some(*v),
            Datum::Date(d) => Some(*d as f64 * SECS_PER_DAY),
            _ => None,
        }
    }

    /// Orders two values of compatible families. `None` when they can not be compared.
    pub fn compare(&self, other: &Datum) -> Option<Ordering> {
        use Datum::*;
        match (self, other) {
            (Bool(l), Bool(r)) => Some(l.cmp(r)),
            (Text(l), Text(r)) => Some(l.as_bytes().cmp(r.as_bytes())),
            (Char(l), Char(r)) => Some(l.cmp(r)),
            (Bytea(l), Bytea(r)) => Some(l.cmp(r)),
            (Time(l), Time(r)) => l.partial_cmp(r),
            (TimeTz { time: l, zone: lz }, TimeTz { time: r, zone: rz }) => {
                (l + *lz as f64).partial_cmp(&(r + *rz as f64))
            }
            (Interval { time: l, months: lm }, Interval { time: r, months: rm }) => {
                let l = l + *lm as f64 * 30.0 * SECS_PER_DAY;
                let r = r + *rm as f64 * 30.0 * SECS_PER_DAY;
                l.partial_cmp(&r)
            }
            (Inet { addr: l, bits: lb }, Inet { addr: r, bits: rb }) => {
                Some(inet_key(l).cmp(&inet_key(r)).then(lb.cmp(rb)))
            }
            (MacAddr(l), MacAddr(r)) => Some(l.cmp(r)),
            _ => {
                if let (Some(l), Some(r)) = (self.as_integer(), other.as_integer()) {
                    return Some(l.cmp(&r));
                }
                if let (Some(l), Some(r)) = (self.as_number(), other.as_number()) {
                    return l.partial_cmp(&r);
                }
                if let (Some(l), Some(r)) = (self.as_instant(), other.as_instant()) {
                    return l.partial_cmp(&r);
                }
                None
            }
        }
    }
}

fn inet_key(addr: &IpAddr) -> (u8, Vec<u8>) {
    match addr {
        IpAddr::V4(v4) => (2, v4.octets().to_vec()),
        IpAddr::V6(v6) => (3, v6.octets().to_vec()),
    }
}

/// Bitwise equality so that `Datum` can key hash maps and path keys.
impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        use Datum::*;
        match (self, other) {
            (Bool(l), Bool(r)) => l == r,
            (Int2(l), Int2(r)) => l == r,
            (Int4(l), Int4(r)) => l == r,
            (Int8(l), Int8(r)) => l == r,
            (Float4(l), Float4(r)) => l.to_bits() == r.to_bits(),
            (Float8(l), Float8(r)) | (Numeric(l), Numeric(r)) => l.to_bits() == r.to_bits(),
            (Oid(l), Oid(r)) => l == r,
            (Char(l), Char(r)) => l == r,
            (Text(l), Text(r)) => l == r,
            (Bytea(l), Bytea(r)) => l == r,
            (Timestamp(l), Timestamp(r)) | (Time(l), Time(r)) => l.to_bits() == r.to_bits(),
            (Date(l), Date(r)) => l == r,
            (TimeTz { time: l, zone: lz }, TimeTz { time: r, zone: rz }) => {
                l.to_bits() == r.to_bits() && lz == rz
            }
            (Interval { time: l, months: lm }, Interval { time: r, months: rm }) => {
                l.to_bits() == r.to_bits() && lm == rm
            }
            (Inet { addr: l, bits: lb }, Inet { addr: r, bits: rb }) => l == r && lb == rb,
            (MacAddr(l), MacAddr(r)) => l == r,
            _ => false,
        }
    }
}

impl Eq for Datum {}

impl Hash for Datum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Datum::Bool(v) => v.hash(state),
            Datum::Int2(v) => v.hash(state),
            Datum::Int4(v) => v.hash(state),
            Datum::Int8(v) => v.hash(state),
            Datum::Float4(v) => v.to_bits().hash(state),
            Datum::Float8(v) | Datum::Numeric(v) | Datum::Timestamp(v) | Datum::Time(v) => {
                v.to_bits().hash(state)
            }
            Datum::Oid(v) => v.hash(state),
            Datum::Char(v) => v.hash(state),
            Datum::Text(v) => v.hash(state),
            Datum::Bytea(v) => v.hash(state),
            Datum::Date(v) => v.hash(state),
            Datum::TimeTz { time, zone } => {
                time.to_bits().hash(state);
                zone.hash(state);
            }
            Datum::Interval { time, months } => {
                time.to_bits().hash(state);
                months.hash(state);
            }
            Datum::Inet { addr, bits } => {
                addr.hash(state);
                bits.hash(state);
            }
            Datum::MacAddr(v) => v.hash(state),
        }
    }
}

impl Display for Datum {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Datum::Bool(v) => write!(f, "{}", v),
            Datum::Int2(v) => write!(f, "{}", v),
            Datum::Int4(v) => write!(f, "{}", v),
            Datum::Int8(v) => write!(f, "{}", v),
            Datum::Float4(v) => write!(f, "{}", v),
            Datum::Float8(v) | Datum::Numeric(v) => write!(f, "{}", v),
            Datum::Oid(v) => write!(f, "{}", v),
            Datum::Char(v) => write!(f, "'{}'", *v as char),
            Datum::Text(v) => write!(f, "'{}'", v),
            Datum::Bytea(v) => write!(f, "{:?}", v),
            Datum::Timestamp(v) => write!(f, "timestamp {}", v),
            Datum::Date(v) => write!(f, "date {}", v),
            Datum::Time(v) => write!(f, "time {}", v),
            Datum::TimeTz { time, zone } => write!(f, "timetz {}{:+}", time, zone),
            Datum::Interval { time, months } => write!(f, "interval {} mons {}", months, time),
            Datum::Inet { addr, bits } => write!(f, "{}/{}", addr, bits),
            Datum::MacAddr(m) => write!(
                f,
                "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                m[0], m[1], m[2], m[3], m[4], m[5]
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_compare_across_integer_widths() {
        assert_eq!(
            Datum::Int4(3).compare(&Datum::Int8(4)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Datum::Float8(2.5).compare(&Datum::Int2(2)),
            Some(Ordering::Greater)
        );
        assert_eq!(Datum::text("a").compare(&Datum::Int4(1)), None);
    }

    #[test]
    fn test_compare_date_and_timestamp() {
        let day = Datum::Date(1);
        let ts = Datum::Timestamp(SECS_PER_DAY + 1.0);
        assert_eq!(day.compare(&ts), Some(Ordering::Less));
    }

    #[test]
    fn test_compare_inet() {
        let a = Datum::Inet {
            addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            bits: 32,
        };
        let b = Datum::Inet {
            addr: IpAddr::from_str("::1").unwrap(),
            bits: 128,
        };
        assert_eq!(a.compare(&b), Some(Ordering::Less));
    }

    #[test]
    fn test_float_equality_is_bitwise() {
        assert_eq!(Datum::Float8(f64::NAN), Datum::Float8(f64::NAN));
        assert_ne!(Datum::Float8(1.0), Datum::Numeric(1.0));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(DataType::from_str("timestamptz").unwrap(), DataType::TimestampTz);
        assert_eq!(DataType::Bpchar.to_string(), "bpchar");
        assert!(DataType::Name.is_string());
    }
}
