use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::{Mutex, PoisonError};

use enum_dispatch::enum_dispatch;
use log::debug;
use regex::bytes::{Regex, RegexBuilder};
use strum::IntoEnumIterator;
use strum_macros::{Display as StrumDisplay, EnumIter};

use crate::datum::{DataType, Datum, Oid};
use crate::error::{lookup_error, OptResult};
use crate::selectivity::PatternType;

/// Boolean procedure behind an operator, used to probe statistics values.
#[enum_dispatch]
pub trait ComparisonOperator {
    fn evaluate(&self, left: &Datum, right: &Datum) -> bool;
}

#[enum_dispatch(ComparisonOperator)]
#[derive(Clone, Debug)]
pub enum OperatorProc {
    OrderingProc,
    LikeProc,
    RegexProc,
    CustomProc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, StrumDisplay, EnumIter)]
pub enum Strategy {
    #[strum(serialize = "=")]
    Equal,
    #[strum(serialize = "<>")]
    NotEqual,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = "<=")]
    LessEqual,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = ">=")]
    GreaterEqual,
}

impl Strategy {
    pub fn commutator(&self) -> Strategy {
        match self {
            Strategy::Equal => Strategy::Equal,
            Strategy::NotEqual => Strategy::NotEqual,
            Strategy::Less => Strategy::Greater,
            Strategy::LessEqual => Strategy::GreaterEqual,
            Strategy::Greater => Strategy::Less,
            Strategy::GreaterEqual => Strategy::LessEqual,
        }
    }

    pub fn negator(&self) -> Strategy {
        match self {
            Strategy::Equal => Strategy::NotEqual,
            Strategy::NotEqual => Strategy::Equal,
            Strategy::Less => Strategy::GreaterEqual,
            Strategy::LessEqual => Strategy::Greater,
            Strategy::Greater => Strategy::LessEqual,
            Strategy::GreaterEqual => Strategy::Less,
        }
    }

    fn accepts(&self, ord: Ordering) -> bool {
        match self {
            Strategy::Equal => ord == Ordering::Equal,
            Strategy::NotEqual => ord != Ordering::Equal,
            Strategy::Less => ord == Ordering::Less,
            Strategy::LessEqual => ord != Ordering::Greater,
            Strategy::Greater => ord == Ordering::Greater,
            Strategy::GreaterEqual => ord != Ordering::Less,
        }
    }
}

#[derive(Clone, Debug)]
pub struct OrderingProc {
    strategy: Strategy,
}

impl OrderingProc {
    pub fn new(strategy: Strategy) -> Self {
        Self { strategy }
    }
}

impl ComparisonOperator for OrderingProc {
    fn evaluate(&self, left: &Datum, right: &Datum) -> bool {
        left.compare(right)
            .map(|ord| self.strategy.accepts(ord))
            .unwrap_or(false)
    }
}

/// `LIKE` / `ILIKE` with backslash escapes.
#[derive(Clone, Debug)]
pub struct LikeProc {
    case_insensitive: bool,
    negate: bool,
}

impl ComparisonOperator for LikeProc {
    fn evaluate(&self, left: &Datum, right: &Datum) -> bool {
        match (left.as_bytes(), right.as_bytes()) {
            (Some(text), Some(pattern)) => {
                let matched = if self.case_insensitive {
                    like_match(
                        &text.to_ascii_lowercase(),
                        &pattern.to_ascii_lowercase(),
                    )
                } else {
                    like_match(text, pattern)
                };
                matched != self.negate
            }
            _ => false,
        }
    }
}

/// Two cursor matcher. On a mismatch only the most recent `%` is retried, one byte further
/// along the text, which keeps matching linear in the pattern per text byte.
fn like_match(text: &[u8], pattern: &[u8]) -> bool {
    let (mut t, mut p) = (0, 0);
    // pattern position after the last `%` and the text position it is tried at
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some(b'%') => {
                p += 1;
                backtrack = Some((p, t));
                continue;
            }
            Some(b'_') => {
                t += 1;
                p += 1;
                continue;
            }
            Some(&c) => {
                let (literal, width) = match (c, pattern.get(p + 1)) {
                    (b'\\', Some(&escaped)) => (escaped, 2),
                    _ => (c, 1),
                };
                if text[t] == literal {
                    t += 1;
                    p += width;
                    continue;
                }
            }
            None => {}
        }

        match backtrack {
            Some((after, start)) => {
                p = after;
                t = start + 1;
                backtrack = Some((after, t));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == b'%')
}

#[derive(Clone, Debug)]
pub struct RegexProc {
    case_insensitive: bool,
    negate: bool,
}

lazy_static! {
    /// Compiled patterns keyed by source and case sensitivity. `None` marks a pattern
    /// that failed to compile.
    static ref REGEX_CACHE: Mutex<HashMap<(Vec<u8>, bool), Option<Regex>>> =
        Mutex::new(HashMap::new());
}

impl RegexProc {
    fn compile(&self, pattern: &[u8]) -> Option<Regex> {
        let key = (pattern.to_vec(), self.case_insensitive);
        let mut cache = REGEX_CACHE.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(re) = cache.get(&key) {
            return re.clone();
        }

        let source = String::from_utf8_lossy(pattern);
        let source = source.strip_prefix("***:").unwrap_or(&source);
        let re = match RegexBuilder::new(source)
            .case_insensitive(self.case_insensitive)
            .build()
        {
            Ok(re) => Some(re),
            Err(e) => {
                debug!("Unable to compile pattern {:?}: {}", source, e);
                None
            }
        };
        cache.insert(key, re.clone());
        re
    }
}

impl ComparisonOperator for RegexProc {
    fn evaluate(&self, left: &Datum, right: &Datum) -> bool {
        let (text, pattern) = match (left.as_bytes(), right.as_bytes()) {
            (Some(t), Some(p)) => (t, p),
            _ => return false,
        };
        match self.compile(pattern) {
            Some(re) => re.is_match(text) != self.negate,
            None => false,
        }
    }
}

/// Caller-supplied procedure for operators registered at runtime.
#[derive(Clone)]
pub struct CustomProc(pub fn(&Datum, &Datum) -> bool);

impl Debug for CustomProc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("CustomProc")
    }
}

impl ComparisonOperator for CustomProc {
    fn evaluate(&self, left: &Datum, right: &Datum) -> bool {
        (self.0)(left, right)
    }
}

/// Restriction selectivity estimator attached to an operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestrictEstimator {
    Eq,
    Neq,
    ScalarLt,
    ScalarGt,
    Match(PatternType),
    NotMatch(PatternType),
}

/// Join selectivity estimator attached to an operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinEstimator {
    Eq,
    Neq,
    ScalarLt,
    ScalarGt,
    Match(PatternType),
    NotMatch(PatternType),
}

/// Sort and cross-type comparison operators of a merge joinable operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MergeJoinOps {
    pub left_sortop: Oid,
    pub right_sortop: Oid,
    /// `left < right`.
    pub lt_cross: Oid,
    /// `left > right`.
    pub gt_cross: Oid,
}

#[derive(Clone, Debug)]
pub struct OperatorInfo {
    pub oid: Oid,
    pub name: String,
    pub left_type: DataType,
    pub right_type: DataType,
    pub commutator: Option<Oid>,
    pub negator: Option<Oid>,
    pub restrict: Option<RestrictEstimator>,
    pub join: Option<JoinEstimator>,
    pub mergejoin: Option<MergeJoinOps>,
    pub hashjoinable: bool,
    pub proc: OperatorProc,
}

impl OperatorInfo {
    pub fn new<S: Into<String>>(
        oid: Oid,
        name: S,
        left_type: DataType,
        right_type: DataType,
        proc: OperatorProc,
    ) -> Self {
        Self {
            oid,
            name: name.into(),
            left_type,
            right_type,
            commutator: None,
            negator: None,
            restrict: None,
            join: None,
            mergejoin: None,
            hashjoinable: false,
            proc,
        }
    }

    pub fn with_commutator(mut self, commutator: Option<Oid>) -> Self {
        self.commutator = commutator;
        self
    }

    pub fn with_negator(mut self, negator: Option<Oid>) -> Self {
        self.negator = negator;
        self
    }

    pub fn with_estimators(
        mut self,
        restrict: Option<RestrictEstimator>,
        join: Option<JoinEstimator>,
    ) -> Self {
        self.restrict = restrict;
        self.join = join;
        self
    }

    pub fn with_mergejoin(mut self, mergejoin: Option<MergeJoinOps>) -> Self {
        self.mergejoin = mergejoin;
        self
    }

    pub fn with_hashjoinable(mut self, hashjoinable: bool) -> Self {
        self.hashjoinable = hashjoinable;
        self
    }
}

const FIRST_BUILTIN_OID: Oid = 1000;

/// Types that get the six comparison operators.
const SCALAR_TYPES: [DataType; 23] = [
    DataType::Bool,
    DataType::Int2,
    DataType::Int4,
    DataType::Int8,
    DataType::Float4,
    DataType::Float8,
    DataType::Numeric,
    DataType::Oid,
    DataType::Char,
    DataType::Name,
    DataType::Text,
    DataType::Varchar,
    DataType::Bpchar,
    DataType::Bytea,
    DataType::Timestamp,
    DataType::TimestampTz,
    DataType::Date,
    DataType::Time,
    DataType::TimeTz,
    DataType::Interval,
    DataType::Inet,
    DataType::Cidr,
    DataType::MacAddr,
];

const PATTERN_TEXT_TYPES: [DataType; 4] = [
    DataType::Text,
    DataType::Varchar,
    DataType::Bpchar,
    DataType::Name,
];

lazy_static! {
    static ref BUILTIN_OPERATORS: OperatorCatalog = build_builtin_operators();
}

/// Operator lookup table. The builtin set is built once and cloned per session.
#[derive(Clone, Debug, Default)]
pub struct OperatorCatalog {
    operators: HashMap<Oid, OperatorInfo>,
    by_name: HashMap<(String, DataType, DataType), Oid>,
}

impl OperatorCatalog {
    pub fn builtin() -> Self {
        BUILTIN_OPERATORS.clone()
    }

    pub fn register(&mut self, info: OperatorInfo) {
        self.by_name.insert(
            (info.name.clone(), info.left_type, info.right_type),
            info.oid,
        );
        self.operators.insert(info.oid, info);
    }

    /// First oid not used by any registered operator.
    pub fn next_oid(&self) -> Oid {
        self.operators
            .keys()
            .max()
            .map(|max| max + 1)
            .unwrap_or(FIRST_BUILTIN_OID)
    }

    pub fn get(&self, oid: Oid) -> Option<&OperatorInfo> {
        self.operators.get(&oid)
    }

    pub fn lookup(&self, oid: Oid) -> OptResult<&OperatorInfo> {
        self.get(oid).ok_or_else(|| lookup_error("operator", oid))
    }

    pub fn find_operator(&self, name: &str, left: DataType, right: DataType) -> Option<Oid> {
        self.by_name.get(&(name.to_string(), left, right)).copied()
    }

    pub fn commutator(&self, oid: Oid) -> Option<Oid> {
        self.get(oid).and_then(|op| op.commutator)
    }

    pub fn negator(&self, oid: Oid) -> Option<Oid> {
        self.get(oid).and_then(|op| op.negator)
    }

    pub fn mergejoin_ops(&self, oid: Oid) -> Option<MergeJoinOps> {
        self.get(oid).and_then(|op| op.mergejoin)
    }
}

fn build_builtin_operators() -> OperatorCatalog {
    let mut catalog = OperatorCatalog::default();
    let mut next_oid = FIRST_BUILTIN_OID;

    for data_type in SCALAR_TYPES {
        let oids: HashMap<Strategy, Oid> = Strategy::iter()
            .enumerate()
            .map(|(i, s)| (s, next_oid + i as Oid))
            .collect();
        next_oid += oids.len() as Oid;

        for strategy in Strategy::iter() {
            let (restrict, join) = match strategy {
                Strategy::Equal => (RestrictEstimator::Eq, JoinEstimator::Eq),
                Strategy::NotEqual => (RestrictEstimator::Neq, JoinEstimator::Neq),
                Strategy::Less | Strategy::LessEqual => {
                    (RestrictEstimator::ScalarLt, JoinEstimator::ScalarLt)
                }
                Strategy::Greater | Strategy::GreaterEqual => {
                    (RestrictEstimator::ScalarGt, JoinEstimator::ScalarGt)
                }
            };
            let mergejoin = (strategy == Strategy::Equal).then(|| MergeJoinOps {
                left_sortop: oids[&Strategy::Less],
                right_sortop: oids[&Strategy::Less],
                lt_cross: oids[&Strategy::Less],
                gt_cross: oids[&Strategy::Greater],
            });
            let info = OperatorInfo::new(
                oids[&strategy],
                strategy.to_string(),
                data_type,
                data_type,
                OrderingProc { strategy }.into(),
            )
            .with_commutator(Some(oids[&strategy.commutator()]))
            .with_negator(Some(oids[&strategy.negator()]))
            .with_estimators(Some(restrict), Some(join))
            .with_mergejoin(mergejoin)
            .with_hashjoinable(strategy == Strategy::Equal);
            catalog.register(info);
        }
    }

    for data_type in PATTERN_TEXT_TYPES {
        for ptype in PatternType::iter() {
            next_oid = register_pattern_pair(&mut catalog, next_oid, data_type, DataType::Text, ptype);
        }
    }
    register_pattern_pair(
        &mut catalog,
        next_oid,
        DataType::Bytea,
        DataType::Bytea,
        PatternType::Like,
    );

    catalog
}

/// Registers a match operator and its negation, returns the next free oid.
fn register_pattern_pair(
    catalog: &mut OperatorCatalog,
    oid: Oid,
    left: DataType,
    right: DataType,
    ptype: PatternType,
) -> Oid {
    let (name, negated_name) = match ptype {
        PatternType::Like => ("~~", "!~~"),
        PatternType::LikeIc => ("~~*", "!~~*"),
        PatternType::Regex => ("~", "!~"),
        PatternType::RegexIc => ("~*", "!~*"),
    };
    for (offset, negate) in [(0, false), (1, true)] {
        let case_insensitive = matches!(ptype, PatternType::LikeIc | PatternType::RegexIc);
        let proc: OperatorProc = match ptype {
            PatternType::Like | PatternType::LikeIc => LikeProc {
                case_insensitive,
                negate,
            }
            .into(),
            PatternType::Regex | PatternType::RegexIc => RegexProc {
                case_insensitive,
                negate,
            }
            .into(),
        };
        let (op_name, restrict, join) = if negate {
            (
                negated_name,
                RestrictEstimator::NotMatch(ptype),
                JoinEstimator::NotMatch(ptype),
            )
        } else {
            (
                name,
                RestrictEstimator::Match(ptype),
                JoinEstimator::Match(ptype),
            )
        };
        let info = OperatorInfo::new(oid + offset, op_name, left, right, proc)
            .with_negator(Some(oid + 1 - offset))
            .with_estimators(Some(restrict), Some(join));
        catalog.register(info);
    }
    oid + 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_links() {
        let catalog = OperatorCatalog::builtin();
        let lt = catalog
            .find_operator("<", DataType::Int4, DataType::Int4)
            .unwrap();
        let gt = catalog
            .find_operator(">", DataType::Int4, DataType::Int4)
            .unwrap();
        let ge = catalog
            .find_operator(">=", DataType::Int4, DataType::Int4)
            .unwrap();
        assert_eq!(catalog.commutator(lt), Some(gt));
        assert_eq!(catalog.negator(lt), Some(ge));

        let eq = catalog
            .find_operator("=", DataType::Int4, DataType::Int4)
            .unwrap();
        let ops = catalog.mergejoin_ops(eq).unwrap();
        assert_eq!(ops.left_sortop, lt);
        assert_eq!(ops.gt_cross, gt);
        assert!(catalog.lookup(eq).unwrap().hashjoinable);
    }

    #[test]
    fn test_pattern_negators() {
        let catalog = OperatorCatalog::builtin();
        let like = catalog
            .find_operator("~~", DataType::Text, DataType::Text)
            .unwrap();
        let nlike = catalog
            .find_operator("!~~", DataType::Text, DataType::Text)
            .unwrap();
        assert_eq!(catalog.negator(like), Some(nlike));
        assert_eq!(catalog.negator(nlike), Some(like));
        assert_eq!(
            catalog.lookup(nlike).unwrap().restrict,
            Some(RestrictEstimator::NotMatch(PatternType::Like))
        );
    }

    #[test]
    fn test_lookup_unknown_operator() {
        let catalog = OperatorCatalog::builtin();
        assert!(catalog.lookup(1).is_err());
        assert!(catalog.next_oid() > FIRST_BUILTIN_OID);
    }

    #[test]
    fn test_procs() {
        let catalog = OperatorCatalog::builtin();
        let proc_of = |name: &str| {
            let oid = catalog
                .find_operator(name, DataType::Text, DataType::Text)
                .unwrap();
            catalog.lookup(oid).unwrap().proc.clone()
        };
        let text = Datum::text("foobar");
        assert!(proc_of("~~").evaluate(&text, &Datum::text("foo%")));
        assert!(proc_of("~~").evaluate(&text, &Datum::text("f_o%r")));
        assert!(!proc_of("~~").evaluate(&text, &Datum::text("bar%")));
        assert!(proc_of("~~*").evaluate(&text, &Datum::text("FOO%")));
        assert!(proc_of("!~~").evaluate(&text, &Datum::text("x%")));
        assert!(proc_of("~").evaluate(&text, &Datum::text("^fo+b")));
        assert!(proc_of("~*").evaluate(&text, &Datum::text("BAR$")));
        assert!(proc_of("<").evaluate(&Datum::text("abc"), &text));
        assert!(like_match(b"50%", b"50\\%"));
    }

    #[test]
    fn test_like_match() {
        assert!(like_match(b"", b""));
        assert!(like_match(b"", b"%%"));
        assert!(!like_match(b"", b"_"));
        assert!(like_match(b"abc", b"a%"));
        assert!(like_match(b"abc", b"%c"));
        assert!(!like_match(b"abc", b"%b"));
        assert!(like_match(b"abcbc", b"a%bc"));
        assert!(like_match(b"axxbyyb", b"a%b_y%"));
        assert!(!like_match(b"a%c", b"a\\%"));
        assert!(like_match(b"a%c", b"a\\%_"));
        assert!(!like_match(b"abc", b"a\\%c"));
        assert!(like_match(b"a_c", b"%\\_%"));
        assert!(!like_match(b"abc", b"%\\_%"));
    }

    #[test]
    fn test_like_match_many_wildcards() {
        // exponential with naive backtracking
        let text = [b'a'; 64];
        assert!(!like_match(&text, b"%a%a%a%a%a%a%a%a%a%a%b"));
        assert!(like_match(&text, b"%a%a%a%a%a%a%a%a%a%a%"));
        assert!(like_match(&text, b"a%a%a%a%a%a%a%a%a%a"));
    }

    #[test]
    fn test_regex_proc_reuses_compiled_patterns() {
        let proc = RegexProc {
            case_insensitive: true,
            negate: false,
        };
        let pattern = Datum::text("^ab+c$");
        for _ in 0..100 {
            assert!(proc.evaluate(&Datum::text("ABBC"), &pattern));
            assert!(!proc.evaluate(&Datum::text("ac"), &pattern));
        }
        assert!(matches!(
            REGEX_CACHE
                .lock()
                .unwrap()
                .get(&(b"^ab+c$".to_vec(), true)),
            Some(Some(_))
        ));

        let sensitive = RegexProc {
            case_insensitive: false,
            negate: false,
        };
        assert!(!sensitive.evaluate(&Datum::text("ABBC"), &pattern));

        let broken = Datum::text("(unclosed");
        assert!(!proc.evaluate(&Datum::text("(unclosed"), &broken));
        assert!(!proc.evaluate(&Datum::text("(unclosed"), &broken));
        assert!(matches!(
            REGEX_CACHE
                .lock()
                .unwrap()
                .get(&(b"(unclosed".to_vec(), true)),
            Some(None)
        ));
    }
}
