//! LIKE and regular expression match estimation.
//!
//! A pattern splits into a literal fixed prefix and the rest. The prefix is estimated as
//! the range `[prefix, successor(prefix))`, the rest by a per-character heuristic. The
//! prefix must never be longer than what the pattern really fixes.

use strum_macros::{Display as StrumDisplay, EnumIter};

use crate::datum::{DataType, Datum, Oid};
use crate::error::{invalid_input, lookup_error, OptResult};
use crate::expr::{Expr, NullTestType};
use crate::planner::PlannerInfo;
use crate::relids::RtIndex;
use crate::selectivity::{
    clamp_probability, eqsel, nulltestsel, scalargtsel, scalarltsel, Selectivity,
};
use crate::stat::get_restriction_variable;

pub const FIXED_CHAR_SEL: f64 = 0.20;
pub const CHAR_RANGE_SEL: f64 = 0.25;
/// Not 1, a wildcard does not match past the end of the string.
pub const ANY_CHAR_SEL: f64 = 0.9;
pub const FULL_WILDCARD_SEL: f64 = 5.0;
pub const PARTIAL_WILDCARD_SEL: f64 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, StrumDisplay, EnumIter)]
pub enum PatternType {
    Like,
    LikeIc,
    Regex,
    RegexIc,
}

impl PatternType {
    pub fn case_insensitive(&self) -> bool {
        matches!(self, PatternType::LikeIc | PatternType::RegexIc)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrefixStatus {
    None,
    Partial,
    /// The pattern matches only the prefix itself.
    Exact,
}

/// A pattern split into its literal prefix and the remainder, both of the pattern's type.
#[derive(Clone, Debug, PartialEq)]
pub struct FixedPrefix {
    pub status: PrefixStatus,
    pub prefix: Option<Datum>,
    pub rest: Datum,
}

fn pattern_bytes(pattern: &Datum) -> OptResult<(&[u8], bool)> {
    match pattern {
        Datum::Text(s) => Ok((s.as_bytes(), false)),
        Datum::Bytea(b) => Ok((b.as_slice(), true)),
        other => Err(invalid_input(format!(
            "pattern must be text or bytea, got {}",
            other
        ))),
    }
}

fn bytes_to_datum(bytes: &[u8], is_bytea: bool) -> Datum {
    if is_bytea {
        Datum::Bytea(bytes.to_vec())
    } else {
        Datum::Text(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Length of the UTF-8 sequence started by `lead`.
fn utf8_len(lead: u8) -> usize {
    match lead {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => 1,
    }
}

pub fn pattern_fixed_prefix(pattern: &Datum, ptype: PatternType) -> OptResult<FixedPrefix> {
    match ptype {
        PatternType::Like | PatternType::LikeIc => {
            like_fixed_prefix(pattern, ptype.case_insensitive())
        }
        PatternType::Regex | PatternType::RegexIc => {
            regex_fixed_prefix(pattern, ptype.case_insensitive())
        }
    }
}

fn like_fixed_prefix(pattern: &Datum, case_insensitive: bool) -> OptResult<FixedPrefix> {
    let (patt, is_bytea) = pattern_bytes(pattern)?;
    if is_bytea && case_insensitive {
        return Err(invalid_input(
            "case insensitive matching not supported on type bytea",
        ));
    }

    let mut matched = Vec::with_capacity(patt.len());
    let mut pos = 0;
    while pos < patt.len() {
        if patt[pos] == b'%' || patt[pos] == b'_' {
            break;
        }
        if patt[pos] == b'\\' {
            pos += 1;
            if pos >= patt.len() {
                break;
            }
        }
        // any non-ASCII byte may be part of a case varying character
        if case_insensitive && (patt[pos] >= 0x80 || patt[pos].is_ascii_alphabetic()) {
            break;
        }
        matched.push(patt[pos]);
        pos += 1;
    }
    let pos = pos.min(patt.len());

    // an empty pattern is an exact match too
    let status = if pos == patt.len() {
        PrefixStatus::Exact
    } else if !matched.is_empty() {
        PrefixStatus::Partial
    } else {
        PrefixStatus::None
    };

    Ok(FixedPrefix {
        status,
        prefix: Some(bytes_to_datum(&matched, is_bytea)),
        rest: bytes_to_datum(&patt[pos..], is_bytea),
    })
}

fn regex_fixed_prefix(pattern: &Datum, case_insensitive: bool) -> OptResult<FixedPrefix> {
    let (patt, is_bytea) = pattern_bytes(pattern)?;
    if is_bytea {
        return Err(invalid_input(
            "regular-expression matching not supported on type bytea",
        ));
    }
    let at = |i: usize| patt.get(i).copied().unwrap_or(0);
    let no_prefix = || FixedPrefix {
        status: PrefixStatus::None,
        prefix: None,
        rest: pattern.clone(),
    };

    let mut pos = 0;
    if patt.starts_with(b"***:") {
        pos = 4;
    }

    // must be anchored left, and a '|' may offer other starts
    if at(pos) != b'^' {
        return Ok(no_prefix());
    }
    pos += 1;
    if patt[pos..].contains(&b'|') {
        return Ok(no_prefix());
    }

    let mut matched: Vec<u8> = Vec::with_capacity(patt.len());
    let mut prev_match_len = 0;

    let mut have_leading_paren = false;
    if at(pos) == b'(' && (at(pos + 1) != b'?' || at(pos + 2) == b':') {
        have_leading_paren = true;
        pos += if at(pos + 1) != b'?' { 1 } else { 3 };
    }

    let mut prev_pos = pos;
    while pos < patt.len() {
        let c = patt[pos];
        if matches!(c, b'.' | b'(' | b')' | b'[' | b'^' | b'$') {
            break;
        }
        if case_insensitive && (c >= 0x80 || c.is_ascii_alphabetic()) {
            break;
        }
        // quantifiers make the previous character optional, '+' only repeats it
        if c == b'*' || c == b'?' || c == b'{' || (c == b'\\' && at(pos + 1) == b'{') {
            matched.truncate(prev_match_len);
            pos = prev_pos;
            break;
        }
        if c == b'+' {
            pos = prev_pos;
            break;
        }
        // backslash and an alphanumeric is a class escape, not a quoted character
        if c == b'\\' {
            if at(pos + 1).is_ascii_alphanumeric() || at(pos + 1) == b'(' {
                break;
            }
            pos += 1;
            if pos >= patt.len() {
                break;
            }
        }
        prev_match_len = matched.len();
        prev_pos = pos;
        let len = utf8_len(patt[pos]).min(patt.len() - pos);
        matched.extend_from_slice(&patt[pos..pos + len]);
        pos += len;
    }
    let pos = pos.min(patt.len());

    let mut rest_start = pos;
    let mut end = pos;
    if have_leading_paren && at(end) == b')' {
        end += 1;
    }
    let status = if at(end) == b'$' && end + 1 == patt.len() {
        rest_start = end + 1;
        PrefixStatus::Exact
    } else if !matched.is_empty() {
        PrefixStatus::Partial
    } else {
        PrefixStatus::None
    };

    Ok(FixedPrefix {
        status,
        prefix: Some(bytes_to_datum(&matched, false)),
        rest: bytes_to_datum(&patt[rest_start..], false),
    })
}

/// Selectivity of the non-prefix part of a pattern. May reach 1 through wildcards.
pub fn pattern_selectivity(rest: &Datum, ptype: PatternType) -> OptResult<Selectivity> {
    match ptype {
        PatternType::Like | PatternType::LikeIc => like_selectivity(rest, ptype.case_insensitive()),
        PatternType::Regex | PatternType::RegexIc => regex_selectivity(rest),
    }
}

/// Multiplies per-character factors of a LIKE pattern, a leading '%' included.
pub fn like_selectivity(pattern: &Datum, case_insensitive: bool) -> OptResult<Selectivity> {
    let (patt, is_bytea) = pattern_bytes(pattern)?;
    if is_bytea && case_insensitive {
        return Err(invalid_input(
            "case insensitive matching not supported on type bytea",
        ));
    }

    let mut sel: f64 = 1.0;
    let mut pos = 0;
    while pos < patt.len() {
        match patt[pos] {
            b'%' => sel *= FULL_WILDCARD_SEL,
            b'_' => sel *= ANY_CHAR_SEL,
            b'\\' => {
                pos += 1;
                if pos >= patt.len() {
                    break;
                }
                sel *= FIXED_CHAR_SEL;
            }
            _ => sel *= FIXED_CHAR_SEL,
        }
        pos += 1;
    }
    Ok(sel.min(1.0))
}

/// A pattern not anchored right behaves as if followed by `.*`.
pub fn regex_selectivity(pattern: &Datum) -> OptResult<Selectivity> {
    let (patt, is_bytea) = pattern_bytes(pattern)?;
    if is_bytea {
        return Err(invalid_input(
            "regular-expression matching not supported on type bytea",
        ));
    }

    let len = patt.len();
    let anchored = len > 0 && patt[len - 1] == b'$' && (len == 1 || patt[len - 2] != b'\\');
    if anchored {
        Ok(regex_selectivity_sub(&patt[..len - 1]))
    } else {
        Ok((regex_selectivity_sub(patt) * FULL_WILDCARD_SEL).min(1.0))
    }
}

fn regex_selectivity_sub(patt: &[u8]) -> Selectivity {
    let mut sel: f64 = 1.0;
    let mut paren_depth = 0;
    let mut paren_pos = 0;
    let mut pos = 0;

    while pos < patt.len() {
        match patt[pos] {
            b'(' => {
                if paren_depth == 0 {
                    paren_pos = pos;
                }
                paren_depth += 1;
            }
            b')' if paren_depth > 0 => {
                paren_depth -= 1;
                if paren_depth == 0 {
                    sel *= regex_selectivity_sub(&patt[paren_pos + 1..pos]);
                }
            }
            b'|' if paren_depth == 0 => {
                // alternatives add up, the rest of the pattern is one of them
                sel += regex_selectivity_sub(&patt[pos + 1..]);
                break;
            }
            b'[' => {
                let mut negclass = false;
                pos += 1;
                if patt.get(pos) == Some(&b'^') {
                    negclass = true;
                    pos += 1;
                }
                // ']' first in the class is a member
                if patt.get(pos) == Some(&b']') {
                    pos += 1;
                }
                while pos < patt.len() && patt[pos] != b']' {
                    pos += 1;
                }
                if paren_depth == 0 {
                    sel *= if negclass {
                        1.0 - CHAR_RANGE_SEL
                    } else {
                        CHAR_RANGE_SEL
                    };
                }
            }
            b'.' => {
                if paren_depth == 0 {
                    sel *= ANY_CHAR_SEL;
                }
            }
            b'*' | b'?' | b'+' => {
                if paren_depth == 0 {
                    sel *= PARTIAL_WILDCARD_SEL;
                }
            }
            b'{' => {
                while pos < patt.len() && patt[pos] != b'}' {
                    pos += 1;
                }
                if paren_depth == 0 {
                    sel *= PARTIAL_WILDCARD_SEL;
                }
            }
            b'\\' => {
                pos += 1;
                if pos >= patt.len() {
                    break;
                }
                if paren_depth == 0 {
                    sel *= FIXED_CHAR_SEL;
                }
            }
            _ => {
                if paren_depth == 0 {
                    sel *= FIXED_CHAR_SEL;
                }
            }
        }
        pos += 1;
    }
    sel.min(1.0)
}

/// Smallest string of the same type greater than every string starting with `value`:
/// the last byte is incremented, skipping invalid encodings, and a saturated last
/// character is dropped. `None` when no such string exists.
pub fn make_greater_string(value: &Datum) -> Option<Datum> {
    match value {
        Datum::Bytea(bytes) => {
            let mut work = bytes.clone();
            while let Some(last) = work.last_mut() {
                if *last < u8::MAX {
                    *last += 1;
                    return Some(Datum::Bytea(work));
                }
                work.pop();
            }
            None
        }
        Datum::Text(s) => {
            let mut work = s.clone();
            while !work.is_empty() {
                let mut bytes = work.clone().into_bytes();
                let last = bytes.len() - 1;
                while bytes[last] < u8::MAX {
                    bytes[last] += 1;
                    if let Ok(greater) = String::from_utf8(bytes.clone()) {
                        return Some(Datum::Text(greater));
                    }
                }
                work.pop();
            }
            None
        }
        _ => None,
    }
}

/// The prefix as a value of the column type, built from its raw bytes. A prefix that is not
/// valid UTF-8 has no text counterpart.
fn prefix_datum(prefix: &Datum, vartype: DataType) -> Option<Datum> {
    match (prefix, vartype) {
        (_, DataType::Bytea) => prefix.as_bytes().map(|b| Datum::Bytea(b.to_vec())),
        (Datum::Bytea(b), _) => std::str::from_utf8(b).ok().map(Datum::text),
        (other, _) => Some(other.clone()),
    }
}

fn find_type_operator(root: &PlannerInfo, name: &'static str, ty: DataType) -> OptResult<Oid> {
    root.operators()
        .find_operator(name, ty, ty)
        .ok_or_else(|| lookup_error("operator", format!("{} for type {}", name, ty)))
}

/// `variable >= prefix AND variable < successor(prefix)`.
pub fn prefix_selectivity(
    root: &PlannerInfo,
    variable: &Expr,
    vartype: DataType,
    prefix: &Datum,
) -> OptResult<Selectivity> {
    let geop = find_type_operator(root, ">=", vartype)?;
    let args = vec![variable.clone(), Expr::constant(vartype, prefix.clone())];
    let mut prefixsel = scalargtsel(root, geop, &args, None)?;

    if let Some(greater) = make_greater_string(prefix) {
        let ltop = find_type_operator(root, "<", vartype)?;
        let args = vec![variable.clone(), Expr::constant(vartype, greater)];
        let topsel = scalarltsel(root, ltop, &args, None)?;

        // both bounds counted the non-null rows outside the range, and the nulls
        prefixsel = topsel + prefixsel - 1.0;
        prefixsel += nulltestsel(root, NullTestType::IsNull, variable, None)?;

        // a range that small is real but tiny, one far below zero means the bounds
        // disagree
        if prefixsel <= 0.0 {
            prefixsel = if prefixsel < -0.01 {
                root.context().selectivity.range_ineq_sel
            } else {
                1.0e-10
            };
        }
    }
    Ok(prefixsel)
}

/// `variable ~~ pattern` and the other match operators, variable on the left.
pub fn patternsel(
    root: &PlannerInfo,
    args: &[Expr],
    var_relid: Option<RtIndex>,
    ptype: PatternType,
) -> OptResult<Selectivity> {
    let default = root.context().selectivity.match_sel;
    let restriction = match get_restriction_variable(root, args, var_relid)? {
        Some(r) => r,
        None => return Ok(default),
    };
    if !restriction.var_on_left {
        return Ok(default);
    }
    let patt = match &restriction.other {
        Expr::Const(c) => match &c.value {
            None => return Ok(0.0),
            Some(_) if !matches!(c.consttype, DataType::Text | DataType::Bytea) => {
                return Ok(default)
            }
            Some(value) => value.clone(),
        },
        _ => return Ok(default),
    };
    let vartype = restriction.vardata.vartype;
    if !matches!(
        vartype,
        DataType::Text | DataType::Varchar | DataType::Bpchar | DataType::Name | DataType::Bytea
    ) {
        return Ok(default);
    }
    drop(restriction);

    let variable = &args[0];
    let fixed = pattern_fixed_prefix(&patt, ptype)?;
    let prefix = fixed.prefix.as_ref().and_then(|p| prefix_datum(p, vartype));

    match (fixed.status, prefix) {
        (PrefixStatus::Exact, Some(prefix)) => {
            let eqop = find_type_operator(root, "=", vartype)?;
            let eqargs = vec![variable.clone(), Expr::constant(vartype, prefix)];
            eqsel(root, eqop, &eqargs, var_relid)
        }
        (status, prefix) => {
            let prefixsel = match (status, prefix) {
                (PrefixStatus::Partial, Some(prefix)) => {
                    prefix_selectivity(root, variable, vartype, &prefix)?
                }
                _ => 1.0,
            };
            let restsel = pattern_selectivity(&fixed.rest, ptype)?;
            Ok(clamp_probability(prefixsel * restsel))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::assert_close;

    fn text(s: &str) -> Datum {
        Datum::text(s)
    }

    #[test]
    fn test_like_fixed_prefix() {
        let fixed = pattern_fixed_prefix(&text("foo%bar"), PatternType::Like).unwrap();
        assert_eq!(fixed.status, PrefixStatus::Partial);
        assert_eq!(fixed.prefix, Some(text("foo")));
        assert_eq!(fixed.rest, text("%bar"));

        let fixed = pattern_fixed_prefix(&text("a\\%b"), PatternType::Like).unwrap();
        assert_eq!(fixed.status, PrefixStatus::Exact);
        assert_eq!(fixed.prefix, Some(text("a%b")));

        let fixed = pattern_fixed_prefix(&text("%x"), PatternType::Like).unwrap();
        assert_eq!(fixed.status, PrefixStatus::None);

        let fixed = pattern_fixed_prefix(&text("12ab%"), PatternType::LikeIc).unwrap();
        assert_eq!(fixed.status, PrefixStatus::Partial);
        assert_eq!(fixed.prefix, Some(text("12")));
        assert_eq!(fixed.rest, text("ab%"));
    }

    #[test]
    fn test_like_bytea_case_insensitive_rejected() {
        let patt = Datum::Bytea(b"ab%".to_vec());
        assert!(pattern_fixed_prefix(&patt, PatternType::LikeIc).is_err());
        assert!(pattern_fixed_prefix(&patt, PatternType::Like).is_ok());
        assert!(pattern_fixed_prefix(&patt, PatternType::Regex).is_err());
    }

    #[test]
    fn test_regex_fixed_prefix() {
        let fixed = pattern_fixed_prefix(&text("^abc$"), PatternType::Regex).unwrap();
        assert_eq!(fixed.status, PrefixStatus::Exact);
        assert_eq!(fixed.prefix, Some(text("abc")));

        let fixed = pattern_fixed_prefix(&text("^(abc)$"), PatternType::Regex).unwrap();
        assert_eq!(fixed.status, PrefixStatus::Exact);

        // the optional 'c' leaves the prefix
        let fixed = pattern_fixed_prefix(&text("^abc?d"), PatternType::Regex).unwrap();
        assert_eq!(fixed.status, PrefixStatus::Partial);
        assert_eq!(fixed.prefix, Some(text("ab")));
        assert_eq!(fixed.rest, text("c?d"));

        // a repeated 'c' stays
        let fixed = pattern_fixed_prefix(&text("^abc+"), PatternType::Regex).unwrap();
        assert_eq!(fixed.prefix, Some(text("abc")));
        assert_eq!(fixed.rest, text("c+"));

        let fixed = pattern_fixed_prefix(&text("abc"), PatternType::Regex).unwrap();
        assert_eq!(fixed.status, PrefixStatus::None);
        assert_eq!(fixed.prefix, None);

        let fixed = pattern_fixed_prefix(&text("^ab|cd"), PatternType::Regex).unwrap();
        assert_eq!(fixed.status, PrefixStatus::None);

        let fixed = pattern_fixed_prefix(&text("^a\\db"), PatternType::Regex).unwrap();
        assert_eq!(fixed.prefix, Some(text("a")));
    }

    #[test]
    fn test_like_selectivity() {
        assert_close(like_selectivity(&text("%bar"), false).unwrap(), 0.04);
        assert_close(like_selectivity(&text("_a"), false).unwrap(), 0.18);
        assert_close(like_selectivity(&text("%"), false).unwrap(), 1.0);
    }

    #[test]
    fn test_regex_selectivity() {
        // "ab" then an implied ".*"
        assert_close(regex_selectivity(&text("ab")).unwrap(), 0.2);
        assert_close(regex_selectivity(&text("ab$")).unwrap(), 0.04);
        assert_close(regex_selectivity(&text("[abc]$")).unwrap(), 0.25);
        assert_close(regex_selectivity(&text("a|b$")).unwrap(), 0.4);
    }

    #[test]
    fn test_prefix_datum_keeps_raw_bytes() {
        let raw = Datum::Bytea(vec![b'a', 0xff, 0xfe]);
        assert_eq!(prefix_datum(&raw, DataType::Bytea), Some(raw.clone()));
        assert_eq!(
            make_greater_string(&raw),
            Some(Datum::Bytea(vec![b'a', 0xff, 0xff]))
        );
        assert_eq!(prefix_datum(&raw, DataType::Text), None);

        assert_eq!(
            prefix_datum(&text("ab"), DataType::Bytea),
            Some(Datum::Bytea(b"ab".to_vec()))
        );
        assert_eq!(
            prefix_datum(&Datum::Bytea(b"ab".to_vec()), DataType::Varchar),
            Some(text("ab"))
        );
        assert_eq!(prefix_datum(&text("ab"), DataType::Text), Some(text("ab")));

        let fixed = pattern_fixed_prefix(
            &Datum::Bytea(vec![0xc3, 0x28, b'%']),
            PatternType::Like,
        )
        .unwrap();
        assert_eq!(fixed.prefix, Some(Datum::Bytea(vec![0xc3, 0x28])));
        assert_eq!(
            fixed.prefix.as_ref().and_then(|p| prefix_datum(p, DataType::Bytea)),
            Some(Datum::Bytea(vec![0xc3, 0x28]))
        );
    }

    #[test]
    fn test_make_greater_string() {
        assert_eq!(make_greater_string(&text("foo")), Some(text("fop")));
        assert_eq!(make_greater_string(&text("\u{7f}")), None);
        assert_eq!(make_greater_string(&text("a\u{7f}")), Some(text("b")));
        assert_eq!(
            make_greater_string(&Datum::Bytea(vec![1, 255])),
            Some(Datum::Bytea(vec![2]))
        );
        assert_eq!(make_greater_string(&Datum::Bytea(vec![])), None);
    }
}
