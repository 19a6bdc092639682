use log::trace;

use crate::catalog::{ComparisonOperator, StatisticKind};
use crate::datum::{DataType, Datum, Oid};
use crate::error::OptResult;
use crate::expr::{BoolTestType, Expr, NullTestType};
use crate::operator::JoinType;
use crate::planner::PlannerInfo;
use crate::relids::RtIndex;
use crate::selectivity::{clamp_probability, clause_selectivity, Selectivity};
use crate::stat::{
    convert_to_scalar, examine_variable, get_restriction_variable, get_variable_numdistinct,
    VariableStatData,
};

/// Histogram based estimates are never trusted beyond this distance from 0 and 1.
const HISTOGRAM_SELEC_FLOOR: f64 = 0.0001;
const HISTOGRAM_SELEC_CEIL: f64 = 0.9999;

/// `var = something`.
///
/// A constant matching a most common value (as decided by the operator itself) gets that
/// value's frequency. Other constants share what the common values leave over.
pub fn eqsel(
    root: &PlannerInfo,
    opno: Oid,
    args: &[Expr],
    var_relid: Option<RtIndex>,
) -> OptResult<Selectivity> {
    let defaults = &root.context().selectivity;
    let restriction = match get_restriction_variable(root, args, var_relid)? {
        Some(r) => r,
        None => return Ok(defaults.eq_sel),
    };
    let vardata = &restriction.vardata;

    let constval = match &restriction.other {
        Expr::Const(c) => match &c.value {
            Some(value) => Some(value),
            // strict operator never returns true for null
            None => return Ok(0.0),
        },
        _ => None,
    };

    let stats = match vardata.stats() {
        Some(stats) => stats,
        None => return Ok(clamp_probability(1.0 / get_variable_numdistinct(root, vardata))),
    };
    let mcv = vardata.slot(StatisticKind::Mcv, None);

    let selec = match constval {
        Some(constval) => {
            let proc = &root.operators().lookup(opno)?.proc;
            let matched = mcv.and_then(|mcv| {
                mcv.values.iter().position(|value| {
                    if restriction.var_on_left {
                        proc.evaluate(value, constval)
                    } else {
                        proc.evaluate(constval, value)
                    }
                })
            });

            let numbers = mcv.map(|m| m.numbers).unwrap_or_default();
            match matched.and_then(|i| numbers.get(i)) {
                Some(freq) => *freq,
                None => {
                    let sumcommon: f64 = numbers.iter().sum();
                    let mut selec = clamp_probability(1.0 - sumcommon - stats.null_frac);
                    let otherdistinct =
                        get_variable_numdistinct(root, vardata) - numbers.len() as f64;
                    if otherdistinct > 1.0 {
                        selec /= otherdistinct;
                    }
                    // never more common than the least common of the common values
                    if let Some(least) = numbers.last() {
                        selec = selec.min(*least);
                    }
                    selec
                }
            }
        }
        None => {
            // value not known yet, average over all possible values
            let mut selec = 1.0 - stats.null_frac;
            let ndistinct = get_variable_numdistinct(root, vardata);
            if ndistinct > 1.0 {
                selec /= ndistinct;
            }
            if let Some(most) = mcv.and_then(|m| m.numbers.first()) {
                selec = selec.min(*most);
            }
            selec
        }
    };

    Ok(clamp_probability(selec))
}

/// `var <> something`: the complement of equality under the negator.
pub fn neqsel(
    root: &PlannerInfo,
    opno: Oid,
    args: &[Expr],
    var_relid: Option<RtIndex>,
) -> OptResult<Selectivity> {
    let eq = match root.operators().negator(opno) {
        Some(eqop) => eqsel(root, eqop, args, var_relid)?,
        None => root.context().selectivity.eq_sel,
    };
    Ok(1.0 - eq)
}

/// `var op constval` for an ordering operator, the variable already on the left.
/// `isgt` tells `>`/`>=` apart from `<`/`<=`.
pub fn scalarineqsel(
    root: &PlannerInfo,
    opno: Oid,
    isgt: bool,
    vardata: &VariableStatData,
    constval: &Datum,
    consttype: DataType,
) -> OptResult<Selectivity> {
    let stats = match vardata.stats() {
        Some(stats) => stats,
        None => return Ok(root.context().selectivity.ineq_sel),
    };
    let proc = &root.operators().lookup(opno)?.proc;

    let mut mcv_selec: f64 = 0.0;
    let mut sumcommon: f64 = 0.0;
    if let Some(mcv) = vardata.slot(StatisticKind::Mcv, None) {
        for (value, freq) in mcv.values.iter().zip(mcv.numbers) {
            if proc.evaluate(value, constval) {
                mcv_selec += freq;
            }
            sumcommon += freq;
        }
    }

    let mut hist_selec = None;
    if let Some(hist) = vardata.slot(StatisticKind::Histogram, None) {
        let values = hist.values;
        if values.len() > 1 {
            // whether the bound sorts below the constant
            let below = |bound: &Datum| proc.evaluate(bound, constval) != isgt;

            let histfrac = if !below(&values[0]) {
                0.0
            } else {
                match (1..values.len()).find(|i| !below(&values[*i])) {
                    None => 1.0,
                    Some(i) => {
                        let binfrac = match convert_to_scalar(
                            constval,
                            consttype,
                            &values[i - 1],
                            &values[i],
                            vardata.vartype,
                        ) {
                            Some((val, low, high)) => {
                                if high <= low {
                                    0.5
                                } else if val <= low {
                                    0.0
                                } else if val >= high {
                                    1.0
                                } else {
                                    let binfrac = (val - low) / (high - low);
                                    // infinite bounds
                                    if binfrac.is_nan() || !(0.0..=1.0).contains(&binfrac) {
                                        0.5
                                    } else {
                                        binfrac
                                    }
                                }
                            }
                            None => 0.5,
                        };
                        ((i - 1) as f64 + binfrac) / (values.len() - 1) as f64
                    }
                }
            };

            let selec = if isgt { 1.0 - histfrac } else { histfrac };
            hist_selec = Some(selec.clamp(HISTOGRAM_SELEC_FLOOR, HISTOGRAM_SELEC_CEIL));
        }
    }

    // the histogram only describes the non-null values outside the common list
    let selec =
        (1.0 - stats.null_frac - sumcommon) * hist_selec.unwrap_or(0.5) + mcv_selec;
    trace!(
        "Inequality {} against {}: mcv {}, histogram {:?}",
        opno,
        constval,
        mcv_selec,
        hist_selec
    );
    Ok(clamp_probability(selec))
}

/// `var < something` and `var <= something`.
pub fn scalarltsel(
    root: &PlannerInfo,
    opno: Oid,
    args: &[Expr],
    var_relid: Option<RtIndex>,
) -> OptResult<Selectivity> {
    scalar_comparison_sel(root, opno, args, var_relid, false)
}

/// `var > something` and `var >= something`.
pub fn scalargtsel(
    root: &PlannerInfo,
    opno: Oid,
    args: &[Expr],
    var_relid: Option<RtIndex>,
) -> OptResult<Selectivity> {
    scalar_comparison_sel(root, opno, args, var_relid, true)
}

fn scalar_comparison_sel(
    root: &PlannerInfo,
    opno: Oid,
    args: &[Expr],
    var_relid: Option<RtIndex>,
    greater: bool,
) -> OptResult<Selectivity> {
    let default = root.context().selectivity.ineq_sel;
    let restriction = match get_restriction_variable(root, args, var_relid)? {
        Some(r) => r,
        None => return Ok(default),
    };
    let (constval, consttype) = match &restriction.other {
        Expr::Const(c) => match &c.value {
            Some(value) => (value, c.consttype),
            None => return Ok(0.0),
        },
        _ => return Ok(default),
    };

    // commute so that the variable is on the left
    let (opno, isgt) = if restriction.var_on_left {
        (opno, greater)
    } else {
        match root.operators().commutator(opno) {
            Some(commutator) => (commutator, !greater),
            None => return Ok(default),
        }
    };

    scalarineqsel(root, opno, isgt, &restriction.vardata, constval, consttype)
}

/// `arg IS [NOT] TRUE/FALSE/UNKNOWN`.
pub fn booltestsel(
    root: &PlannerInfo,
    test: BoolTestType,
    arg: &Expr,
    var_relid: Option<RtIndex>,
    join_type: JoinType,
) -> OptResult<Selectivity> {
    let defaults = &root.context().selectivity;
    let vardata = examine_variable(root, arg, var_relid)?;

    let selec = match vardata.stats() {
        Some(stats) => {
            let freq_null = stats.null_frac;
            let mcv = vardata
                .slot(StatisticKind::Mcv, None)
                .filter(|m| !m.numbers.is_empty() && !m.values.is_empty());
            match mcv {
                Some(mcv) => {
                    let first_is_true = matches!(mcv.values[0], Datum::Bool(true));
                    let freq_true = if first_is_true {
                        mcv.numbers[0]
                    } else {
                        1.0 - mcv.numbers[0] - freq_null
                    };
                    let freq_false = 1.0 - freq_true - freq_null;
                    match test {
                        BoolTestType::IsUnknown => freq_null,
                        BoolTestType::IsNotUnknown => 1.0 - freq_null,
                        BoolTestType::IsTrue => freq_true,
                        BoolTestType::IsNotTrue => 1.0 - freq_true,
                        BoolTestType::IsFalse => freq_false,
                        BoolTestType::IsNotFalse => 1.0 - freq_false,
                    }
                }
                None => match test {
                    BoolTestType::IsUnknown => freq_null,
                    BoolTestType::IsNotUnknown => 1.0 - freq_null,
                    _ => (1.0 - freq_null) / 2.0,
                },
            }
        }
        None => {
            // nulls ignored, the argument is taken as a plain boolean clause
            match test {
                BoolTestType::IsUnknown => defaults.unk_sel,
                BoolTestType::IsNotUnknown => defaults.not_unk_sel,
                BoolTestType::IsTrue | BoolTestType::IsNotFalse => {
                    clause_selectivity(root, arg, var_relid, join_type)?
                }
                BoolTestType::IsFalse | BoolTestType::IsNotTrue => {
                    1.0 - clause_selectivity(root, arg, var_relid, join_type)?
                }
            }
        }
    };

    Ok(clamp_probability(selec))
}

/// `arg IS [NOT] NULL`.
pub fn nulltestsel(
    root: &PlannerInfo,
    test: NullTestType,
    arg: &Expr,
    var_relid: Option<RtIndex>,
) -> OptResult<Selectivity> {
    let defaults = &root.context().selectivity;
    let vardata = examine_variable(root, arg, var_relid)?;

    let selec = match (vardata.stats(), test) {
        (Some(stats), NullTestType::IsNull) => stats.null_frac,
        (Some(stats), NullTestType::IsNotNull) => 1.0 - stats.null_frac,
        (None, NullTestType::IsNull) => defaults.unk_sel,
        (None, NullTestType::IsNotNull) => defaults.not_unk_sel,
    };

    Ok(clamp_probability(selec))
}
