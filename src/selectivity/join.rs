use log::trace;

use crate::catalog::{ComparisonOperator, StatisticKind};
use crate::datum::Oid;
use crate::error::OptResult;
use crate::expr::Expr;
use crate::operator::JoinType;
use crate::planner::PlannerInfo;
use crate::selectivity::{clamp_probability, scalarineqsel, Selectivity};
use crate::stat::{examine_variable, get_join_variables, get_variable_maximum, get_variable_numdistinct};

/// `a = b` across two relations.
///
/// With most common value lists on both sides, the lists are matched greedily: each value
/// pairs with the first unmatched equal value of the other side. Matched pairs are known
/// exactly; what is left is spread evenly over the remaining distinct values. Of the two
/// resulting estimates, one per side, the smaller wins.
pub fn eqjoinsel(
    root: &PlannerInfo,
    opno: Oid,
    args: &[Expr],
    join_type: JoinType,
) -> OptResult<Selectivity> {
    let (vardata1, vardata2) = get_join_variables(root, args)?;

    let nd1 = get_variable_numdistinct(root, &vardata1);
    let nd2 = get_variable_numdistinct(root, &vardata2);

    let mcv1 = vardata1.slot(StatisticKind::Mcv, None);
    let mcv2 = vardata2.slot(StatisticKind::Mcv, None);

    let selec = match (mcv1, mcv2) {
        (Some(mcv1), Some(mcv2)) => {
            let proc = &root.operators().lookup(opno)?.proc;
            let nullfrac1 = vardata1.null_frac();

            let values1 = mcv1.values;
            let values2 = mcv2.values;
            let numbers1 = mcv1.numbers;
            // the right side is already unique, nulls included
            let (numbers2, nullfrac2): (Vec<f64>, f64) = if join_type.dedups_inner() {
                (vec![1.0 / nd2; values2.len()], 1.0 / nd2)
            } else {
                (mcv2.numbers.to_vec(), vardata2.null_frac())
            };
            let freq1 = |i: usize| numbers1.get(i).copied().unwrap_or(0.0);
            let freq2 = |i: usize| numbers2.get(i).copied().unwrap_or(0.0);

            let mut hasmatch1 = vec![false; values1.len()];
            let mut hasmatch2 = vec![false; values2.len()];
            let mut matchprodfreq = 0.0;
            let mut nmatches = 0;
            for (i, v1) in values1.iter().enumerate() {
                for (j, v2) in values2.iter().enumerate() {
                    if hasmatch2[j] {
                        continue;
                    }
                    if proc.evaluate(v1, v2) {
                        hasmatch1[i] = true;
                        hasmatch2[j] = true;
                        matchprodfreq += freq1(i) * freq2(j);
                        nmatches += 1;
                        break;
                    }
                }
            }
            let matchprodfreq = clamp_probability(matchprodfreq);

            let split = |hasmatch: &[bool], freq: &dyn Fn(usize) -> f64| {
                let (mut matched, mut unmatched) = (0.0, 0.0);
                for (i, m) in hasmatch.iter().enumerate() {
                    if *m {
                        matched += freq(i);
                    } else {
                        unmatched += freq(i);
                    }
                }
                (clamp_probability(matched), clamp_probability(unmatched))
            };
            let (matchfreq1, unmatchfreq1) = split(&hasmatch1, &freq1);
            let (matchfreq2, unmatchfreq2) = split(&hasmatch2, &freq2);

            // non-null values outside the common lists
            let otherfreq1 = clamp_probability(1.0 - nullfrac1 - matchfreq1 - unmatchfreq1);
            let otherfreq2 = clamp_probability(1.0 - nullfrac2 - matchfreq2 - unmatchfreq2);

            let nvalues1 = values1.len() as f64;
            let nvalues2 = values2.len() as f64;
            let nmatches = nmatches as f64;

            let mut totalsel1 = matchprodfreq;
            if nd2 > nvalues2 {
                totalsel1 += unmatchfreq1 * otherfreq2 / (nd2 - nvalues2);
            }
            if nd2 > nmatches {
                totalsel1 += otherfreq1 * (otherfreq2 + unmatchfreq2) / (nd2 - nmatches);
            }
            let mut totalsel2 = matchprodfreq;
            if nd1 > nvalues1 {
                totalsel2 += unmatchfreq2 * otherfreq1 / (nd1 - nvalues1);
            }
            if nd1 > nmatches {
                totalsel2 += otherfreq2 * (otherfreq1 + unmatchfreq1) / (nd1 - nmatches);
            }

            trace!(
                "Join MCV matching found {} pairs, estimates {} and {}",
                nmatches,
                totalsel1,
                totalsel2
            );
            totalsel1.min(totalsel2)
        }
        _ => {
            (1.0 - vardata1.null_frac()) * (1.0 - vardata2.null_frac()) / nd1.max(nd2)
        }
    };

    Ok(clamp_probability(selec))
}

/// `a <> b` across two relations.
pub fn neqjoinsel(
    root: &PlannerInfo,
    opno: Oid,
    args: &[Expr],
    join_type: JoinType,
) -> OptResult<Selectivity> {
    let eq = match root.operators().negator(opno) {
        Some(eqop) => eqjoinsel(root, eqop, args, join_type)?,
        None => root.context().selectivity.eq_sel,
    };
    Ok(1.0 - eq)
}

/// Fractions of the left and right inputs a merge join reads before one side runs out.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MergeScanSelectivity {
    pub left: Selectivity,
    pub right: Selectivity,
}

impl Default for MergeScanSelectivity {
    fn default() -> Self {
        Self {
            left: 1.0,
            right: 1.0,
        }
    }
}

/// Estimates how much of each input of a merge join on `clause` is scanned.
///
/// The left input stops once its values pass the right side's maximum, and the other way
/// round. Only one side can really stop early, so the larger fraction is reset to 1.
pub fn mergejoinscansel(root: &PlannerInfo, clause: &Expr) -> OptResult<MergeScanSelectivity> {
    let mut scan = MergeScanSelectivity::default();
    let (opno, left, right) = match clause.binary_args() {
        Some(args) => args,
        None => return Ok(scan),
    };

    let leftvar = examine_variable(root, left, None)?;
    let rightvar = examine_variable(root, right, None)?;
    let lefttype = left.expr_type();
    let righttype = right.expr_type();

    let operators = root.operators();
    let ops = match operators.mergejoin_ops(opno) {
        Some(ops) => ops,
        None => return Ok(scan),
    };

    let leftmax = match get_variable_maximum(root, &leftvar, ops.left_sortop)? {
        Some(max) => max,
        None => return Ok(scan),
    };
    let rightmax = match get_variable_maximum(root, &rightvar, ops.right_sortop)? {
        Some(max) => max,
        None => return Ok(scan),
    };

    // left <= right, and right <= left with the operands swapped
    let leop = operators.negator(ops.gt_cross);
    let revleop = operators
        .commutator(ops.lt_cross)
        .and_then(|revgtop| operators.negator(revgtop));
    let (leop, revleop) = match (leop, revleop) {
        (Some(leop), Some(revleop)) => (leop, revleop),
        _ => return Ok(scan),
    };

    // only non-default estimates are believed
    let ineq_sel = root.context().selectivity.ineq_sel;
    let selec = scalarineqsel(root, leop, false, &leftvar, &rightmax, righttype)?;
    if selec != ineq_sel {
        scan.left = selec;
    }
    let selec = scalarineqsel(root, revleop, false, &rightvar, &leftmax, lefttype)?;
    if selec != ineq_sel {
        scan.right = selec;
    }

    if scan.left > scan.right {
        scan.left = 1.0;
    } else if scan.left < scan.right {
        scan.right = 1.0;
    } else {
        scan = MergeScanSelectivity::default();
    }
    Ok(scan)
}
