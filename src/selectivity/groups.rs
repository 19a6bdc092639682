use log::{debug, trace};

use crate::catalog::StatisticKind;
use crate::datum::DataType;
use crate::error::OptResult;
use crate::expr::Expr;
use crate::planner::{PlannerInfo, RelOptInfo, RelOptKind};
use crate::selectivity::Selectivity;
use crate::stat::{examine_variable, get_variable_numdistinct, VariableStatData};

/// A grouping variable and the distinct count of the relation it comes from.
struct GroupVarInfo<'a> {
    var: Expr,
    rel: Option<&'a RelOptInfo>,
    ndistinct: f64,
}

fn same_rel(a: Option<&RelOptInfo>, b: Option<&RelOptInfo>) -> bool {
    a.map(|r| r.id) == b.map(|r| r.id)
}

/// Whether a mergejoinable clause `a = b` (either way round) is known to hold.
pub fn exprs_known_equal(root: &PlannerInfo, a: &Expr, b: &Expr) -> bool {
    root.rels()
        .filter(|rel| rel.kind == RelOptKind::BaseRel)
        .flat_map(|rel| rel.join_clauses())
        .filter(|rinfo| rinfo.is_mergejoinable())
        .any(|rinfo| match (rinfo.left_expr(), rinfo.right_expr()) {
            (Some(l), Some(r)) => (l == a && r == b) || (l == b && r == a),
            _ => false,
        })
}

fn add_unique_group_var<'a>(
    root: &'a PlannerInfo,
    varinfos: &mut Vec<GroupVarInfo<'a>>,
    var: &Expr,
    vardata: &VariableStatData<'a>,
) {
    let ndistinct = get_variable_numdistinct(root, vardata);

    let mut i = 0;
    while i < varinfos.len() {
        let existing = &varinfos[i];
        if &existing.var == var {
            return;
        }
        // equal variables of one relation are left alone
        if !same_rel(vardata.rel, existing.rel) && exprs_known_equal(root, var, &existing.var) {
            if existing.ndistinct <= ndistinct {
                return;
            }
            varinfos.remove(i);
            continue;
        }
        i += 1;
    }

    varinfos.push(GroupVarInfo {
        var: var.clone(),
        rel: vardata.rel,
        ndistinct,
    });
}

/// Estimated number of groups `GROUP BY exprs` produces from `input_rows` rows.
///
/// Each expression is broken into the Vars it uses, unless statistics exist for it as a
/// whole. Distinct counts of Vars from one relation are multiplied, then clamped to the
/// relation size (a tenth of it for several Vars, since they are probably correlated),
/// then scaled by the fraction of the relation's rows surviving its restrictions. The
/// per-relation results are multiplied together.
pub fn estimate_num_groups(
    root: &PlannerInfo,
    exprs: &[Expr],
    input_rows: f64,
) -> OptResult<f64> {
    let mut varinfos: Vec<GroupVarInfo> = vec![];
    let mut numdistinct: f64 = 1.0;

    for expr in exprs {
        if expr.expr_type() == DataType::Bool {
            numdistinct *= 2.0;
            continue;
        }

        let vardata = examine_variable(root, expr, None)?;
        if vardata.has_stats() || vardata.is_unique {
            add_unique_group_var(root, &mut varinfos, expr, &vardata);
            continue;
        }
        drop(vardata);

        let vars = expr.pull_vars();
        if vars.is_empty() {
            // a volatile expression may give every row its own group
            if expr.contain_volatile_functions() {
                return Ok(input_rows);
            }
            continue;
        }
        for var in vars {
            let var = Expr::Var(var);
            let vardata = examine_variable(root, &var, None)?;
            add_unique_group_var(root, &mut varinfos, &var, &vardata);
        }
    }

    if varinfos.is_empty() {
        return Ok(numdistinct.min(input_rows));
    }

    while !varinfos.is_empty() {
        let first = varinfos.remove(0);
        let (same, rest): (Vec<_>, Vec<_>) = varinfos
            .into_iter()
            .partition(|v| same_rel(v.rel, first.rel));
        varinfos = rest;

        let mut reldistinct = first.ndistinct;
        let mut relmaxndistinct = first.ndistinct;
        for other in &same {
            reldistinct *= other.ndistinct;
            relmaxndistinct = relmaxndistinct.max(other.ndistinct);
        }

        let rel = match first.rel {
            Some(rel) if rel.tuples > 0.0 => rel,
            _ => continue,
        };

        let mut clamp = rel.tuples;
        if !same.is_empty() {
            clamp *= 0.1;
            if clamp < relmaxndistinct {
                clamp = relmaxndistinct.min(rel.tuples);
            }
        }
        reldistinct = reldistinct.min(clamp);
        reldistinct *= rel.rows / rel.tuples;
        trace!(
            "Relation {} contributes {} groups from {} variables",
            rel.relids,
            reldistinct,
            same.len() + 1
        );
        numdistinct *= reldistinct;
    }

    let numdistinct = numdistinct.ceil().min(input_rows).max(1.0);
    debug!("Estimated {} groups from {} input rows", numdistinct, input_rows);
    Ok(numdistinct)
}

/// Fraction of the inner relation expected in one hash bucket when hashing on `hashkey`
/// with `nbuckets` buckets.
///
/// Starts from an even spread of the distinct values over the buckets, then scales up by
/// how much more common the most common value is than the average value.
pub fn estimate_hash_bucketsize(
    root: &PlannerInfo,
    hashkey: &Expr,
    nbuckets: usize,
) -> OptResult<Selectivity> {
    let vardata = examine_variable(root, hashkey, None)?;
    let mut ndistinct = get_variable_numdistinct(root, &vardata);

    let nullfrac = match vardata.stats() {
        Some(stats) => stats.null_frac,
        // a default distinct count means nothing is known
        None if ndistinct == root.context().selectivity.num_distinct => return Ok(0.1),
        None => 0.0,
    };

    let avgfreq = (1.0 - nullfrac) / ndistinct;

    // restrictions remove distinct values as well as rows
    if let Some(rel) = vardata.rel {
        if rel.tuples > 0.0 {
            ndistinct *= rel.rows / rel.tuples;
        }
    }

    let nbuckets = nbuckets.max(1) as f64;
    let mut estfract = if ndistinct > nbuckets {
        1.0 / nbuckets
    } else {
        1.0 / ndistinct
    };

    let mcvfreq = vardata
        .slot(StatisticKind::Mcv, None)
        .and_then(|mcv| mcv.numbers.first().copied())
        .unwrap_or(0.0);
    if avgfreq > 0.0 && mcvfreq > avgfreq {
        estfract *= mcvfreq / avgfreq;
    }

    Ok(estfract.clamp(1.0e-6, 1.0))
}
