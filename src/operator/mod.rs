//! Physical operators a path is made of, and their cost models.

use std::fmt::{Display, Formatter};

use enum_as_inner::EnumAsInner;
use enum_dispatch::enum_dispatch;

use crate::cost::PathCost;
use crate::error::OptResult;
use crate::planner::{PlannerInfo, RelOptInfo};

mod join;
pub use join::*;
mod table_scan;
pub use table_scan::*;

#[enum_dispatch]
pub trait PhysicalOperatorTrait {
    /// Cost of producing the rows of `rel`, the relation the operator's path belongs to.
    fn cost(&self, root: &PlannerInfo, rel: &RelOptInfo) -> OptResult<PathCost>;
}

/// Physical relational operator.
#[enum_dispatch(PhysicalOperatorTrait)]
#[derive(Clone, Debug, EnumAsInner)]
pub enum PhysicalOperator {
    PhysicalTableScan(TableScan),
    PhysicalIndexScan(IndexScan),
    PhysicalNestLoop(NestLoop),
    PhysicalMergeJoin(MergeJoin),
    PhysicalHashJoin(HashJoin),
}

impl Display for PhysicalOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PhysicalOperator::PhysicalTableScan(scan) => write!(f, "SeqScan({})", scan.relid()),
            PhysicalOperator::PhysicalIndexScan(scan) => {
                write!(f, "IndexScan({} using {})", scan.relid(), scan.index().oid)
            }
            PhysicalOperator::PhysicalNestLoop(join) => write!(f, "NestLoop {}", join.join()),
            PhysicalOperator::PhysicalMergeJoin(join) => write!(f, "MergeJoin {}", join.join()),
            PhysicalOperator::PhysicalHashJoin(join) => write!(f, "HashJoin {}", join.join()),
        }
    }
}
