//! Expression trees handed to the estimators.

use std::fmt::{Display, Formatter};

use enum_as_inner::EnumAsInner;
use itertools::Itertools;
use strum_macros::{Display as StrumDisplay, EnumIter};

use crate::datum::{DataType, Datum, Oid};
use crate::relids::{Relids, RtIndex};

/// 1-based column number inside a relation or index.
pub type AttrNumber = i16;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Var {
    pub varno: RtIndex,
    pub varattno: AttrNumber,
    pub vartype: DataType,
    pub vartypmod: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Const {
    pub consttype: DataType,
    /// `None` is SQL null.
    pub value: Option<Datum>,
}

impl Const {
    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }
}

/// Binary-compatible type relabeling, transparent to the estimators.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RelabelType {
    pub arg: Box<Expr>,
    pub resulttype: DataType,
    pub resulttypmod: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FuncExpr {
    pub funcid: Oid,
    pub args: Vec<Expr>,
    pub rettype: DataType,
    pub volatile: bool,
}

/// Operator application; the result is always boolean.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OpExpr {
    pub opno: Oid,
    pub args: Vec<Expr>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, StrumDisplay, EnumIter)]
pub enum BoolTestType {
    #[strum(serialize = "IS TRUE")]
    IsTrue,
    #[strum(serialize = "IS NOT TRUE")]
    IsNotTrue,
    #[strum(serialize = "IS FALSE")]
    IsFalse,
    #[strum(serialize = "IS NOT FALSE")]
    IsNotFalse,
    #[strum(serialize = "IS UNKNOWN")]
    IsUnknown,
    #[strum(serialize = "IS NOT UNKNOWN")]
    IsNotUnknown,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BooleanTest {
    pub arg: Box<Expr>,
    pub test: BoolTestType,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, StrumDisplay)]
pub enum NullTestType {
    #[strum(serialize = "IS NULL")]
    IsNull,
    #[strum(serialize = "IS NOT NULL")]
    IsNotNull,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NullTest {
    pub arg: Box<Expr>,
    pub test: NullTestType,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, EnumAsInner)]
pub enum Expr {
    Var(Var),
    Const(Const),
    Relabel(RelabelType),
    Func(FuncExpr),
    Op(OpExpr),
    BoolTest(BooleanTest),
    NullTest(NullTest),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn var(varno: RtIndex, varattno: AttrNumber, vartype: DataType) -> Self {
        Expr::Var(Var {
            varno,
            varattno,
            vartype,
            vartypmod: -1,
        })
    }

    pub fn constant(consttype: DataType, value: Datum) -> Self {
        Expr::Const(Const {
            consttype,
            value: Some(value),
        })
    }

    pub fn null(consttype: DataType) -> Self {
        Expr::Const(Const {
            consttype,
            value: None,
        })
    }

    pub fn op(opno: Oid, left: Expr, right: Expr) -> Self {
        Expr::Op(OpExpr {
            opno,
            args: vec![left, right],
        })
    }

    pub fn relabel(arg: Expr, resulttype: DataType) -> Self {
        Expr::Relabel(RelabelType {
            arg: Box::new(arg),
            resulttype,
            resulttypmod: -1,
        })
    }

    pub fn func(funcid: Oid, rettype: DataType, args: Vec<Expr>) -> Self {
        Expr::Func(FuncExpr {
            funcid,
            args,
            rettype,
            volatile: false,
        })
    }

    pub fn bool_test(arg: Expr, test: BoolTestType) -> Self {
        Expr::BoolTest(BooleanTest {
            arg: Box::new(arg),
            test,
        })
    }

    pub fn null_test(arg: Expr, test: NullTestType) -> Self {
        Expr::NullTest(NullTest {
            arg: Box::new(arg),
            test,
        })
    }

    pub fn expr_type(&self) -> DataType {
        match self {
            Expr::Var(v) => v.vartype,
            Expr::Const(c) => c.consttype,
            Expr::Relabel(r) => r.resulttype,
            Expr::Func(f) => f.rettype,
            _ => DataType::Bool,
        }
    }

    pub fn expr_typmod(&self) -> i32 {
        match self {
            Expr::Var(v) => v.vartypmod,
            Expr::Relabel(r) => r.resulttypmod,
            _ => -1,
        }
    }

    /// Peels one binary-compatible relabeling.
    pub fn strip_relabel(&self) -> &Expr {
        match self {
            Expr::Relabel(r) => &r.arg,
            other => other,
        }
    }

    fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Var(_) | Expr::Const(_) => vec![],
            Expr::Relabel(r) => vec![&*r.arg],
            Expr::Func(f) => f.args.iter().collect(),
            Expr::Op(o) => o.args.iter().collect(),
            Expr::BoolTest(b) => vec![&*b.arg],
            Expr::NullTest(n) => vec![&*n.arg],
            Expr::And(args) | Expr::Or(args) => args.iter().collect(),
            Expr::Not(arg) => vec![&**arg],
        }
    }

    fn children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Expr::Var(_) | Expr::Const(_) => vec![],
            Expr::Relabel(r) => vec![&mut *r.arg],
            Expr::Func(f) => f.args.iter_mut().collect(),
            Expr::Op(o) => o.args.iter_mut().collect(),
            Expr::BoolTest(b) => vec![&mut *b.arg],
            Expr::NullTest(n) => vec![&mut *n.arg],
            Expr::And(args) | Expr::Or(args) => args.iter_mut().collect(),
            Expr::Not(arg) => vec![&mut **arg],
        }
    }

    /// Range table indexes referenced anywhere in the tree.
    pub fn varnos(&self) -> Relids {
        self.pull_vars().into_iter().map(|v| v.varno).collect()
    }

    /// Distinct Vars in first-seen order.
    pub fn pull_vars(&self) -> Vec<Var> {
        let mut vars = Vec::new();
        self.collect_vars(&mut vars);
        vars
    }

    fn collect_vars(&self, vars: &mut Vec<Var>) {
        if let Expr::Var(v) = self {
            if !vars.contains(v) {
                vars.push(v.clone());
            }
        }
        for child in self.children() {
            child.collect_vars(vars);
        }
    }

    pub fn contain_volatile_functions(&self) -> bool {
        if let Expr::Func(f) = self {
            if f.volatile {
                return true;
            }
        }
        self.children()
            .into_iter()
            .any(|c| c.contain_volatile_functions())
    }

    /// No Vars and nothing volatile: the value is fixed for one execution.
    pub fn is_pseudo_constant(&self) -> bool {
        self.varnos().is_empty() && !self.contain_volatile_functions()
    }

    /// Counts operator and function nodes, each costing one operator evaluation.
    pub fn count_operators(&self) -> usize {
        let own = matches!(self, Expr::Op(_) | Expr::Func(_)) as usize;
        own + self
            .children()
            .into_iter()
            .map(|c| c.count_operators())
            .sum::<usize>()
    }

    /// Rewrites every Var to point at `varno`. Catalog index expressions are stored with
    /// varno 0 and bound to the range table position when the relation is built.
    pub fn set_varno(&mut self, varno: RtIndex) {
        if let Expr::Var(v) = self {
            v.varno = varno;
        }
        for child in self.children_mut() {
            child.set_varno(varno);
        }
    }

    /// Folds what can be folded without evaluating operators: relabeled constants.
    pub fn estimate_expression_value(&self) -> Expr {
        match self {
            Expr::Relabel(r) => match r.arg.estimate_expression_value() {
                Expr::Const(c) => Expr::Const(Const {
                    consttype: r.resulttype,
                    value: c.value,
                }),
                arg => Expr::Relabel(RelabelType {
                    arg: Box::new(arg),
                    resulttype: r.resulttype,
                    resulttypmod: r.resulttypmod,
                }),
            },
            other => other.clone(),
        }
    }

    /// Left and right operand of a two-argument operator clause.
    pub fn binary_args(&self) -> Option<(Oid, &Expr, &Expr)> {
        match self {
            Expr::Op(OpExpr { opno, args }) if args.len() == 2 => {
                Some((*opno, &args[0], &args[1]))
            }
            _ => None,
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Var(v) => write!(f, "${}.{}", v.varno, v.varattno),
            Expr::Const(Const { value: Some(d), .. }) => write!(f, "{}", d),
            Expr::Const(Const { value: None, .. }) => write!(f, "NULL"),
            Expr::Relabel(r) => write!(f, "{}::{}", r.arg, r.resulttype),
            Expr::Func(func) => write!(f, "f{}({})", func.funcid, func.args.iter().join(", ")),
            Expr::Op(o) => match o.args.as_slice() {
                [l, r] => write!(f, "({} op{} {})", l, o.opno, r),
                args => write!(f, "op{}({})", o.opno, args.iter().join(", ")),
            },
            Expr::BoolTest(b) => write!(f, "{} {}", b.arg, b.test),
            Expr::NullTest(n) => write!(f, "{} {}", n.arg, n.test),
            Expr::And(args) => write!(f, "({})", args.iter().join(" AND ")),
            Expr::Or(args) => write!(f, "({})", args.iter().join(" OR ")),
            Expr::Not(arg) => write!(f, "NOT {}", arg),
        }
    }
}
