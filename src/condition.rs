//! Watch and breakpoint condition expressions: `(x, op, y)` triples
//! evaluated against value descriptors.
//!
//! Operator detection order is grounded on the original
//! `build_cond_by_expr`: `<`/`>` are checked first (classifying a
//! following `=` as `<=`/`>=`), then `!` (always `!=`), and only then a
//! bare `=` — since `=` is a substring of every other operator's text
//! form, it has to be tried last.

use crate::machine::Machine;
use crate::value_desc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Lt,
    Gt,
    Eq,
    Geq,
    Leq,
    Neq,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Lt => "<",
            Op::Gt => ">",
            Op::Eq => "=",
            Op::Geq => ">=",
            Op::Leq => "<=",
            Op::Neq => "!=",
        }
    }

    fn apply(self, x: i64, y: i64) -> bool {
        match self {
            Op::Lt => x < y,
            Op::Gt => x > y,
            Op::Eq => x == y,
            Op::Geq => x >= y,
            Op::Leq => x <= y,
            Op::Neq => x != y,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub x: String,
    pub y: String,
    pub op: Op,
}

#[derive(Debug)]
pub struct InvalidConditionExpr;

/// Parse `x OP y` into a [Condition]. `expr` is expected to already have
/// had any internal whitespace the user typed merged away by the caller.
pub fn build_condition(expr: &str) -> Result<Condition, InvalidConditionExpr> {
    let (op, op_pos, op_len) = if let Some(pos) = expr.find('<') {
        if expr.as_bytes().get(pos + 1) == Some(&b'=') {
            (Op::Leq, pos, 2)
        } else {
            (Op::Lt, pos, 1)
        }
    } else if let Some(pos) = expr.find('>') {
        if expr.as_bytes().get(pos + 1) == Some(&b'=') {
            (Op::Geq, pos, 2)
        } else {
            (Op::Gt, pos, 1)
        }
    } else if let Some(pos) = expr.find('!') {
        (Op::Neq, pos, 2)
    } else if let Some(pos) = expr.find('=') {
        (Op::Eq, pos, 1)
    } else {
        return Err(InvalidConditionExpr);
    };

    let x = expr[..op_pos].trim().to_string();
    let y = expr[op_pos + op_len..].trim().to_string();
    if !value_desc::is_valid_syntax(&x) || !value_desc::is_valid_syntax(&y) {
        return Err(InvalidConditionExpr);
    }
    Ok(Condition { x, y, op })
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.x, self.op.as_str(), self.y)
    }
}

/// Whether `condition` currently holds. Any value-descriptor evaluation
/// error means the condition does not hold, mirroring the original's
/// "any evaluation error means false" policy.
pub fn condition_holds(condition: &Condition, machine: &Machine) -> bool {
    let x = value_desc::evaluate(&condition.x, machine);
    let y = value_desc::evaluate(&condition.y, machine);
    match (x, y) {
        (Ok(x), Ok(y)) => condition.op.apply(x, y),
        _ => false,
    }
}

/// The first condition in `list` that currently holds, if any.
pub fn find_true_condition<'a>(list: &'a [Condition], machine: &Machine) -> Option<&'a Condition> {
    list.iter().find(|c| condition_holds(c, machine))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_detection_order() {
        assert_eq!(build_condition("%eax<5").unwrap().op, Op::Lt);
        assert_eq!(build_condition("%eax<=5").unwrap().op, Op::Leq);
        assert_eq!(build_condition("%eax>5").unwrap().op, Op::Gt);
        assert_eq!(build_condition("%eax>=5").unwrap().op, Op::Geq);
        assert_eq!(build_condition("%eax!=5").unwrap().op, Op::Neq);
        assert_eq!(build_condition("%eax=5").unwrap().op, Op::Eq);
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert!(build_condition("%eax").is_err());
        assert!(build_condition("=5").is_err());
    }

    #[test]
    fn rejects_invalid_value_descriptors() {
        assert!(build_condition("%nope<5").is_err());
        assert!(build_condition("garbage=1").is_err());
        assert!(build_condition("$$$<5").is_err());
    }

    #[test]
    fn display_round_trip() {
        let c = build_condition("%eax=5").unwrap();
        assert_eq!(c.to_string(), "%eax = 5");
    }
}
