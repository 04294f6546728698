//! Scan bounds from key predicates.
//!
//! A condition must be an `AND` of leaves over consecutive key fields in
//! increasing order:
//!
//! ```text
//!  AND ┬─ k0 = 5           start=(5)      end=(5)        keep going
//!      ├─ k1 BETWEEN 10 20 start=(5,10)   end=(5,20)     branched
//!      └─ k2 = 7           ignored, the caller re-filters
//! ```
//!
//! `=` narrows both bounds. `>=`, `<=` and `BETWEEN` narrow one or both
//! bounds and branch the range, after which later leaves cannot narrow the
//! prefix and are skipped with a warning.

use pgskv_common::{GateError, GateResult, SKV_FIELD_OFFSET};
use pgskv_store::{FieldValue, SkvRecord};
use tracing::warn;

use super::expr::{ExprOpcode, SqlOpCondition, SqlOpExpr, SqlValue};

/// Writes `value` into the field at the record cursor.
pub(crate) fn serialize_value(value: &SqlValue, record: &mut SkvRecord) -> GateResult<()> {
    let converted = convert_for_cursor(value, record)?;
    record.serialize_next_optional(converted)?;
    Ok(())
}

fn convert_for_cursor(value: &SqlValue, record: &SkvRecord) -> GateResult<Option<FieldValue>> {
    let field = record.schema().fields.get(record.cursor()).ok_or_else(|| {
        GateError::usage(format!(
            "no field at position {} of schema {}",
            record.cursor(),
            record.schema().name
        ))
    })?;
    value.to_field_value(field.field_type)
}

fn value_operand<'a>(expr: &'a SqlOpExpr, what: &str) -> GateResult<&'a SqlValue> {
    expr.as_value().ok_or_else(|| GateError::usage(format!("{what} must be a value")))
}

/// Narrows `start` and `end` by a top-level `AND` condition.
///
/// Returns true if the range branched. On error the records keep whatever
/// the leaves before the failing one wrote.
pub fn parse_cond_expr_as_range(
    condition: &SqlOpExpr,
    start: &mut SkvRecord,
    end: &mut SkvRecord,
) -> GateResult<bool> {
    let top = match condition {
        SqlOpExpr::Condition(c) if c.op == ExprOpcode::And => c,
        _ => {
            return Err(GateError::usage(
                "only an AND top-level condition is supported in a condition expression",
            ))
        }
    };

    let mut last_column: Option<i32> = None;
    let mut branched = false;
    for expr in &top.operands {
        if branched {
            warn!(?expr, "range branched at a previous key field; skipping condition");
            continue;
        }
        let SqlOpExpr::Condition(leaf) = expr else {
            return Err(GateError::usage("first-level nested expression must be a condition"));
        };
        branched = handle_leaf(leaf, start, end, &mut last_column)?;
    }
    Ok(branched)
}

fn handle_leaf(
    leaf: &SqlOpCondition,
    start: &mut SkvRecord,
    end: &mut SkvRecord,
    last_column: &mut Option<i32>,
) -> GateResult<bool> {
    let expected = if leaf.op == ExprOpcode::Between { 3 } else { 2 };
    if leaf.operands.len() != expected {
        return Err(GateError::usage(format!(
            "leaf condition has {} operands, expected {expected}",
            leaf.operands.len()
        )));
    }

    let SqlOpExpr::ColumnRef(column) = leaf.operands[0] else {
        return Err(GateError::usage("first operand of a leaf condition must be a column reference"));
    };
    if column < 0 {
        return Err(GateError::usage(format!("column reference {column} is a system field")));
    }
    if last_column.is_some_and(|last| column <= last) {
        return Err(GateError::usage(format!(
            "column {column} in leaf condition was already processed (last {last_column:?})"
        )));
    }
    // column >= 0 was checked above
    let field = column as usize + SKV_FIELD_OFFSET;
    if start.cursor() != field || end.cursor() != field {
        return Err(GateError::usage(format!(
            "column {column} in leaf condition refers to a non-consecutive field \
             (start at {}, end at {})",
            start.cursor(),
            end.cursor()
        )));
    }
    *last_column = Some(column);

    match leaf.op {
        ExprOpcode::Eq => {
            let value = convert_for_cursor(value_operand(&leaf.operands[1], "EQ operand")?, start)?;
            start.serialize_next_optional(value.clone())?;
            end.serialize_next_optional(value)?;
            Ok(false)
        }
        ExprOpcode::Ge => {
            let value = value_operand(&leaf.operands[1], "GE operand")?;
            serialize_value(value, start)?;
            Ok(true)
        }
        ExprOpcode::Le => {
            let value = value_operand(&leaf.operands[1], "LE operand")?;
            serialize_value(value, end)?;
            Ok(true)
        }
        ExprOpcode::Between => {
            let low = convert_for_cursor(value_operand(&leaf.operands[1], "BETWEEN bound")?, start)?;
            let high = convert_for_cursor(value_operand(&leaf.operands[2], "BETWEEN bound")?, end)?;
            start.serialize_next_optional(low)?;
            end.serialize_next_optional(high)?;
            Ok(true)
        }
        op => Err(GateError::usage(format!(
            "leaf condition operator must be one of EQ, GE, LE, BETWEEN, got {op:?}"
        ))),
    }
}
