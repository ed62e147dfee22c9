//! Reference handles for measurement outcomes and the comparisons built
//! from them.

use codec::{IfHeader, LogicalOperator, OperandKind};

/// Handle to a measurement outcome recorded server-side. Returned by
/// `measure` inside a pending program; the numeric outcome itself never
/// travels back before the conditional runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRef {
    ref_id: u32,
}

impl ValueRef {
    pub(crate) fn new(ref_id: u32) -> Self {
        Self { ref_id }
    }

    pub fn ref_id(&self) -> u32 {
        self.ref_id
    }

    /// `self == value`
    pub fn equals(self, value: u32) -> Condition {
        Condition {
            first: self.ref_id,
            operator: LogicalOperator::Eq,
            second_kind: OperandKind::Value,
            second: value,
        }
    }

    /// `self != value`
    pub fn differs(self, value: u32) -> Condition {
        self.equals(value).negated()
    }

    /// `self == other`
    pub fn equals_ref(self, other: ValueRef) -> Condition {
        Condition {
            first: self.ref_id,
            operator: LogicalOperator::Eq,
            second_kind: OperandKind::Ref,
            second: other.ref_id,
        }
    }

    /// `self != other`
    pub fn differs_ref(self, other: ValueRef) -> Condition {
        self.equals_ref(other).negated()
    }
}

/// A logical comparison between a reference handle and a literal or a
/// second reference handle. Feeds an IF header; an `else` branch carries
/// the negation of its `if`'s condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Condition {
    first: u32,
    operator: LogicalOperator,
    second_kind: OperandKind,
    second: u32,
}

impl Condition {
    pub fn negated(&self) -> Self {
        Self {
            operator: self.operator.negated(),
            ..*self
        }
    }

    pub(crate) fn to_if_header(&self, body_length: u32) -> IfHeader {
        IfHeader::new(
            self.first,
            self.operator,
            self.second_kind,
            self.second,
            body_length,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_shapes() {
        let outcome = ValueRef::new(3);
        let header = outcome.equals(1).to_if_header(9);
        assert_eq!(header.first_operand, 3);
        assert_eq!(header.operator, LogicalOperator::Eq);
        assert_eq!(header.second_operand_kind, OperandKind::Value);
        assert_eq!(header.second_operand, 1);
        assert_eq!(header.body_length, 9);

        let other = ValueRef::new(4);
        let header = outcome.differs_ref(other).to_if_header(0);
        assert_eq!(header.operator, LogicalOperator::Neq);
        assert_eq!(header.second_operand_kind, OperandKind::Ref);
        assert_eq!(header.second_operand, 4);
    }

    #[test]
    fn test_negation_only_flips_operator() {
        let condition = ValueRef::new(0).equals(1);
        let negated = condition.negated();
        assert_eq!(negated.negated(), condition);
        assert_eq!(negated.to_if_header(0).operator, LogicalOperator::Neq);
        assert_eq!(negated.to_if_header(0).second_operand, 1);
    }
}
