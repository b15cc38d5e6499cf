//! Operator tags carried in the operand byte of rewritten opcodes.

use crate::Opcode;

enum_try_from! {
    /// Binary operator selector for [`Opcode::BinaryOpAnamorphic`] and
    /// [`Opcode::InplaceOpAnamorphic`].
    ///
    /// The numbering is part of the ABI; the interpreter indexes its
    /// dispatch tables with it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    #[repr(u8)]
    pub enum BinaryOp {
        /// `@`
        Matmul = 0,
        /// `**`
        Pow = 1,
        /// `*`
        Mul = 2,
        /// `%`
        Mod = 3,
        /// `+`
        Add = 4,
        /// `-`
        Sub = 5,
        /// `//`
        Floordiv = 6,
        /// `/`
        Truediv = 7,
        /// `<<`
        Lshift = 8,
        /// `>>`
        Rshift = 9,
        /// `&`
        And = 10,
        /// `^`
        Xor = 11,
        /// `|`
        Or = 12,
    },
    u8
}

enum_try_from! {
    /// Comparison selector carried by [`Opcode::CompareOp`].
    ///
    /// The numbering is part of the ABI shared with the compiler.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    #[repr(u8)]
    pub enum CompareOp {
        /// `<`
        Lt = 0,
        /// `<=`
        Le = 1,
        /// `==`
        Eq = 2,
        /// `!=`
        Ne = 3,
        /// `>`
        Gt = 4,
        /// `>=`
        Ge = 5,
        /// `in`
        In = 6,
        /// `not in`
        NotIn = 7,
        /// `is`
        Is = 8,
        /// `is not`
        IsNot = 9,
        /// Exception match in an except clause.
        ExcMatch = 10,
    },
    u8
}

impl CompareOp {
    /// Whether this comparator is one of the six ordered comparisons.
    pub const fn is_ordered(&self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Eq | Self::Ne | Self::Gt | Self::Ge)
    }
}

impl Opcode {
    /// The operator tag for a binary opcode, if this is one.
    pub const fn binary_op(&self) -> Option<BinaryOp> {
        match self {
            Self::BinaryMatrixMultiply => Some(BinaryOp::Matmul),
            Self::BinaryPower => Some(BinaryOp::Pow),
            Self::BinaryMultiply => Some(BinaryOp::Mul),
            Self::BinaryModulo => Some(BinaryOp::Mod),
            Self::BinaryAdd => Some(BinaryOp::Add),
            Self::BinarySubtract => Some(BinaryOp::Sub),
            Self::BinaryFloorDivide => Some(BinaryOp::Floordiv),
            Self::BinaryTrueDivide => Some(BinaryOp::Truediv),
            Self::BinaryLshift => Some(BinaryOp::Lshift),
            Self::BinaryRshift => Some(BinaryOp::Rshift),
            Self::BinaryAnd => Some(BinaryOp::And),
            Self::BinaryXor => Some(BinaryOp::Xor),
            Self::BinaryOr => Some(BinaryOp::Or),
            _ => None,
        }
    }

    /// The operator tag for an in-place opcode, if this is one.
    pub const fn inplace_binary_op(&self) -> Option<BinaryOp> {
        match self {
            Self::InplaceMatrixMultiply => Some(BinaryOp::Matmul),
            Self::InplacePower => Some(BinaryOp::Pow),
            Self::InplaceMultiply => Some(BinaryOp::Mul),
            Self::InplaceModulo => Some(BinaryOp::Mod),
            Self::InplaceAdd => Some(BinaryOp::Add),
            Self::InplaceSubtract => Some(BinaryOp::Sub),
            Self::InplaceFloorDivide => Some(BinaryOp::Floordiv),
            Self::InplaceTrueDivide => Some(BinaryOp::Truediv),
            Self::InplaceLshift => Some(BinaryOp::Lshift),
            Self::InplaceRshift => Some(BinaryOp::Rshift),
            Self::InplaceAnd => Some(BinaryOp::And),
            Self::InplaceXor => Some(BinaryOp::Xor),
            Self::InplaceOr => Some(BinaryOp::Or),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn binary_op_tags_are_dense_from_zero() {
        for (i, op) in BinaryOp::iter().enumerate() {
            assert_eq!(op as u8, i as u8);
            assert_eq!(BinaryOp::try_from(op as u8), Ok(op));
        }
        assert!(BinaryOp::try_from(13).is_err());
    }

    #[test]
    fn compare_op_tags_are_dense_from_zero() {
        for (i, op) in CompareOp::iter().enumerate() {
            assert_eq!(op as u8, i as u8);
            assert_eq!(CompareOp::try_from(op as u8), Ok(op));
        }
        assert!(CompareOp::try_from(11).is_err());
    }

    #[test]
    fn every_binary_opcode_has_an_inplace_twin_with_the_same_tag() {
        let pairs = [
            (Opcode::BinaryMatrixMultiply, Opcode::InplaceMatrixMultiply),
            (Opcode::BinaryPower, Opcode::InplacePower),
            (Opcode::BinaryMultiply, Opcode::InplaceMultiply),
            (Opcode::BinaryModulo, Opcode::InplaceModulo),
            (Opcode::BinaryAdd, Opcode::InplaceAdd),
            (Opcode::BinarySubtract, Opcode::InplaceSubtract),
            (Opcode::BinaryFloorDivide, Opcode::InplaceFloorDivide),
            (Opcode::BinaryTrueDivide, Opcode::InplaceTrueDivide),
            (Opcode::BinaryLshift, Opcode::InplaceLshift),
            (Opcode::BinaryRshift, Opcode::InplaceRshift),
            (Opcode::BinaryAnd, Opcode::InplaceAnd),
            (Opcode::BinaryXor, Opcode::InplaceXor),
            (Opcode::BinaryOr, Opcode::InplaceOr),
        ];
        for (binary, inplace) in pairs {
            assert_eq!(binary.binary_op(), inplace.inplace_binary_op());
            assert!(binary.binary_op().is_some());
            assert!(binary.inplace_binary_op().is_none());
            assert!(inplace.binary_op().is_none());
        }
    }
}
