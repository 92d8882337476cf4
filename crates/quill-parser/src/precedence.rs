//! Operator precedence tables.
//!
//! Each grammar with binary operators gets a declarative table mapping an
//! operator token to a level and associativity. The climbing loop in the
//! engines only ever consults these tables, so an operator tree is fully
//! determined by the rows below.

use quill_lexer::TokenKind;

/// Precedence levels, loosest first. Derived ordering is the binding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Precedence {
    Arrow,
    Ternary,
    LogicalOr,
    LogicalAnd,
    Equality,
    Relation,
    Plus,
    Times,
    Unary,
}

impl Precedence {
    /// The next tighter level. Used as the minimum for the right operand of a
    /// left-associative operator.
    pub fn tighter(self) -> Precedence {
        match self {
            Precedence::Arrow => Precedence::Ternary,
            Precedence::Ternary => Precedence::LogicalOr,
            Precedence::LogicalOr => Precedence::LogicalAnd,
            Precedence::LogicalAnd => Precedence::Equality,
            Precedence::Equality => Precedence::Relation,
            Precedence::Relation => Precedence::Plus,
            Precedence::Plus => Precedence::Times,
            Precedence::Times | Precedence::Unary => Precedence::Unary,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

/// One table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operator {
    pub token: TokenKind,
    pub precedence: Precedence,
    pub associativity: Associativity,
}

const fn left(token: TokenKind, precedence: Precedence) -> Operator {
    Operator {
        token,
        precedence,
        associativity: Associativity::Left,
    }
}

/// A named set of binary operators.
#[derive(Debug, Clone, Copy)]
pub struct Table {
    pub name: &'static str,
    operators: &'static [Operator],
}

impl Table {
    pub fn lookup(&self, token: TokenKind) -> Option<Operator> {
        self.operators.iter().copied().find(|op| op.token == token)
    }

    pub fn operators(&self) -> &'static [Operator] {
        self.operators
    }

    /// Minimum level for the right operand of `op`: shifted for left
    /// associativity, unshifted for right.
    pub fn right_operand_min(op: Operator) -> Precedence {
        match op.associativity {
            Associativity::Left => op.precedence.tighter(),
            Associativity::Right => op.precedence,
        }
    }
}

/// EEL binary operators. `and`/`&&` and `or`/`||` scan to the same token.
/// Ternary and arrow are handled structurally at `Ternary` and `Arrow`.
pub const EEL: Table = Table {
    name: "expression",
    operators: &[
        left(TokenKind::Or, Precedence::LogicalOr),
        left(TokenKind::And, Precedence::LogicalAnd),
        left(TokenKind::EqEq, Precedence::Equality),
        left(TokenKind::NotEq, Precedence::Equality),
        left(TokenKind::Lt, Precedence::Relation),
        left(TokenKind::Lte, Precedence::Relation),
        left(TokenKind::Gt, Precedence::Relation),
        left(TokenKind::Gte, Precedence::Relation),
        left(TokenKind::Plus, Precedence::Plus),
        left(TokenKind::Minus, Precedence::Plus),
        left(TokenKind::Star, Precedence::Times),
        left(TokenKind::Slash, Precedence::Times),
        left(TokenKind::Percent, Precedence::Times),
    ],
};

/// RuneScript `if`/`while` conditions.
pub const RUNE_CONDITION: Table = Table {
    name: "condition",
    operators: &[
        left(TokenKind::Pipe, Precedence::LogicalOr),
        left(TokenKind::Amp, Precedence::LogicalAnd),
        left(TokenKind::Equals, Precedence::Equality),
        left(TokenKind::Bang, Precedence::Equality),
        left(TokenKind::Lt, Precedence::Relation),
        left(TokenKind::Lte, Precedence::Relation),
        left(TokenKind::Gt, Precedence::Relation),
        left(TokenKind::Gte, Precedence::Relation),
    ],
};

/// RuneScript `calc(...)` arithmetic.
pub const RUNE_ARITHMETIC: Table = Table {
    name: "calc",
    operators: &[
        left(TokenKind::Pipe, Precedence::LogicalOr),
        left(TokenKind::Amp, Precedence::LogicalAnd),
        left(TokenKind::Plus, Precedence::Plus),
        left(TokenKind::Minus, Precedence::Plus),
        left(TokenKind::Star, Precedence::Times),
        left(TokenKind::Slash, Precedence::Times),
        left(TokenKind::Percent, Precedence::Times),
    ],
};

/// Operators that belong to a sibling RuneScript table but not to `table`.
/// Seeing one of these means the operator has no level in this context.
pub fn foreign_rune_operator(table: &Table, token: TokenKind) -> bool {
    table.lookup(token).is_none()
        && [RUNE_CONDITION, RUNE_ARITHMETIC]
            .iter()
            .any(|other| other.lookup(token).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_times_binds_tighter_than_plus() {
        let times = EEL.lookup(TokenKind::Star).unwrap().precedence;
        let plus = EEL.lookup(TokenKind::Plus).unwrap().precedence;
        assert!(times > plus);
    }

    #[test]
    fn test_ternary_and_arrow_are_loosest() {
        for op in EEL.operators() {
            assert!(op.precedence > Precedence::Ternary);
        }
        assert!(Precedence::Arrow < Precedence::Ternary);
    }

    #[test]
    fn test_no_duplicate_rows() {
        for table in [EEL, RUNE_CONDITION, RUNE_ARITHMETIC] {
            for (i, op) in table.operators().iter().enumerate() {
                let dupes = table.operators()[i + 1..]
                    .iter()
                    .filter(|other| other.token == op.token)
                    .count();
                assert_eq!(dupes, 0, "{:?} listed twice in {}", op.token, table.name);
            }
        }
    }

    #[test]
    fn test_left_associative_shift() {
        let plus = EEL.lookup(TokenKind::Plus).unwrap();
        assert_eq!(Table::right_operand_min(plus), Precedence::Times);
    }

    #[test]
    fn test_rune_condition_order() {
        let or = RUNE_CONDITION.lookup(TokenKind::Pipe).unwrap().precedence;
        let and = RUNE_CONDITION.lookup(TokenKind::Amp).unwrap().precedence;
        let eq = RUNE_CONDITION.lookup(TokenKind::Equals).unwrap().precedence;
        let cmp = RUNE_CONDITION.lookup(TokenKind::Lt).unwrap().precedence;
        assert!(or < and && and < eq && eq < cmp);
    }

    #[test]
    fn test_foreign_operators() {
        assert!(foreign_rune_operator(&RUNE_CONDITION, TokenKind::Plus));
        assert!(foreign_rune_operator(&RUNE_ARITHMETIC, TokenKind::Equals));
        assert!(!foreign_rune_operator(&RUNE_ARITHMETIC, TokenKind::Plus));
        assert!(!foreign_rune_operator(&RUNE_CONDITION, TokenKind::Semicolon));
    }
}
