use crate::error::ReconError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Tolerance under which a remaining balance counts as settled.
pub const EPSILON: Decimal = dec!(0.005);

/// Represents a positive monetary amount received from a payer.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, ReconError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(ReconError::Validation(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = ReconError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// True when `value` is large enough to be worth posting.
pub fn is_material(value: Decimal) -> bool {
    value > EPSILON
}

/// True when `paid` reaches `due` within the rounding tolerance.
pub fn is_settled(paid: Decimal, due: Decimal) -> bool {
    paid + EPSILON >= due
}

/// `a - b`, floored at zero.
pub fn saturating_sub(a: Decimal, b: Decimal) -> Decimal {
    (a - b).max(Decimal::ZERO)
}
