//! Numeric values held in stack levels and registers.
//!
//! The arbitrary-precision arithmetic itself is delegated to `rust_decimal`;
//! this module adds the special values (NaN, signed infinity) the register
//! file has to represent and the packed loop-counter arithmetic used by the
//! DSE/ISG primitives. Transcendental payloads bridge through `f64`.

use std::cmp::Ordering;
use std::fmt;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Num(Decimal),
    /// Signed infinity; `true` means negative.
    Inf(bool),
    NaN,
}

impl Default for Value {
    fn default() -> Self {
        Value::Num(Decimal::ZERO)
    }
}

impl Value {
    pub const ZERO: Value = Value::Num(Decimal::ZERO);
    pub const ONE: Value = Value::Num(Decimal::ONE);

    pub fn pi() -> Value {
        Value::Num(Decimal::PI)
    }

    pub fn from_i64(v: i64) -> Value {
        Value::Num(Decimal::from(v))
    }

    pub fn from_f64(v: f64) -> Value {
        if v.is_nan() {
            Value::NaN
        } else if v.is_infinite() {
            Value::Inf(v < 0.0)
        } else {
            Decimal::from_f64(v).map(Value::Num).unwrap_or(Value::NaN)
        }
    }

    /// Truncating integer conversion; `None` for NaN, infinities, and values
    /// outside the `i64` range.
    pub fn to_i64(self) -> Option<i64> {
        match self {
            Value::Num(d) => d.trunc().to_i64(),
            _ => None,
        }
    }

    pub fn to_f64(self) -> f64 {
        match self {
            Value::Num(d) => d.to_f64().unwrap_or(f64::NAN),
            Value::Inf(false) => f64::INFINITY,
            Value::Inf(true) => f64::NEG_INFINITY,
            Value::NaN => f64::NAN,
        }
    }

    pub fn is_nan(self) -> bool {
        matches!(self, Value::NaN)
    }

    pub fn is_infinite(self) -> bool {
        matches!(self, Value::Inf(_))
    }

    pub fn is_finite(self) -> bool {
        matches!(self, Value::Num(_))
    }

    pub fn is_zero(self) -> bool {
        matches!(self, Value::Num(d) if d.is_zero())
    }

    pub fn is_negative(self) -> bool {
        match self {
            Value::Num(d) => d.is_sign_negative() && !d.is_zero(),
            Value::Inf(neg) => neg,
            Value::NaN => false,
        }
    }

    pub fn neg(self) -> Value {
        match self {
            Value::Num(d) => Value::Num(-d),
            Value::Inf(neg) => Value::Inf(!neg),
            Value::NaN => Value::NaN,
        }
    }

    pub fn abs(self) -> Value {
        match self {
            Value::Num(d) => Value::Num(d.abs()),
            Value::Inf(_) => Value::Inf(false),
            Value::NaN => Value::NaN,
        }
    }

    pub fn add(self, rhs: Value) -> Value {
        match (self, rhs) {
            (Value::Num(a), Value::Num(b)) => match a.checked_add(b) {
                Some(sum) => Value::Num(sum),
                None => Value::Inf(a.is_sign_negative() && b.is_sign_negative()),
            },
            (Value::Inf(a), Value::Inf(b)) if a == b => Value::Inf(a),
            (Value::Inf(_), Value::Inf(_)) => Value::NaN,
            (Value::Inf(neg), Value::Num(_)) | (Value::Num(_), Value::Inf(neg)) => Value::Inf(neg),
            _ => Value::NaN,
        }
    }

    pub fn sub(self, rhs: Value) -> Value {
        self.add(rhs.neg())
    }

    pub fn mul(self, rhs: Value) -> Value {
        match (self, rhs) {
            (Value::Num(a), Value::Num(b)) => match a.checked_mul(b) {
                Some(prod) => Value::Num(prod),
                None => Value::Inf(a.is_sign_negative() != b.is_sign_negative()),
            },
            (Value::NaN, _) | (_, Value::NaN) => Value::NaN,
            // inf * 0 is undefined; otherwise the sign rule applies.
            (a, b) if a.is_zero() || b.is_zero() => Value::NaN,
            (a, b) => Value::Inf(a.is_negative() != b.is_negative()),
        }
    }

    pub fn div(self, rhs: Value) -> Value {
        match (self, rhs) {
            (Value::Num(a), Value::Num(b)) => {
                if b.is_zero() {
                    if a.is_zero() {
                        Value::NaN
                    } else {
                        Value::Inf(a.is_sign_negative())
                    }
                } else {
                    match a.checked_div(b) {
                        Some(q) => Value::Num(q),
                        None => Value::Inf(a.is_sign_negative() != b.is_sign_negative()),
                    }
                }
            }
            (Value::NaN, _) | (_, Value::NaN) => Value::NaN,
            (Value::Inf(_), Value::Inf(_)) => Value::NaN,
            (Value::Inf(neg), Value::Num(b)) => Value::Inf(neg != b.is_sign_negative()),
            (Value::Num(_), Value::Inf(_)) => Value::ZERO,
        }
    }

    pub fn rem(self, rhs: Value) -> Value {
        match (self, rhs) {
            (Value::Num(a), Value::Num(b)) if !b.is_zero() => {
                a.checked_rem(b).map(Value::Num).unwrap_or(Value::NaN)
            }
            _ => Value::NaN,
        }
    }

    /// Total ordering is only defined between non-NaN values.
    pub fn compare(self, rhs: Value) -> Option<Ordering> {
        match (self, rhs) {
            (Value::NaN, _) | (_, Value::NaN) => None,
            (Value::Num(a), Value::Num(b)) => Some(a.cmp(&b)),
            (Value::Inf(a), Value::Inf(b)) => Some(b.cmp(&a)), // -inf < +inf
            (Value::Inf(true), _) => Some(Ordering::Less),
            (Value::Inf(false), _) => Some(Ordering::Greater),
            (_, Value::Inf(true)) => Some(Ordering::Greater),
            (_, Value::Inf(false)) => Some(Ordering::Less),
        }
    }

    pub fn trunc(self) -> Value {
        match self {
            Value::Num(d) => Value::Num(d.trunc()),
            other => other,
        }
    }

    pub fn fract(self) -> Value {
        match self {
            Value::Num(d) => Value::Num(d.fract()),
            Value::Inf(_) => Value::NaN,
            Value::NaN => Value::NaN,
        }
    }

    /// -1, 0, or +1 by sign.
    pub fn signum(self) -> Value {
        match self {
            Value::Num(d) if d.is_zero() => Value::ZERO,
            v if v.is_negative() => Value::Num(-Decimal::ONE),
            Value::NaN => Value::NaN,
            _ => Value::ONE,
        }
    }

    /// Split a packed loop counter `iiiii.fffcc` into (counter, limit, step).
    /// A zero step field means step 1. `None` for non-finite counters.
    pub fn counter_parts(self) -> Option<(Decimal, Decimal, Decimal)> {
        let d = match self {
            Value::Num(d) => d,
            _ => return None,
        };
        let int = d.trunc();
        let fract = d.fract().abs();
        let thousand = Decimal::from(1_000i64);
        let hundred = Decimal::from(100i64);
        let fffcc = (fract * thousand * hundred).trunc();
        let limit = (fract * thousand).trunc();
        let step_digits = fffcc - limit * hundred;
        let step = if step_digits.is_zero() {
            Decimal::ONE
        } else {
            step_digits
        };
        Some((int, limit, step))
    }

    /// Replace the integer part of a packed counter, keeping its fraction.
    pub fn with_counter(self, counter: Decimal) -> Value {
        match self {
            Value::Num(d) => {
                let fract = d.fract().abs();
                let packed = if counter.is_sign_negative() {
                    counter - fract
                } else {
                    counter + fract
                };
                Value::Num(packed)
            }
            other => other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Num(d) => write!(f, "{d}"),
            Value::Inf(false) => write!(f, "+inf"),
            Value::Inf(true) => write!(f, "-inf"),
            Value::NaN => write!(f, "NaN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(s: &str) -> Value {
        Value::Num(s.parse().unwrap())
    }

    #[test]
    fn division_by_zero_is_signed_infinity() {
        assert_eq!(num("5").div(Value::ZERO), Value::Inf(false));
        assert_eq!(num("-5").div(Value::ZERO), Value::Inf(true));
        assert_eq!(Value::ZERO.div(Value::ZERO), Value::NaN);
    }

    #[test]
    fn nan_propagates_and_never_orders() {
        assert_eq!(Value::NaN.add(Value::ONE), Value::NaN);
        assert!(Value::NaN.compare(Value::NaN).is_none());
        assert!(Value::ONE.compare(Value::NaN).is_none());
    }

    #[test]
    fn infinities_order_around_finite_values() {
        assert_eq!(
            Value::Inf(true).compare(num("-1e20")),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Inf(false).compare(num("1e20")), Some(Ordering::Greater));
        assert_eq!(Value::Inf(true).compare(Value::Inf(false)), Some(Ordering::Less));
    }

    #[test]
    fn counter_parts_defaults_step_to_one() {
        let (int, limit, step) = num("12.010").counter_parts().unwrap();
        assert_eq!(int, Decimal::from(12));
        assert_eq!(limit, Decimal::from(10));
        assert_eq!(step, Decimal::ONE);

        let (int, limit, step) = num("5.01002").counter_parts().unwrap();
        assert_eq!(int, Decimal::from(5));
        assert_eq!(limit, Decimal::from(10));
        assert_eq!(step, Decimal::from(2));
    }

    #[test]
    fn with_counter_preserves_fraction_and_sign() {
        let v = num("7.00302").with_counter(Decimal::from(9));
        assert_eq!(v, num("9.00302"));
        let v = num("7.003").with_counter(Decimal::from(-2));
        assert_eq!(v, num("-2.003"));
    }

    #[test]
    fn to_i64_truncates_and_rejects_specials() {
        assert_eq!(num("3.9").to_i64(), Some(3));
        assert_eq!(num("-3.9").to_i64(), Some(-3));
        assert_eq!(Value::NaN.to_i64(), None);
        assert_eq!(Value::Inf(false).to_i64(), None);
    }
}
