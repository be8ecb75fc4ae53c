use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Fixed-point decimal with 4 decimal places, stored as a scaled integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Amount(i64);

impl Amount {
    const SCALE: i64 = 10_000;

    pub fn from_float(value: f64) -> Self {
        Amount((value * Self::SCALE as f64).round() as i64)
    }

    pub fn from_scaled(value: i64) -> Self {
        Amount(value)
    }

    pub fn to_float(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        let whole = abs / Self::SCALE;
        let frac = abs % Self::SCALE;
        write!(f, "{sign}{whole}.{frac:04}")
    }
}

// Amounts cross the QR payload boundary as plain decimal numbers, so they
// serialize through the float representation rather than the scaled integer.
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_float())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Ok(Amount::from_float(value))
    }
}

impl std::ops::Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Amount(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Amount(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

/// Line totals are `unit price * quantity`.
impl std::ops::Mul<u32> for Amount {
    type Output = Self;

    fn mul(self, rhs: u32) -> Self::Output {
        Amount(self.0 * rhs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_scaled_preserves_value() {
        let amount = Amount::from_scaled(123456);
        assert_eq!(amount, Amount(123456));
    }

    #[test]
    fn from_float_converts_correctly() {
        assert_eq!(Amount::from_float(100.0), Amount::from_scaled(1_000_000));
        assert_eq!(Amount::from_float(1.5), Amount::from_scaled(15_000));
        assert_eq!(Amount::from_float(0.0001), Amount::from_scaled(1));
    }

    #[test]
    fn from_float_rounds_correctly() {
        assert_eq!(Amount::from_float(1.23456), Amount::from_scaled(12346));
        assert_eq!(Amount::from_float(1.23454), Amount::from_scaled(12345));
    }

    #[test]
    fn to_float_round_trips() {
        assert_eq!(Amount::from_float(30.0).to_float(), 30.0);
        assert_eq!(Amount::from_float(-0.5).to_float(), -0.5);
    }

    #[test]
    fn display_formats_positive() {
        assert_eq!(Amount::from_scaled(1_000_000).to_string(), "100.0000");
        assert_eq!(Amount::from_scaled(15_000).to_string(), "1.5000");
        assert_eq!(Amount::from_scaled(1).to_string(), "0.0001");
        assert_eq!(Amount::from_scaled(0).to_string(), "0.0000");
    }

    #[test]
    fn display_formats_negative() {
        assert_eq!(Amount::from_scaled(-502_500).to_string(), "-50.2500");
        assert_eq!(Amount::from_scaled(-1).to_string(), "-0.0001");
    }

    #[test]
    fn default_is_zero() {
        assert_eq!(Amount::default(), Amount::from_scaled(0));
    }

    #[test]
    fn add_and_sub() {
        let a = Amount::from_scaled(100);
        let b = Amount::from_scaled(50);
        assert_eq!(a + b, Amount::from_scaled(150));
        assert_eq!(a - b, Amount::from_scaled(50));
    }

    #[test]
    fn add_assign_and_sub_assign() {
        let mut a = Amount::from_scaled(100);
        a += Amount::from_scaled(50);
        assert_eq!(a, Amount::from_scaled(150));
        a -= Amount::from_scaled(30);
        assert_eq!(a, Amount::from_scaled(120));
    }

    #[test]
    fn mul_by_quantity() {
        let price = Amount::from_float(30.0);
        assert_eq!(price * 2, Amount::from_float(60.0));
        assert_eq!(price * 0, Amount::default());
    }

    #[test]
    fn ordering() {
        let small = Amount::from_scaled(100);
        let large = Amount::from_scaled(200);
        assert!(small < large);
        assert!(large > small);
    }

    #[test]
    fn serializes_as_decimal_number() {
        let json = serde_json::to_string(&Amount::from_float(60.0)).unwrap();
        assert_eq!(json, "60.0");

        let back: Amount = serde_json::from_str("60.0").unwrap();
        assert_eq!(back, Amount::from_float(60.0));
    }

    #[test]
    fn is_negative() {
        assert!(Amount::from_scaled(-1).is_negative());
        assert!(!Amount::from_scaled(0).is_negative());
        assert!(!Amount::from_scaled(1).is_negative());
    }
}
