//! Fixed-point math utilities for deterministic simulation.
//!
//! Simulation rates use unsigned 16.16 fixed point so that tick
//! accumulation is plain integer addition with well-defined wraparound.
//! Floating-point values never enter simulation state.

use fixed::types::U16F16;

/// Unsigned 16.16 fixed-point number used for rates.
///
/// Range: 0 to 65535.99998, precision 1/65536.
pub type Fixed16 = U16F16;

/// One whole unit in raw 16.16 bits.
pub const ONE_BITS: u32 = 1 << 16;

/// Serde support for 16.16 fixed-point numbers.
///
/// Serializes as the raw bit representation (u32) to preserve exact
/// precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed16;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed16, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed16, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = u32::deserialize(deserializer)?;
        Ok(Fixed16::from_bits(bits))
    }
}

/// Whole part of a raw 16.16 value.
#[inline]
#[must_use]
pub const fn whole_part(bits: u32) -> u32 {
    bits >> 16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_determinism() {
        // Same operations must produce identical results
        let a = Fixed16::from_num(1) / Fixed16::from_num(3);
        let b = Fixed16::from_num(1) / Fixed16::from_num(3);
        assert_eq!(a, b);
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn test_raw_layout() {
        assert_eq!(Fixed16::from_num(2).to_bits(), 0x20000);
        assert_eq!(Fixed16::from_bits(ONE_BITS), Fixed16::from_num(1));
        assert_eq!(whole_part(0x2_8000), 2);
    }

    #[test]
    fn test_serde_uses_raw_bits() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Wrapper(#[serde(with = "fixed_serde")] Fixed16);

        let value = Wrapper(Fixed16::from_bits(0x1_8000));
        let bytes = bincode::serialize(&value).unwrap();
        assert_eq!(bytes, bincode::serialize(&0x1_8000u32).unwrap());
        let back: Wrapper = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, value);
    }
}
