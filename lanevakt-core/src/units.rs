//! Fixed-point unit conversion helpers.
//!
//! Lending pools report amounts in wad (1e18) token units and interest rates
//! in ray (1e27) fixed point. Metrics are published as `f64`, so conversion
//! walks the `U256` limbs instead of narrowing through a smaller integer.

use ethers_core::types::U256;

/// Wad scale: token amounts carry 18 decimals.
pub const WAD: f64 = 1e18;

/// Ray scale: interest rates carry 27 decimals.
pub const RAY: f64 = 1e27;

/// Lossy conversion from a 256-bit integer to `f64`.
///
/// Precision degrades above 2^53 as with any double, which is acceptable for
/// gauge publication; exact values stay in `U256` on the domain types.
pub fn u256_to_f64(value: U256) -> f64 {
    value
        .0
        .iter()
        .enumerate()
        .map(|(i, limb)| *limb as f64 * 2f64.powi(64 * i as i32))
        .sum()
}

/// Converts a wad-scaled amount to whole token units.
pub fn wad_to_units(value: U256) -> f64 {
    u256_to_f64(value) / WAD
}

/// Converts a ray-scaled rate to a percentage.
pub fn ray_to_percent(value: U256) -> f64 {
    u256_to_f64(value) / RAY * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_values_are_exact() {
        assert_eq!(u256_to_f64(U256::from(0u64)), 0.0);
        assert_eq!(u256_to_f64(U256::from(1_000_000u64)), 1_000_000.0);
    }

    #[test]
    fn high_limbs_contribute() {
        // 2^64 occupies the second limb exactly.
        let v = U256::from(2u8).pow(U256::from(64u8));
        assert_eq!(u256_to_f64(v), 2f64.powi(64));
    }

    #[test]
    fn wad_conversion() {
        // 1.5 tokens in wad units.
        let v = U256::from(1_500_000_000_000_000_000u64);
        assert!((wad_to_units(v) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn ray_conversion_to_percent() {
        // 0.05 in ray is a 5% rate.
        let v = U256::from(10u8).pow(U256::from(27u8)) / U256::from(20u8);
        assert!((ray_to_percent(v) - 5.0).abs() < 1e-6);
    }
}
