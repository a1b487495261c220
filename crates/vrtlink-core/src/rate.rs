//! Sample-rate lookup by rate index.
//!
//! The radio configures its DDC and DUC rates with a small integer index
//! rather than a frequency. Index `k` selects a decimation (or
//! interpolation) of `2^k` from the fixed converter clock, so the same
//! table serves RX metadata tagging (the DDC filter code in a status
//! header) and TX timestamp-increment computation.
//!
//! # Example
//!
//! ```
//! use vrtlink_core::RateTable;
//!
//! assert_eq!(RateTable::sample_rate(9), Some(200_000));
//! assert_eq!(RateTable::index_of(25_600_000), Some(2));
//! assert_eq!(RateTable::sample_rate(40), None);
//! ```

/// Converter clock rate in hertz. Also the number of fractional-timestamp
/// ticks per second on the transmit path.
pub const DAC_RATE: u64 = 102_400_000;

/// Sample rates indexed by rate index, highest first.
const RATES: [u32; 13] = [
    102_400_000,
    51_200_000,
    25_600_000,
    12_800_000,
    6_400_000,
    3_200_000,
    1_600_000,
    800_000,
    400_000,
    200_000,
    100_000,
    50_000,
    25_000,
];

/// Static rate-index table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateTable;

impl RateTable {
    /// Sample rate in samples per second for `index`, or `None` when the
    /// index is outside the table.
    pub fn sample_rate(index: u8) -> Option<u32> {
        RATES.get(index as usize).copied()
    }

    /// Rate index producing exactly `rate`, if any.
    pub fn index_of(rate: u32) -> Option<u8> {
        RATES.iter().position(|&r| r == rate).map(|i| i as u8)
    }

    /// Number of valid indices.
    pub const fn len() -> usize {
        RATES.len()
    }
}
