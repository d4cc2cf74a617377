//! Fee estimation for blob transactions
//!
//! Pricing is a fixed multiplier policy over the latest block: the priority
//! fee is a multiple of the base fee and the blob fee cap is a multiple of the
//! current blob base fee. There is no adaptive bidding.

use crate::chain::ChainSnapshot;
use crate::error::{BlobTxError, BlobTxResult};

use alloy_eips::eip4844::{BLOB_GASPRICE_UPDATE_FRACTION, BLOB_TX_MIN_BLOB_GASPRICE};
use alloy_primitives::U256;
use serde::Serialize;
use tracing::debug;

/// Minimum price of a unit of blob gas
pub const MIN_BLOB_GASPRICE: u128 = BLOB_TX_MIN_BLOB_GASPRICE;

/// Controls the maximum rate of change of the blob base fee (Cancun)
pub const BLOB_BASE_FEE_UPDATE_FRACTION_CANCUN: u128 = BLOB_GASPRICE_UPDATE_FRACTION;

/// Controls the maximum rate of change of the blob base fee (Prague)
pub const BLOB_BASE_FEE_UPDATE_FRACTION_PRAGUE: u128 = 5_007_716;

/// Approximates `factor * e ** (numerator / denominator)` using Taylor expansion.
///
/// Same series as `alloy_eips::eip4844::calc_blob_gasprice`, but with a
/// configurable denominator and computed in 256-bit arithmetic; saturates at
/// `u128::MAX` instead of overflowing.
pub fn fake_exponential(factor: u128, numerator: u128, denominator: u128) -> u128 {
    if denominator == 0 {
        return u128::MAX;
    }

    let numerator = U256::from(numerator);
    let denominator = U256::from(denominator);
    let ceiling = U256::from(u128::MAX) * denominator;

    let mut i = U256::from(1u8);
    let mut output = U256::ZERO;
    let mut accum = U256::from(factor) * denominator;

    while !accum.is_zero() {
        output = match output.checked_add(accum) {
            Some(sum) if sum <= ceiling => sum,
            _ => return u128::MAX,
        };

        accum = match accum.checked_mul(numerator) {
            Some(product) => product / (denominator * i),
            None => return u128::MAX,
        };
        i += U256::from(1u8);
    }

    u128::try_from(output / denominator).unwrap_or(u128::MAX)
}

/// Multipliers applied to chain state when pricing a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeePolicy {
    /// Priority fee as a multiple of the base fee
    pub tip_multiplier: u128,
    /// Blob fee cap as a multiple of the blob base fee
    pub blob_fee_multiplier: u128,
    /// Denominator of the blob base fee exponential
    pub blob_base_fee_update_fraction: u128,
}

impl FeePolicy {
    pub const DEFAULT_TIP_MULTIPLIER: u128 = 10;
    pub const DEFAULT_BLOB_FEE_MULTIPLIER: u128 = 2;
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            tip_multiplier: Self::DEFAULT_TIP_MULTIPLIER,
            blob_fee_multiplier: Self::DEFAULT_BLOB_FEE_MULTIPLIER,
            blob_base_fee_update_fraction: BLOB_BASE_FEE_UPDATE_FRACTION_CANCUN,
        }
    }
}

/// Computed pricing for a blob transaction, all values in wei
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeParameters {
    pub tip_per_gas: u128,
    pub max_fee_per_gas: u128,
    pub blob_fee_cap: u128,
}

/// Derives fee parameters from a chain snapshot
#[derive(Debug, Clone, Default)]
pub struct FeeEstimator {
    policy: FeePolicy,
}

impl FeeEstimator {
    /// Create a new fee estimator
    pub fn new(policy: FeePolicy) -> Self {
        Self { policy }
    }

    /// Blob base fee for the given excess blob gas
    pub fn base_blob_fee(&self, excess_blob_gas: u64) -> u128 {
        fake_exponential(
            MIN_BLOB_GASPRICE,
            excess_blob_gas as u128,
            self.policy.blob_base_fee_update_fraction,
        )
    }

    /// Price a blob transaction against the snapshot
    pub fn estimate(&self, snapshot: &ChainSnapshot) -> BlobTxResult<FeeParameters> {
        let base_fee = snapshot.base_fee_per_gas.ok_or_else(|| {
            BlobTxError::ChainStateUnavailable("latest block has no base fee".to_string())
        })?;
        let excess_blob_gas = snapshot.excess_blob_gas.ok_or_else(|| {
            BlobTxError::ChainStateUnavailable("latest block has no excess blob gas".to_string())
        })?;

        let base_blob_fee = self.base_blob_fee(excess_blob_gas);
        let blob_fee_cap = base_blob_fee
            .checked_mul(self.policy.blob_fee_multiplier)
            .ok_or_else(|| {
                BlobTxError::FeeOverflow(format!(
                    "blob base fee {} x {}",
                    base_blob_fee, self.policy.blob_fee_multiplier
                ))
            })?;

        let tip_per_gas = base_fee
            .checked_mul(self.policy.tip_multiplier)
            .ok_or_else(|| {
                BlobTxError::FeeOverflow(format!(
                    "base fee {} x {}",
                    base_fee, self.policy.tip_multiplier
                ))
            })?;
        let max_fee_per_gas = base_fee.checked_add(tip_per_gas).ok_or_else(|| {
            BlobTxError::FeeOverflow(format!("base fee {} + tip {}", base_fee, tip_per_gas))
        })?;

        debug!(
            "Chain {}: base fee {}, tip {}, max fee {}, blob base fee {}, blob fee cap {}",
            snapshot.chain_id, base_fee, tip_per_gas, max_fee_per_gas, base_blob_fee, blob_fee_cap
        );

        Ok(FeeParameters {
            tip_per_gas,
            max_fee_per_gas,
            blob_fee_cap,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(base_fee: Option<u128>, excess_blob_gas: Option<u64>) -> ChainSnapshot {
        ChainSnapshot {
            chain_id: 1,
            nonce: 5,
            base_fee_per_gas: base_fee,
            excess_blob_gas,
        }
    }

    #[test]
    fn test_fake_exponential_cancun_vectors() {
        let cases: [(u64, u128); 4] = [
            (0, 1),
            (2_314_057, 1),
            (2_314_058, 2),
            (10 * 1024 * 1024, 23),
        ];

        let estimator = FeeEstimator::default();
        for (excess, expected) in cases {
            assert_eq!(estimator.base_blob_fee(excess), expected, "excess {}", excess);
        }
    }

    #[test]
    fn test_cancun_fraction_matches_alloy() {
        let estimator = FeeEstimator::default();
        for excess in [0u64, 1, 131_072, 2_314_058, 10 * 1024 * 1024, 50_000_000] {
            assert_eq!(
                estimator.base_blob_fee(excess),
                alloy_eips::eip4844::calc_blob_gasprice(excess as u128),
                "excess {}",
                excess
            );
        }
    }

    #[test]
    fn test_fake_exponential_small_inputs() {
        assert_eq!(fake_exponential(1, 0, 1), 1);
        assert_eq!(fake_exponential(38_493, 0, 1_000), 38_493);
        assert_eq!(fake_exponential(0, 1_000, 1), 0);
        assert_eq!(fake_exponential(1, 1, 1), 2);
        assert_eq!(fake_exponential(1, 2, 1), 6);
        assert_eq!(fake_exponential(1, 4, 2), 6);
    }

    #[test]
    fn test_fake_exponential_saturates() {
        assert_eq!(fake_exponential(1, u64::MAX as u128, 3_338_477), u128::MAX);
        assert_eq!(fake_exponential(1, 1, 0), u128::MAX);
    }

    #[test]
    fn test_scenario_base_fee_ten() {
        let fees = FeeEstimator::default()
            .estimate(&snapshot(Some(10), Some(0)))
            .unwrap();

        assert_eq!(
            fees,
            FeeParameters {
                tip_per_gas: 100,
                max_fee_per_gas: 110,
                blob_fee_cap: 2 * MIN_BLOB_GASPRICE,
            }
        );
    }

    #[test]
    fn test_fee_invariants_hold() {
        let estimator = FeeEstimator::default();
        for base_fee in [0u128, 1, 7, 1_000_000_007, 250_000_000_000] {
            for excess in [0u64, 131_072, 2_314_058, 50_000_000] {
                let fees = estimator
                    .estimate(&snapshot(Some(base_fee), Some(excess)))
                    .unwrap();
                assert_eq!(fees.tip_per_gas, 10 * base_fee);
                assert_eq!(fees.max_fee_per_gas, base_fee + fees.tip_per_gas);
                assert_eq!(fees.blob_fee_cap, 2 * estimator.base_blob_fee(excess));
                assert!(fees.blob_fee_cap >= MIN_BLOB_GASPRICE);
            }
        }
    }

    #[test]
    fn test_blob_fee_cap_is_monotonic() {
        let estimator = FeeEstimator::default();
        let mut previous = 0;
        for excess in (0..40_000_000u64).step_by(393_216) {
            let fees = estimator
                .estimate(&snapshot(Some(1), Some(excess)))
                .unwrap();
            assert!(fees.blob_fee_cap >= previous, "excess {}", excess);
            previous = fees.blob_fee_cap;
        }
        assert!(previous > 2);
    }

    #[test]
    fn test_prague_fraction_prices_lower() {
        let cancun = FeeEstimator::default();
        let prague = FeeEstimator::new(FeePolicy {
            blob_base_fee_update_fraction: BLOB_BASE_FEE_UPDATE_FRACTION_PRAGUE,
            ..FeePolicy::default()
        });
        let excess = 30_000_000;
        assert!(prague.base_blob_fee(excess) < cancun.base_blob_fee(excess));
    }

    #[test]
    fn test_missing_fields_are_unavailable() {
        let estimator = FeeEstimator::default();

        let err = estimator.estimate(&snapshot(None, Some(0))).unwrap_err();
        assert!(matches!(err, BlobTxError::ChainStateUnavailable(_)));

        let err = estimator.estimate(&snapshot(Some(10), None)).unwrap_err();
        assert!(matches!(err, BlobTxError::ChainStateUnavailable(_)));
    }

    #[test]
    fn test_tip_overflow_is_reported() {
        let err = FeeEstimator::default()
            .estimate(&snapshot(Some(u128::MAX / 2), Some(0)))
            .unwrap_err();
        assert!(matches!(err, BlobTxError::FeeOverflow(_)));
    }
}
