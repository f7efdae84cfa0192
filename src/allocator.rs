use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{CouponError, Result};
use crate::mobile;
use crate::storage::Storage;

/// One `DuplicateMobile` conflict resolves on the next read, so this only
/// trips if the ledger keeps contradicting itself.
const MAX_ALLOCATION_ATTEMPTS: usize = 3;

/// Outcome of an allocation request, returned verbatim as the response `data`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub mobile_number: String,
    pub coupon_code: String,
    pub distributed_at: DateTime<Utc>,
    pub message: String,
}

/// Binds one unused coupon to one canonical mobile number.
///
/// Idempotent per canonical number: repeated calls return the original
/// coupon and timestamp. Depends only on the `Storage` interface; the
/// at-most-one guarantee comes from `claim_next_unused` plus the unique
/// mobile constraint, with a release-and-retry on lost races so no coupon
/// leaks out of the pool.
#[derive(Clone)]
pub struct AllocationEngine {
    storage: Arc<dyn Storage>,
}

impl AllocationEngine {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn allocate(&self, raw_mobile: &str) -> Result<Allocation> {
        // Smoke-test path: no input means a synthetic code and no state change
        if raw_mobile.trim().is_empty() {
            return Ok(Allocation {
                mobile_number: "N/A".to_string(),
                coupon_code: "Test Code".to_string(),
                distributed_at: Utc::now(),
                message: "Test coupon code provided (no mobile number required)".to_string(),
            });
        }

        let canonical = mobile::normalize(raw_mobile)?;

        for _ in 0..MAX_ALLOCATION_ATTEMPTS {
            if let Some((distribution, coupon)) = self
                .storage
                .find_distribution_with_coupon(&canonical)
                .await?
            {
                return Ok(Allocation {
                    mobile_number: canonical,
                    coupon_code: coupon.code,
                    distributed_at: distribution.distributed_at,
                    message: "Coupon already distributed to this mobile number".to_string(),
                });
            }

            let Some(coupon) = self.storage.claim_next_unused().await? else {
                // An empty pool here may just mean a same-number race drained
                // it first; if the ledger now has us, report that instead.
                if self
                    .storage
                    .find_distribution(&canonical)
                    .await?
                    .is_some()
                {
                    continue;
                }
                return Err(CouponError::PoolExhausted);
            };

            match self
                .storage
                .create_distribution(&canonical, coupon.id)
                .await
            {
                Ok(distribution) => {
                    tracing::info!(
                        mobile_number = %canonical,
                        coupon_code = %coupon.code,
                        "coupon allocated"
                    );
                    return Ok(Allocation {
                        mobile_number: canonical,
                        coupon_code: coupon.code,
                        distributed_at: distribution.distributed_at,
                        message: "Coupon successfully distributed".to_string(),
                    });
                }
                // A concurrent request for the same number won the race.
                // Return our claim and loop; the re-read finds the winner.
                Err(CouponError::DuplicateMobile(_)) => {
                    self.storage.release_coupon(coupon.id).await?;
                }
                Err(err) => {
                    let _ = self.storage.release_coupon(coupon.id).await;
                    return Err(err);
                }
            }
        }

        Err(CouponError::Storage(
            "allocation did not converge after repeated conflicts".to_string(),
        ))
    }
}
