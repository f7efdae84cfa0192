pub mod memory;
pub mod postgres;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Coupon, Distribution};

/// Backend for the coupon pool and the distribution ledger.
///
/// Implementations must guarantee:
/// - `claim_next_unused` atomically picks the lowest-id unused coupon and
///   marks it used; two concurrent callers never receive the same coupon.
/// - `create_distribution` enforces mobile-number uniqueness and reports
///   `DuplicateMobile` on conflict.
/// - `replace_pool` clears coupons and distributions and inserts the new
///   codes as one atomic step; no reader observes a half-cleared pool.
#[async_trait]
pub trait Storage: Send + Sync {
    /// All coupons in insertion (id) order.
    async fn list_coupons(&self) -> Result<Vec<Coupon>>;

    /// Unused coupons in insertion (id) order.
    async fn list_unused_coupons(&self) -> Result<Vec<Coupon>>;

    /// Adds a coupon with the next id; fails with `DuplicateCode` on an
    /// exact case-sensitive match.
    async fn create_coupon(&self, code: &str) -> Result<Coupon>;

    /// Flips `is_used` to true. Idempotent; `CouponNotFound` if absent.
    async fn mark_coupon_used(&self, id: i32) -> Result<Coupon>;

    /// Returns a claimed coupon to the pool after a lost allocation race.
    async fn release_coupon(&self, id: i32) -> Result<()>;

    /// Atomically claims the oldest unused coupon, or `None` when exhausted.
    async fn claim_next_unused(&self) -> Result<Option<Coupon>>;

    async fn find_distribution(&self, mobile_number: &str) -> Result<Option<Distribution>>;

    /// Join against the pool; a dangling coupon reference reads as absent.
    async fn find_distribution_with_coupon(
        &self,
        mobile_number: &str,
    ) -> Result<Option<(Distribution, Coupon)>>;

    /// Records an allocation; fails with `DuplicateMobile` if the number
    /// already holds a coupon.
    async fn create_distribution(&self, mobile_number: &str, coupon_id: i32)
        -> Result<Distribution>;

    async fn list_distributions(&self) -> Result<Vec<Distribution>>;

    /// All distributions joined with their coupons, dropping dangling entries.
    async fn list_distributions_with_coupons(&self) -> Result<Vec<(Distribution, Coupon)>>;

    /// Destructive full replacement: clears both stores, resets id counters
    /// to 1 and inserts `codes` in order, all in one critical section.
    async fn replace_pool(&self, codes: &[String]) -> Result<Vec<Coupon>>;
}

/// Codes loaded into an empty pool at startup.
pub const PRESET_CODES: [&str; 25] = [
    "SAVE10", "WELCOME20", "FIRST15", "SPECIAL25", "BONUS30",
    "DEAL40", "OFFER35", "DISCOUNT50", "PROMO12", "GIFT18",
    "LUCKY7", "MEGA60", "SUPER45", "ULTRA20", "PREMIUM25",
    "ELITE30", "GOLD40", "SILVER15", "BRONZE10", "DIAMOND50",
    "RUBY35", "EMERALD25", "SAPPHIRE20", "PEARL15", "CRYSTAL30",
];

/// Seeds the preset codes if the pool is empty; returns how many were added.
pub async fn seed_preset_codes(storage: &dyn Storage) -> Result<usize> {
    if !storage.list_coupons().await?.is_empty() {
        return Ok(0);
    }
    for code in PRESET_CODES {
        storage.create_coupon(code).await?;
    }
    Ok(PRESET_CODES.len())
}
