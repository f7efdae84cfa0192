use chrono::{DateTime, Utc};
use serde::Serialize;

/// A single coupon code in the pool. `is_used` flips false -> true exactly
/// once, as part of creating the paired distribution.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: i32,
    pub code: String,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
}

/// The ledger record binding one canonical mobile number to one coupon.
/// Immutable after creation; only a bulk reload removes it.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub id: i32,
    pub mobile_number: String,
    pub coupon_id: i32,
    pub distributed_at: DateTime<Utc>,
}
