use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{CouponError, Result};
use crate::models::{Coupon, Distribution};
use crate::storage::Storage;

/// In-memory backend. A single mutex serializes every operation, so each
/// trait method is a critical section; `claim_next_unused` and the duplicate
/// check in `create_distribution` cannot interleave with other writers.
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

struct Inner {
    coupons: BTreeMap<i32, Coupon>,
    distributions: Vec<Distribution>,
    next_coupon_id: i32,
    next_distribution_id: i32,
}

impl Inner {
    fn new() -> Self {
        Self {
            coupons: BTreeMap::new(),
            distributions: Vec::new(),
            next_coupon_id: 1,
            next_distribution_id: 1,
        }
    }

    fn insert_coupon(&mut self, code: &str) -> Result<Coupon> {
        if self.coupons.values().any(|c| c.code == code) {
            return Err(CouponError::DuplicateCode(code.to_string()));
        }
        let coupon = Coupon {
            id: self.next_coupon_id,
            code: code.to_string(),
            is_used: false,
            created_at: Utc::now(),
        };
        self.next_coupon_id += 1;
        self.coupons.insert(coupon.id, coupon.clone());
        Ok(coupon)
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| CouponError::Storage("storage mutex poisoned".to_string()))
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn list_coupons(&self) -> Result<Vec<Coupon>> {
        Ok(self.lock()?.coupons.values().cloned().collect())
    }

    async fn list_unused_coupons(&self) -> Result<Vec<Coupon>> {
        Ok(self
            .lock()?
            .coupons
            .values()
            .filter(|c| !c.is_used)
            .cloned()
            .collect())
    }

    async fn create_coupon(&self, code: &str) -> Result<Coupon> {
        self.lock()?.insert_coupon(code)
    }

    async fn mark_coupon_used(&self, id: i32) -> Result<Coupon> {
        let mut inner = self.lock()?;
        let coupon = inner
            .coupons
            .get_mut(&id)
            .ok_or(CouponError::CouponNotFound(id))?;
        coupon.is_used = true;
        Ok(coupon.clone())
    }

    async fn release_coupon(&self, id: i32) -> Result<()> {
        let mut inner = self.lock()?;
        let coupon = inner
            .coupons
            .get_mut(&id)
            .ok_or(CouponError::CouponNotFound(id))?;
        coupon.is_used = false;
        Ok(())
    }

    async fn claim_next_unused(&self) -> Result<Option<Coupon>> {
        let mut inner = self.lock()?;
        // BTreeMap iterates in id order, so this is the oldest unused coupon
        for coupon in inner.coupons.values_mut() {
            if !coupon.is_used {
                coupon.is_used = true;
                return Ok(Some(coupon.clone()));
            }
        }
        Ok(None)
    }

    async fn find_distribution(&self, mobile_number: &str) -> Result<Option<Distribution>> {
        Ok(self
            .lock()?
            .distributions
            .iter()
            .find(|d| d.mobile_number == mobile_number)
            .cloned())
    }

    async fn find_distribution_with_coupon(
        &self,
        mobile_number: &str,
    ) -> Result<Option<(Distribution, Coupon)>> {
        let inner = self.lock()?;
        let Some(distribution) = inner
            .distributions
            .iter()
            .find(|d| d.mobile_number == mobile_number)
        else {
            return Ok(None);
        };
        Ok(inner
            .coupons
            .get(&distribution.coupon_id)
            .map(|coupon| (distribution.clone(), coupon.clone())))
    }

    async fn create_distribution(
        &self,
        mobile_number: &str,
        coupon_id: i32,
    ) -> Result<Distribution> {
        let mut inner = self.lock()?;
        if inner
            .distributions
            .iter()
            .any(|d| d.mobile_number == mobile_number)
        {
            return Err(CouponError::DuplicateMobile(mobile_number.to_string()));
        }
        let distribution = Distribution {
            id: inner.next_distribution_id,
            mobile_number: mobile_number.to_string(),
            coupon_id,
            distributed_at: Utc::now(),
        };
        inner.next_distribution_id += 1;
        inner.distributions.push(distribution.clone());
        Ok(distribution)
    }

    async fn list_distributions(&self) -> Result<Vec<Distribution>> {
        Ok(self.lock()?.distributions.clone())
    }

    async fn list_distributions_with_coupons(&self) -> Result<Vec<(Distribution, Coupon)>> {
        let inner = self.lock()?;
        Ok(inner
            .distributions
            .iter()
            .filter_map(|d| {
                inner
                    .coupons
                    .get(&d.coupon_id)
                    .map(|c| (d.clone(), c.clone()))
            })
            .collect())
    }

    async fn replace_pool(&self, codes: &[String]) -> Result<Vec<Coupon>> {
        let mut inner = self.lock()?;
        *inner = Inner::new();
        let mut added = Vec::with_capacity(codes.len());
        for code in codes {
            added.push(inner.insert_coupon(code)?);
        }
        Ok(added)
    }
}
