use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::error::{CouponError, Result};
use crate::models::{Coupon, Distribution};
use crate::storage::Storage;

const SELECT_COUPON: &str = "SELECT id, code, is_used, created_at FROM coupons";
const SELECT_JOINED: &str = "SELECT d.id, d.mobile_number, d.coupon_id, d.distributed_at, \
     c.id AS c_id, c.code AS c_code, c.is_used AS c_is_used, c.created_at AS c_created_at \
     FROM coupon_distributions d JOIN coupons c ON c.id = d.coupon_id";

/// Postgres backend. Concurrency guarantees come from the storage layer:
/// `FOR UPDATE SKIP LOCKED` for coupon claims and the unique constraint on
/// `mobile_number` for the ledger.
pub struct PgStorage {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct JoinedRow {
    id: i32,
    mobile_number: String,
    coupon_id: i32,
    distributed_at: DateTime<Utc>,
    c_id: i32,
    c_code: String,
    c_is_used: bool,
    c_created_at: DateTime<Utc>,
}

impl JoinedRow {
    fn split(self) -> (Distribution, Coupon) {
        (
            Distribution {
                id: self.id,
                mobile_number: self.mobile_number,
                coupon_id: self.coupon_id,
                distributed_at: self.distributed_at,
            },
            Coupon {
                id: self.c_id,
                code: self.c_code,
                is_used: self.c_is_used,
                created_at: self.c_created_at,
            },
        )
    }
}

impl PgStorage {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
        Ok(Self { pool })
    }

    /// Creates the tables if they do not exist yet.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS coupons (
                id SERIAL PRIMARY KEY,
                code TEXT NOT NULL UNIQUE,
                is_used BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS coupon_distributions (
                id SERIAL PRIMARY KEY,
                mobile_number TEXT NOT NULL UNIQUE,
                coupon_id INTEGER NOT NULL REFERENCES coupons(id),
                distributed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn list_coupons(&self) -> Result<Vec<Coupon>> {
        let coupons = sqlx::query_as::<_, Coupon>(&format!("{SELECT_COUPON} ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        Ok(coupons)
    }

    async fn list_unused_coupons(&self) -> Result<Vec<Coupon>> {
        let coupons =
            sqlx::query_as::<_, Coupon>(&format!("{SELECT_COUPON} WHERE is_used = FALSE ORDER BY id"))
                .fetch_all(&self.pool)
                .await?;
        Ok(coupons)
    }

    async fn create_coupon(&self, code: &str) -> Result<Coupon> {
        let result = sqlx::query_as::<_, Coupon>(
            "INSERT INTO coupons (code) VALUES ($1) RETURNING id, code, is_used, created_at",
        )
        .bind(code)
        .fetch_one(&self.pool)
        .await;
        match result {
            Ok(coupon) => Ok(coupon),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(CouponError::DuplicateCode(code.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn mark_coupon_used(&self, id: i32) -> Result<Coupon> {
        sqlx::query_as::<_, Coupon>(
            "UPDATE coupons SET is_used = TRUE WHERE id = $1 \
             RETURNING id, code, is_used, created_at",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(CouponError::CouponNotFound(id))
    }

    async fn release_coupon(&self, id: i32) -> Result<()> {
        let result = sqlx::query("UPDATE coupons SET is_used = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CouponError::CouponNotFound(id));
        }
        Ok(())
    }

    async fn claim_next_unused(&self) -> Result<Option<Coupon>> {
        // SKIP LOCKED keeps concurrent claimers from ever selecting the same row
        let coupon = sqlx::query_as::<_, Coupon>(
            "UPDATE coupons SET is_used = TRUE \
             WHERE id = (SELECT id FROM coupons WHERE is_used = FALSE \
                         ORDER BY id LIMIT 1 FOR UPDATE SKIP LOCKED) \
             RETURNING id, code, is_used, created_at",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(coupon)
    }

    async fn find_distribution(&self, mobile_number: &str) -> Result<Option<Distribution>> {
        let distribution = sqlx::query_as::<_, Distribution>(
            "SELECT id, mobile_number, coupon_id, distributed_at \
             FROM coupon_distributions WHERE mobile_number = $1",
        )
        .bind(mobile_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(distribution)
    }

    async fn find_distribution_with_coupon(
        &self,
        mobile_number: &str,
    ) -> Result<Option<(Distribution, Coupon)>> {
        let row = sqlx::query_as::<_, JoinedRow>(&format!("{SELECT_JOINED} WHERE d.mobile_number = $1"))
            .bind(mobile_number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(JoinedRow::split))
    }

    async fn create_distribution(
        &self,
        mobile_number: &str,
        coupon_id: i32,
    ) -> Result<Distribution> {
        let result = sqlx::query_as::<_, Distribution>(
            "INSERT INTO coupon_distributions (mobile_number, coupon_id) VALUES ($1, $2) \
             RETURNING id, mobile_number, coupon_id, distributed_at",
        )
        .bind(mobile_number)
        .bind(coupon_id)
        .fetch_one(&self.pool)
        .await;
        match result {
            Ok(distribution) => Ok(distribution),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(CouponError::DuplicateMobile(mobile_number.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn list_distributions(&self) -> Result<Vec<Distribution>> {
        let distributions = sqlx::query_as::<_, Distribution>(
            "SELECT id, mobile_number, coupon_id, distributed_at \
             FROM coupon_distributions ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(distributions)
    }

    async fn list_distributions_with_coupons(&self) -> Result<Vec<(Distribution, Coupon)>> {
        let rows = sqlx::query_as::<_, JoinedRow>(&format!("{SELECT_JOINED} ORDER BY d.id"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(JoinedRow::split).collect())
    }

    async fn replace_pool(&self, codes: &[String]) -> Result<Vec<Coupon>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("TRUNCATE coupon_distributions, coupons RESTART IDENTITY")
            .execute(&mut *tx)
            .await?;
        let mut added = Vec::with_capacity(codes.len());
        for code in codes {
            let coupon = sqlx::query_as::<_, Coupon>(
                "INSERT INTO coupons (code) VALUES ($1) RETURNING id, code, is_used, created_at",
            )
            .bind(code)
            .fetch_one(&mut *tx)
            .await?;
            added.push(coupon);
        }
        tx.commit().await?;
        Ok(added)
    }
}
