use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Multipart, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::allocator::AllocationEngine;
use crate::bulk_loader;
use crate::config::Config;
use crate::error::{CouponError, Result};
use crate::rate_limit::RateLimiter;
use crate::response::ApiResponse;
use crate::storage::Storage;

/// Shared application state
pub type SharedState = Arc<AppState>;

/// Application state: the storage handle plus the collaborators built on it
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub allocator: AllocationEngine,
    pub rate_limiter: RateLimiter,
    pub config: Config,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>, config: Config) -> Self {
        let allocator = AllocationEngine::new(storage.clone());
        let rate_limiter = RateLimiter::new(
            config.rate_limit_max_requests,
            Duration::from_secs(config.rate_limit_window_secs),
        );
        Self {
            storage,
            allocator,
            rate_limiter,
            config,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CouponQuery {
    #[serde(rename = "mobileNumber")]
    pub mobile_number: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsData {
    pub total_coupons: usize,
    pub distributed_coupons: usize,
    pub available_coupons: usize,
    pub distribution_rate: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionView {
    pub id: i32,
    pub mobile_number: String,
    pub coupon_code: String,
    pub distributed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadData {
    pub total_processed: usize,
    pub successfully_added: usize,
    pub errors: usize,
    pub error_details: Vec<String>,
}

/// Hand out a coupon for the given mobile number
pub async fn get_coupon(
    State(state): State<SharedState>,
    Query(query): Query<CouponQuery>,
) -> Result<impl IntoResponse> {
    let raw = query.mobile_number.unwrap_or_default();
    let allocation = state.allocator.allocate(&raw).await?;
    Ok(Json(ApiResponse::ok(allocation)))
}

/// Distribution statistics for the admin view
pub async fn admin_stats(State(state): State<SharedState>) -> Result<impl IntoResponse> {
    let total = state.storage.list_coupons().await?.len();
    let distributed = state.storage.list_distributions().await?.len();
    let available = state.storage.list_unused_coupons().await?.len();

    let distribution_rate = if total > 0 {
        format!("{:.1}%", distributed as f64 / total as f64 * 100.0)
    } else {
        "0%".to_string()
    };

    Ok(Json(ApiResponse::ok(StatsData {
        total_coupons: total,
        distributed_coupons: distributed,
        available_coupons: available,
        distribution_rate,
    })))
}

/// All distributions joined with their coupon codes
pub async fn admin_distributions(State(state): State<SharedState>) -> Result<impl IntoResponse> {
    let rows = state.storage.list_distributions_with_coupons().await?;
    let data: Vec<DistributionView> = rows
        .into_iter()
        .map(|(distribution, coupon)| DistributionView {
            id: distribution.id,
            mobile_number: distribution.mobile_number,
            coupon_code: coupon.code,
            distributed_at: distribution.distributed_at,
        })
        .collect();
    Ok(Json(ApiResponse::ok(data)))
}

/// The full coupon pool, used and unused
pub async fn admin_coupons(State(state): State<SharedState>) -> Result<impl IntoResponse> {
    let coupons = state.storage.list_coupons().await?;
    Ok(Json(ApiResponse::ok(coupons)))
}

/// Replace the entire pool from an uploaded CSV file (field `csvFile`)
pub async fn upload_coupons(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let mut csv_file: Option<(String, axum::body::Bytes)> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        CouponError::InvalidUpload {
            error: "Invalid CSV format",
            message: format!("Failed to read upload: {err}"),
        }
    })? {
        if field.name() == Some("csvFile") {
            let filename = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|err| CouponError::InvalidUpload {
                    error: "Invalid CSV format",
                    message: format!("Failed to read upload: {err}"),
                })?;
            if !is_csv(&filename, content_type.as_deref()) {
                return Err(CouponError::InvalidUpload {
                    error: "Invalid file type",
                    message: "Only CSV files are allowed".to_string(),
                });
            }
            csv_file = Some((filename, bytes));
            break;
        }
    }

    let Some((_, bytes)) = csv_file else {
        return Err(CouponError::InvalidUpload {
            error: "No file uploaded",
            message: "Please select a CSV file to upload".to_string(),
        });
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes.as_ref());
    let mut records = Vec::new();
    for record in reader.records() {
        records.push(record.map_err(|_| CouponError::InvalidUpload {
            error: "Invalid CSV format",
            message: "Failed to parse CSV file. Please ensure it's properly formatted.".to_string(),
        })?);
    }

    if records.is_empty() {
        return Err(CouponError::InvalidUpload {
            error: "Empty file",
            message: "The CSV file appears to be empty".to_string(),
        });
    }

    let report = bulk_loader::reload(state.storage.as_ref(), &records).await?;

    let message = if report.errors.is_empty() {
        format!("Successfully uploaded {} coupon codes", report.successfully_added)
    } else {
        format!(
            "Successfully uploaded {} coupon codes with {} errors",
            report.successfully_added,
            report.errors.len()
        )
    };

    Ok(Json(ApiResponse::ok_with_message(
        UploadData {
            total_processed: report.total_processed,
            successfully_added: report.successfully_added,
            errors: report.errors.len(),
            error_details: report.errors,
        },
        message,
    )))
}

fn is_csv(filename: &str, content_type: Option<&str>) -> bool {
    filename.to_ascii_lowercase().ends_with(".csv") || content_type == Some("text/csv")
}
