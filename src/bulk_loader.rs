use std::collections::HashSet;

use csv::StringRecord;
use serde::Serialize;

use crate::error::Result;
use crate::storage::Storage;

/// Aggregate outcome of a pool reload. Row errors are accumulated, never
/// raised; one bad row never aborts the upload.
#[derive(Debug, Serialize)]
pub struct ReloadReport {
    pub total_processed: usize,
    pub successfully_added: usize,
    pub errors: Vec<String>,
}

/// Replaces the entire coupon pool from parsed CSV records.
///
/// The first column of each record is the candidate code. Rows failing
/// validation (empty, bad charset, duplicate within the batch) are recorded
/// as 1-based row errors. All valid codes are applied with a single atomic
/// `replace_pool`, which also wipes every prior distribution.
pub async fn reload(storage: &dyn Storage, records: &[StringRecord]) -> Result<ReloadReport> {
    let mut errors = Vec::new();
    let mut codes: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for (index, record) in records.iter().enumerate() {
        let row = index + 1;
        let Some(raw) = record.get(0) else {
            errors.push(format!("Row {row}: Invalid coupon code"));
            continue;
        };
        let code = raw.trim();
        if code.is_empty() {
            errors.push(format!("Row {row}: Empty coupon code"));
            continue;
        }
        if !is_valid_code(code) {
            errors.push(format!("Row {row}: Invalid characters in coupon code \"{code}\""));
            continue;
        }
        if !seen.insert(code.to_string()) {
            errors.push(format!("Row {row}: Failed to add coupon \"{code}\""));
            continue;
        }
        codes.push(code.to_string());
    }

    let added = storage.replace_pool(&codes).await?;
    tracing::info!(
        total = records.len(),
        added = added.len(),
        errors = errors.len(),
        "coupon pool replaced"
    );

    Ok(ReloadReport {
        total_processed: records.len(),
        successfully_added: added.len(),
        errors,
    })
}

fn is_valid_code(code: &str) -> bool {
    code.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn records(rows: &[&str]) -> Vec<StringRecord> {
        rows.iter().map(|row| StringRecord::from(vec![*row])).collect()
    }

    #[tokio::test]
    async fn test_mixed_rows_are_reported_individually() {
        let storage = MemoryStorage::new();
        let report = reload(&storage, &records(&["SAVE10", "", "bad code!", "SAVE10"]))
            .await
            .unwrap();

        assert_eq!(report.total_processed, 4);
        assert_eq!(report.successfully_added, 1);
        assert_eq!(report.errors.len(), 3);
        assert!(report.errors[0].starts_with("Row 2:"));
        assert!(report.errors[1].contains("Invalid characters"));
        assert!(report.errors[2].contains("SAVE10"));
    }

    #[tokio::test]
    async fn test_reload_invalidates_prior_allocations() {
        let storage = MemoryStorage::new();
        let coupon = storage.create_coupon("OLD").await.unwrap();
        storage
            .create_distribution("919996275888", coupon.id)
            .await
            .unwrap();

        let report = reload(&storage, &records(&["NEW1", "NEW2"])).await.unwrap();

        assert_eq!(report.successfully_added, 2);
        assert!(storage.list_distributions().await.unwrap().is_empty());
        let unused = storage.list_unused_coupons().await.unwrap();
        assert_eq!(unused.len(), 2);
        assert_eq!(unused[0].id, 1);
    }

    #[tokio::test]
    async fn test_multi_column_rows_use_first_column() {
        let storage = MemoryStorage::new();
        let record = StringRecord::from(vec!["SAVE10", "10% off", "2024"]);
        let report = reload(&storage, &[record]).await.unwrap();

        assert_eq!(report.successfully_added, 1);
        assert_eq!(storage.list_coupons().await.unwrap()[0].code, "SAVE10");
    }

    #[tokio::test]
    async fn test_whitespace_is_trimmed() {
        let storage = MemoryStorage::new();
        let report = reload(&storage, &records(&["  SAVE10  "])).await.unwrap();
        assert_eq!(report.successfully_added, 1);
        assert_eq!(storage.list_coupons().await.unwrap()[0].code, "SAVE10");
    }

    #[tokio::test]
    async fn test_underscore_and_hyphen_are_allowed() {
        let storage = MemoryStorage::new();
        let report = reload(&storage, &records(&["SAVE_10", "DEAL-2024"]))
            .await
            .unwrap();
        assert_eq!(report.successfully_added, 2);
        assert!(report.errors.is_empty());
    }
}
