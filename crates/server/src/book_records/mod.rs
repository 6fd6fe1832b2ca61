//! Book Records
//!
//! Income and expense entries of a business. Every record belongs to the
//! business profile of its owner; there is no cross-business access.

pub mod handlers;

use crate::core::dates::{parse_date, parse_stored};
use crate::core::{AppState, Error, Result};
use axum::{
    routing::{get, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/book-records",
            get(handlers::list_records).post(handlers::create_record),
        )
        .route(
            "/book-records/{id}",
            put(handlers::update_record).delete(handlers::delete_record),
        )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum RecordType {
    Income,
    Expense,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Bank,
    Upi,
    Card,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRecord {
    pub id: String,
    /// Owning business profile
    pub business: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub category: String,
    pub amount: f64,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    pub invoice_number: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Record fields sent by the client; `None` keeps the stored value on update
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordInput {
    #[serde(rename = "type")]
    pub record_type: Option<RecordType>,
    pub category: Option<String>,
    pub amount: Option<f64>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub invoice_number: Option<String>,
    pub payment_method: Option<PaymentMethod>,
}

/// Query filters of the record listing; all bounds are inclusive
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFilter {
    #[serde(rename = "type")]
    pub record_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

fn bound(value: Option<&str>, name: &str) -> Result<Option<i64>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => parse_date(raw)
            .map(|d| Some(d.timestamp_millis()))
            .ok_or_else(|| Error::Validation(format!("Invalid {}: {}", name, raw))),
    }
}

impl BookRecord {
    fn apply(&mut self, input: RecordInput) -> Result<()> {
        if let Some(record_type) = input.record_type {
            self.record_type = record_type;
        }
        if let Some(category) = input.category {
            let category = category.trim();
            if category.is_empty() {
                return Err(Error::Validation("Category cannot be empty".to_string()));
            }
            self.category = category.to_string();
        }
        if let Some(amount) = input.amount {
            if !amount.is_finite() {
                return Err(Error::Validation("Amount must be a number".to_string()));
            }
            self.amount = amount;
        }
        if let Some(raw) = input.date {
            self.date = parse_date(&raw)
                .ok_or_else(|| Error::Validation(format!("Invalid date: {}", raw)))?;
        }
        if input.description.is_some() {
            self.description = input.description;
        }
        if input.invoice_number.is_some() {
            self.invoice_number = input.invoice_number;
        }
        if input.payment_method.is_some() {
            self.payment_method = input.payment_method;
        }
        Ok(())
    }
}

type RecordRow = (
    String,
    String,
    RecordType,
    String,
    f64,
    Option<String>,
    i64,
    Option<String>,
    Option<PaymentMethod>,
    String,
    String,
);

const RECORD_COLUMNS: &str = "id, business, record_type, category, amount, description, date_ms, \
     invoice_number, payment_method, created_at, updated_at";

fn record_from_row(row: RecordRow) -> BookRecord {
    let (
        id,
        business,
        record_type,
        category,
        amount,
        description,
        date_ms,
        invoice_number,
        payment_method,
        created_at,
        updated_at,
    ) = row;

    BookRecord {
        id,
        business,
        record_type,
        category,
        amount,
        description,
        date: DateTime::from_timestamp_millis(date_ms).unwrap_or_default(),
        invoice_number,
        payment_method,
        created_at: parse_stored(&created_at),
        updated_at: parse_stored(&updated_at),
    }
}

/// Book record storage
pub struct BookRecordStore {
    pool: SqlitePool,
}

impl BookRecordStore {
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.init_db().await?;
        info!("[BookRecords] Initialized");
        Ok(store)
    }

    async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS book_records (
                id TEXT PRIMARY KEY,
                business TEXT NOT NULL,
                record_type TEXT NOT NULL,
                category TEXT NOT NULL,
                amount REAL NOT NULL,
                description TEXT,
                date_ms INTEGER NOT NULL,
                invoice_number TEXT,
                payment_method TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_book_records_business ON book_records (business, date_ms)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save(&self, record: &BookRecord) -> Result<()> {
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO book_records ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            RECORD_COLUMNS
        ))
        .bind(&record.id)
        .bind(&record.business)
        .bind(record.record_type)
        .bind(&record.category)
        .bind(record.amount)
        .bind(&record.description)
        .bind(record.date.timestamp_millis())
        .bind(&record.invoice_number)
        .bind(record.payment_method)
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, business: &str, id: &str) -> Result<Option<BookRecord>> {
        let row: Option<RecordRow> = sqlx::query_as(&format!(
            "SELECT {} FROM book_records WHERE id = ? AND business = ?",
            RECORD_COLUMNS
        ))
        .bind(id)
        .bind(business)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(record_from_row))
    }

    /// Add a record to `business`. Type, category and amount are required;
    /// the date defaults to now.
    pub async fn create(&self, business: &str, input: RecordInput) -> Result<BookRecord> {
        let record_type = input
            .record_type
            .ok_or_else(|| Error::Validation("Record type is required".to_string()))?;
        if input.category.as_deref().map_or(true, |c| c.trim().is_empty()) {
            return Err(Error::Validation("Category is required".to_string()));
        }
        if input.amount.is_none() {
            return Err(Error::Validation("Amount is required".to_string()));
        }

        let now = Utc::now();
        let mut record = BookRecord {
            id: Uuid::new_v4().to_string(),
            business: business.to_string(),
            record_type,
            category: String::new(),
            amount: 0.0,
            description: None,
            date: now,
            invoice_number: None,
            payment_method: None,
            created_at: now,
            updated_at: now,
        };
        record.apply(input)?;

        self.save(&record).await?;
        debug!("[BookRecords] {} added {}", business, record.id);

        Ok(record)
    }

    /// Records of `business`, newest date first
    pub async fn list(&self, business: &str, filter: &RecordFilter) -> Result<Vec<BookRecord>> {
        let record_type = filter
            .record_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let start = bound(filter.start_date.as_deref(), "startDate")?;
        let end = bound(filter.end_date.as_deref(), "endDate")?;

        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "SELECT {} FROM book_records \
             WHERE business = ?1 \
               AND (?2 IS NULL OR record_type = ?2) \
               AND (?3 IS NULL OR date_ms >= ?3) \
               AND (?4 IS NULL OR date_ms <= ?4) \
             ORDER BY date_ms DESC, created_at DESC",
            RECORD_COLUMNS
        ))
        .bind(business)
        .bind(record_type)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(record_from_row).collect())
    }

    pub async fn update(&self, business: &str, id: &str, input: RecordInput) -> Result<BookRecord> {
        let mut record = self
            .find(business, id)
            .await?
            .ok_or_else(|| Error::NotFound("Record".to_string()))?;

        record.apply(input)?;
        record.updated_at = Utc::now();
        self.save(&record).await?;

        Ok(record)
    }

    pub async fn delete(&self, business: &str, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM book_records WHERE id = ? AND business = ?")
            .bind(id)
            .bind(business)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Record".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::AuthManager;
    use tempfile::TempDir;

    async fn store(dir: &TempDir) -> BookRecordStore {
        let auth = AuthManager::new(&dir.path().join("users.sqlite"), 4, 30)
            .await
            .unwrap();
        BookRecordStore::new(auth.pool()).await.unwrap()
    }

    fn entry(record_type: RecordType, amount: f64, date: &str) -> RecordInput {
        RecordInput {
            record_type: Some(record_type),
            category: Some("General".to_string()),
            amount: Some(amount),
            date: Some(date.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_list_filters_and_orders_by_date() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        store.create("biz", entry(RecordType::Income, 500.0, "2024-01-10")).await.unwrap();
        store.create("biz", entry(RecordType::Expense, 120.0, "2024-02-05")).await.unwrap();
        store.create("biz", entry(RecordType::Income, 900.0, "2024-03-01")).await.unwrap();
        store.create("other", entry(RecordType::Income, 1.0, "2024-02-01")).await.unwrap();

        let all = store.list("biz", &RecordFilter::default()).await.unwrap();
        let amounts: Vec<_> = all.iter().map(|r| r.amount).collect();
        assert_eq!(amounts, vec![900.0, 120.0, 500.0]);

        let income = RecordFilter {
            record_type: Some("income".to_string()),
            ..Default::default()
        };
        assert_eq!(store.list("biz", &income).await.unwrap().len(), 2);

        let february = RecordFilter {
            start_date: Some("2024-02-01".to_string()),
            end_date: Some("2024-02-29".to_string()),
            ..Default::default()
        };
        let in_february = store.list("biz", &february).await.unwrap();
        assert_eq!(in_february.len(), 1);
        assert_eq!(in_february[0].record_type, RecordType::Expense);

        let unknown = RecordFilter {
            record_type: Some("refund".to_string()),
            ..Default::default()
        };
        assert!(store.list("biz", &unknown).await.unwrap().is_empty());

        let bad_date = RecordFilter {
            start_date: Some("last tuesday".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            store.list("biz", &bad_date).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_create_requires_type_category_and_amount() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let mut no_category = entry(RecordType::Income, 10.0, "2024-01-01");
        no_category.category = Some(" ".to_string());
        assert!(matches!(
            store.create("biz", no_category).await,
            Err(Error::Validation(_))
        ));

        let mut no_amount = entry(RecordType::Income, 10.0, "2024-01-01");
        no_amount.amount = None;
        assert!(store.create("biz", no_amount).await.is_err());

        let mut no_type = entry(RecordType::Income, 10.0, "2024-01-01");
        no_type.record_type = None;
        assert!(store.create("biz", no_type).await.is_err());

        assert!(store.list("biz", &RecordFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_and_delete_are_business_scoped() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let record = store
            .create("biz", entry(RecordType::Expense, 75.5, "2024-05-01"))
            .await
            .unwrap();

        let updated = store
            .update(
                "biz",
                &record.id,
                RecordInput {
                    amount: Some(80.0),
                    payment_method: Some(PaymentMethod::Upi),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.amount, 80.0);
        assert_eq!(updated.payment_method, Some(PaymentMethod::Upi));
        assert_eq!(updated.category, "General");

        assert!(matches!(
            store.update("other", &record.id, RecordInput::default()).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            store.delete("other", &record.id).await,
            Err(Error::NotFound(_))
        ));

        store.delete("biz", &record.id).await.unwrap();
        assert!(matches!(
            store.delete("biz", &record.id).await,
            Err(Error::NotFound(_))
        ));
    }
}
