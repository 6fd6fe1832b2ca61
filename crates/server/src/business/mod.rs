//! Business Profiles
//!
//! One profile per business owner. Stored in the same SQLite database as
//! auth (users.sqlite).

pub mod handlers;

use crate::core::dates::{parse_date, parse_stored};
use crate::core::{AppState, Error, Result};
use axum::{
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/business", post(handlers::create_business))
        .route("/business/my-business", get(handlers::my_business))
        .route("/business/{id}", put(handlers::update_business))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum BusinessType {
    Manufacturing,
    Trading,
    Service,
    Retail,
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Business {
    pub id: String,
    pub owner: String,
    pub business_name: String,
    pub gst_number: Option<String>,
    pub pan_number: Option<String>,
    pub business_type: BusinessType,
    pub address: Address,
    pub registration_date: Option<DateTime<Utc>>,
    pub website: Option<String>,
    pub employees: Option<i64>,
    pub annual_turnover: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile fields sent by the client.
///
/// Creation needs `businessName` and `businessType`; on update every field
/// is optional and `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessInput {
    pub business_name: Option<String>,
    pub gst_number: Option<String>,
    pub pan_number: Option<String>,
    pub business_type: Option<BusinessType>,
    pub address: Option<Address>,
    pub registration_date: Option<String>,
    pub website: Option<String>,
    pub employees: Option<i64>,
    pub annual_turnover: Option<f64>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Business {
    fn apply(&mut self, input: BusinessInput) -> Result<()> {
        if let Some(name) = input.business_name {
            let name = name.trim();
            if name.is_empty() {
                return Err(Error::Validation("Business name cannot be empty".to_string()));
            }
            self.business_name = name.to_string();
        }
        if let Some(business_type) = input.business_type {
            self.business_type = business_type;
        }
        if let Some(raw) = input.registration_date {
            self.registration_date = match raw.trim() {
                "" => None,
                value => Some(parse_date(value).ok_or_else(|| {
                    Error::Validation(format!("Invalid registration date: {}", value))
                })?),
            };
        }
        if let Some(employees) = input.employees {
            if employees < 0 {
                return Err(Error::Validation("Employees cannot be negative".to_string()));
            }
            self.employees = Some(employees);
        }
        if input.annual_turnover.is_some() {
            self.annual_turnover = input.annual_turnover;
        }
        if input.gst_number.is_some() {
            self.gst_number = non_blank(input.gst_number);
        }
        if input.pan_number.is_some() {
            self.pan_number = non_blank(input.pan_number);
        }
        if input.website.is_some() {
            self.website = non_blank(input.website);
        }
        if let Some(address) = input.address {
            self.address = address;
        }
        Ok(())
    }
}

type BusinessRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    BusinessType,
    String,
    Option<String>,
    Option<String>,
    Option<i64>,
    Option<f64>,
    String,
    String,
);

const BUSINESS_COLUMNS: &str = "id, owner, business_name, gst_number, pan_number, business_type, \
     address, registration_date, website, employees, annual_turnover, created_at, updated_at";

fn business_from_row(row: BusinessRow) -> Result<Business> {
    let (
        id,
        owner,
        business_name,
        gst_number,
        pan_number,
        business_type,
        address,
        registration_date,
        website,
        employees,
        annual_turnover,
        created_at,
        updated_at,
    ) = row;

    let address = serde_json::from_str(&address)
        .map_err(|e| Error::Internal(format!("corrupt address of business {}: {}", id, e)))?;

    Ok(Business {
        id,
        owner,
        business_name,
        gst_number,
        pan_number,
        business_type,
        address,
        registration_date: registration_date.as_deref().map(parse_stored),
        website,
        employees,
        annual_turnover,
        created_at: parse_stored(&created_at),
        updated_at: parse_stored(&updated_at),
    })
}

/// Business profile storage
pub struct BusinessStore {
    pool: SqlitePool,
}

impl BusinessStore {
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.init_db().await?;
        info!("[Business] Initialized");
        Ok(store)
    }

    async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS businesses (
                id TEXT PRIMARY KEY,
                owner TEXT UNIQUE NOT NULL,
                business_name TEXT NOT NULL,
                gst_number TEXT,
                pan_number TEXT,
                business_type TEXT NOT NULL,
                address TEXT NOT NULL,
                registration_date TEXT,
                website TEXT,
                employees INTEGER,
                annual_turnover REAL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save(&self, business: &Business) -> Result<()> {
        let address = serde_json::to_string(&business.address)
            .map_err(|e| Error::Internal(e.to_string()))?;

        sqlx::query(&format!(
            "INSERT OR REPLACE INTO businesses ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            BUSINESS_COLUMNS
        ))
        .bind(&business.id)
        .bind(&business.owner)
        .bind(&business.business_name)
        .bind(&business.gst_number)
        .bind(&business.pan_number)
        .bind(business.business_type)
        .bind(address)
        .bind(business.registration_date.map(|d| d.to_rfc3339()))
        .bind(&business.website)
        .bind(business.employees)
        .bind(business.annual_turnover)
        .bind(business.created_at.to_rfc3339())
        .bind(business.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Create the profile of `owner`; an owner has at most one
    pub async fn create(&self, owner: &str, input: BusinessInput) -> Result<Business> {
        let business_name = non_blank(input.business_name.clone())
            .ok_or_else(|| Error::Validation("Business name is required".to_string()))?;
        let business_type = input
            .business_type
            .ok_or_else(|| Error::Validation("Business type is required".to_string()))?;

        if self.find_by_owner(owner).await?.is_some() {
            return Err(Error::Validation("Business profile already exists".to_string()));
        }

        let now = Utc::now();
        let mut business = Business {
            id: Uuid::new_v4().to_string(),
            owner: owner.to_string(),
            business_name,
            gst_number: None,
            pan_number: None,
            business_type,
            address: Address::default(),
            registration_date: None,
            website: None,
            employees: None,
            annual_turnover: None,
            created_at: now,
            updated_at: now,
        };
        business.apply(input)?;

        self.save(&business).await?;
        info!("[Business] {} created {}", owner, business.business_name);

        Ok(business)
    }

    pub async fn find_by_owner(&self, owner: &str) -> Result<Option<Business>> {
        let row: Option<BusinessRow> = sqlx::query_as(&format!(
            "SELECT {} FROM businesses WHERE owner = ?",
            BUSINESS_COLUMNS
        ))
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        row.map(business_from_row).transpose()
    }

    /// Update profile `id`, which must belong to `owner`
    pub async fn update(&self, id: &str, owner: &str, input: BusinessInput) -> Result<Business> {
        let mut business = self
            .find_by_owner(owner)
            .await?
            .filter(|b| b.id == id)
            .ok_or_else(|| Error::NotFound("Business".to_string()))?;

        business.apply(input)?;
        business.updated_at = Utc::now();
        self.save(&business).await?;

        Ok(business)
    }
}
