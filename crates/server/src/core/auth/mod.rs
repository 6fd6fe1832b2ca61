//! Authentication Module
//!
//! Handles registration, login and session management, and serves as the
//! user directory the chat core reads from.
//! All user data stored in SQLite at `<root>/local/users.sqlite`.

pub mod handlers;
pub mod middleware;

use async_trait::async_trait;
use bcrypt::{hash, verify};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("User already exists")]
    EmailTaken,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Invalid or expired session")]
    InvalidSession,
    #[error("User not found")]
    UserNotFound,
    #[error("{0}")]
    InvalidInput(String),
    #[error("Unknown role: {0}")]
    UnknownRole(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("corrupt user record: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;

/// What a user is on the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Business,
    Mentor,
    Lawyer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Business => "business",
            Role::Mentor => "mentor",
            Role::Lawyer => "lawyer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "business" => Ok(Role::Business),
            "mentor" => Ok(Role::Mentor),
            "lawyer" => Ok(Role::Lawyer),
            other => Err(AuthError::UnknownRole(other.to_string())),
        }
    }
}

/// Public user info (no password hash)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub phone: Option<String>,
    pub profile_image: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Registration input
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub phone: Option<String>,
}

/// Profile fields a user may change; `None` leaves the field untouched
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub profile_image: Option<String>,
}

/// Session token for authenticated requests
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Read access to registered users.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserInfo>>;

    /// All users, optionally restricted to one role
    async fn list_users(&self, role: Option<Role>) -> Result<Vec<UserInfo>>;
}

type UserRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
);

const USER_COLUMNS: &str = "id, name, email, role, phone, profile_image, created_at";

fn user_from_row(row: UserRow) -> Result<UserInfo> {
    let (id, name, email, role, phone, profile_image, created_at) = row;
    let role = role
        .parse::<Role>()
        .map_err(|_| AuthError::Corrupt(format!("unknown role {:?} for user {}", role, id)))?;

    Ok(UserInfo {
        id,
        name,
        email,
        role,
        phone,
        profile_image,
        created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
    })
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Auth manager handles all authentication
pub struct AuthManager {
    pool: SqlitePool,
    hash_cost: u32,
    session_ttl: Duration,
    /// In-memory session cache
    sessions: RwLock<HashMap<String, Session>>,
}

impl AuthManager {
    pub async fn new(db_path: &Path, hash_cost: u32, session_ttl_days: i64) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        let manager = Self {
            pool,
            hash_cost,
            session_ttl: Duration::days(session_ttl_days),
            sessions: RwLock::new(HashMap::new()),
        };

        manager.init_db().await?;

        info!("[Auth] Initialized at {:?}", db_path);

        Ok(manager)
    }

    /// Connection pool of the users database, shared with the other
    /// SQLite backed stores
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                phone TEXT,
                profile_image TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Register a new user and open a session for them
    pub async fn register(&self, new_user: NewUser) -> Result<(UserInfo, Session)> {
        let name = new_user.name.trim().to_string();
        let email = normalize_email(&new_user.email);

        if name.is_empty() {
            return Err(AuthError::InvalidInput("Name is required".to_string()));
        }
        if !email.contains('@') {
            return Err(AuthError::InvalidInput("A valid email is required".to_string()));
        }
        if new_user.password.len() < 6 {
            return Err(AuthError::InvalidInput(
                "Password must be at least 6 characters".to_string(),
            ));
        }

        let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?;

        if existing.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = hash(&new_user.password, self.hash_cost)?;

        let user = UserInfo {
            id: Uuid::new_v4().to_string(),
            name,
            email,
            role: new_user.role,
            phone: new_user.phone.filter(|p| !p.trim().is_empty()),
            profile_image: None,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO users (id, name, email, password_hash, role, phone, profile_image, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&password_hash)
        .bind(user.role.as_str())
        .bind(&user.phone)
        .bind(&user.profile_image)
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let session = self.create_session(&user.id).await?;

        info!("[Auth] User registered: {} ({}, {})", user.name, user.email, user.role);

        Ok((user, session))
    }

    /// Verify credentials and open a session
    pub async fn login(&self, email: &str, password: &str) -> Result<(UserInfo, Session)> {
        let email = normalize_email(email);

        let row: Option<(String, String)> =
            sqlx::query_as("SELECT id, password_hash FROM users WHERE email = ?")
                .bind(&email)
                .fetch_optional(&self.pool)
                .await?;

        let (user_id, password_hash) = row.ok_or(AuthError::InvalidCredentials)?;

        if !verify(password, &password_hash)? {
            warn!("[Auth] Failed login attempt for {}", email);
            return Err(AuthError::InvalidCredentials);
        }

        let user = self.get_user(&user_id).await?;
        let session = self.create_session(&user.id).await?;

        info!("[Auth] User logged in: {}", user.name);

        Ok((user, session))
    }

    async fn create_session(&self, user_id: &str) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            token: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            created_at: now,
            expires_at: now + self.session_ttl,
        };

        sqlx::query(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&session.token)
        .bind(&session.user_id)
        .bind(session.created_at.to_rfc3339())
        .bind(session.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.sessions
            .write()
            .await
            .insert(session.token.clone(), session.clone());

        Ok(session)
    }

    /// Resolve a session token to the user it belongs to
    pub async fn validate_session(&self, token: &str) -> Result<UserInfo> {
        let cached = self.sessions.read().await.get(token).cloned();

        let session = match cached {
            Some(session) => session,
            None => {
                let row: Option<(String, String, String)> = sqlx::query_as(
                    "SELECT user_id, created_at, expires_at FROM sessions WHERE token = ?",
                )
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;

                let (user_id, created_at, expires_at) = row.ok_or(AuthError::InvalidSession)?;
                let session = Session {
                    token: token.to_string(),
                    user_id,
                    created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
                    expires_at: expires_at
                        .parse()
                        .map_err(|_| AuthError::Corrupt("session expiry".to_string()))?,
                };
                self.sessions
                    .write()
                    .await
                    .insert(token.to_string(), session.clone());
                session
            }
        };

        if session.expires_at <= Utc::now() {
            self.sessions.write().await.remove(token);
            return Err(AuthError::InvalidSession);
        }

        match self.get_user(&session.user_id).await {
            Ok(user) => Ok(user),
            Err(AuthError::UserNotFound) => Err(AuthError::InvalidSession),
            Err(e) => Err(e),
        }
    }

    /// Invalidate a session
    pub async fn logout(&self, token: &str) -> Result<()> {
        self.sessions.write().await.remove(token);

        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;

        info!("[Auth] Session invalidated");

        Ok(())
    }

    pub async fn get_user(&self, user_id: &str) -> Result<UserInfo> {
        self.find_user(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    pub async fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> Result<UserInfo> {
        if let Some(name) = update.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(AuthError::InvalidInput("Name cannot be empty".to_string()));
            }
            sqlx::query("UPDATE users SET name = ? WHERE id = ?")
                .bind(name)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        }

        if let Some(phone) = update.phone {
            sqlx::query("UPDATE users SET phone = ? WHERE id = ?")
                .bind(Some(phone).filter(|p| !p.trim().is_empty()))
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        }

        if let Some(image) = update.profile_image {
            sqlx::query("UPDATE users SET profile_image = ? WHERE id = ?")
                .bind(Some(image).filter(|i| !i.trim().is_empty()))
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        }

        self.get_user(user_id).await
    }
}

#[async_trait]
impl UserDirectory for AuthManager {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserInfo>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(user_from_row).transpose()
    }

    async fn list_users(&self, role: Option<Role>) -> Result<Vec<UserInfo>> {
        let rows: Vec<UserRow> = match role {
            Some(role) => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM users WHERE role = ? ORDER BY created_at",
                    USER_COLUMNS
                ))
                .bind(role.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM users ORDER BY created_at",
                    USER_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(user_from_row).collect()
    }
}
