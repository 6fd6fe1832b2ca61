//! GST Guides
//!
//! Public, read-only browsing of GST guidance articles. Guides are imported
//! from `guides.json` under the data root at startup. Opening a guide counts
//! a view.

use crate::core::auth::UserInfo;
use crate::core::dates::parse_stored;
use crate::core::{AppState, Error, Result};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::Path as FsPath;
use tracing::{debug, info};
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/guides", get(list_guides))
        .route("/guides/{id}", get(get_guide))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum GuideCategory {
    Registration,
    Filing,
    Compliance,
    Returns,
    General,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Guide {
    pub id: String,
    pub title: String,
    pub category: GuideCategory,
    pub content: String,
    #[serde(skip)]
    pub author_id: Option<String>,
    pub tags: Vec<String>,
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A guide as it appears in the seed file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGuide {
    pub title: String,
    pub category: GuideCategory,
    pub content: String,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorCard {
    pub id: String,
    pub name: String,
    pub profile_image: Option<String>,
}

impl From<UserInfo> for AuthorCard {
    fn from(user: UserInfo) -> Self {
        Self {
            id: user.id,
            name: user.name,
            profile_image: user.profile_image,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GuideView {
    #[serde(flatten)]
    pub guide: Guide,
    pub author: Option<AuthorCard>,
}

type GuideRow = (
    String,
    String,
    GuideCategory,
    String,
    Option<String>,
    String,
    i64,
    String,
    String,
);

const GUIDE_COLUMNS: &str =
    "id, title, category, content, author_id, tags, views, created_at, updated_at";

fn guide_from_row(row: GuideRow) -> Guide {
    let (id, title, category, content, author_id, tags, views, created_at, updated_at) = row;
    Guide {
        id,
        title,
        category,
        content,
        author_id,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        views,
        created_at: parse_stored(&created_at),
        updated_at: parse_stored(&updated_at),
    }
}

/// `%term%` with LIKE wildcards in `term` taken literally
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub struct GuideStore {
    pool: SqlitePool,
}

impl GuideStore {
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS guides (
                id TEXT PRIMARY KEY,
                title TEXT UNIQUE NOT NULL,
                category TEXT NOT NULL,
                content TEXT NOT NULL,
                author_id TEXT,
                tags TEXT NOT NULL,
                views INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&store.pool)
        .await?;

        info!("[Guides] Initialized");
        Ok(store)
    }

    pub async fn create(&self, new_guide: NewGuide) -> Result<Guide> {
        let title = new_guide.title.trim().to_string();
        if title.is_empty() || new_guide.content.trim().is_empty() {
            return Err(Error::Validation("Guide title and content are required".to_string()));
        }

        let now = Utc::now();
        let guide = Guide {
            id: Uuid::new_v4().to_string(),
            title,
            category: new_guide.category,
            content: new_guide.content,
            author_id: new_guide.author_id,
            tags: new_guide.tags,
            views: 0,
            created_at: now,
            updated_at: now,
        };
        let tags = serde_json::to_string(&guide.tags).map_err(|e| Error::Internal(e.to_string()))?;

        sqlx::query(&format!(
            "INSERT INTO guides ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            GUIDE_COLUMNS
        ))
        .bind(&guide.id)
        .bind(&guide.title)
        .bind(guide.category)
        .bind(&guide.content)
        .bind(&guide.author_id)
        .bind(tags)
        .bind(guide.views)
        .bind(guide.created_at.to_rfc3339())
        .bind(guide.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(guide)
    }

    /// Import the guides of a seed file, skipping titles already present.
    ///
    /// A missing file imports nothing.
    pub async fn import_seed(&self, path: &FsPath) -> Result<usize> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::Internal(format!("Failed to read {:?}: {}", path, e))),
        };
        let guides: Vec<NewGuide> = serde_json::from_str(&content)
            .map_err(|e| Error::Internal(format!("Failed to parse {:?}: {}", path, e)))?;

        let mut imported = 0;
        for guide in guides {
            let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM guides WHERE title = ?")
                .bind(guide.title.trim())
                .fetch_optional(&self.pool)
                .await?;
            if exists.is_some() {
                continue;
            }
            self.create(guide).await?;
            imported += 1;
        }

        Ok(imported)
    }

    /// Guides matching `category` and containing `search` in the title or
    /// content (case-insensitive), newest first
    pub async fn list(&self, category: Option<&str>, search: Option<&str>) -> Result<Vec<Guide>> {
        let category = category.map(str::trim).filter(|c| !c.is_empty());
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(like_pattern);

        let rows: Vec<GuideRow> = sqlx::query_as(&format!(
            r#"SELECT {} FROM guides
               WHERE (?1 IS NULL OR category = ?1)
                 AND (?2 IS NULL OR title LIKE ?2 ESCAPE '\' OR content LIKE ?2 ESCAPE '\')
               ORDER BY created_at DESC, rowid DESC"#,
            GUIDE_COLUMNS
        ))
        .bind(category)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(guide_from_row).collect())
    }

    /// Fetch a guide and count the view
    pub async fn open(&self, id: &str) -> Result<Guide> {
        let result = sqlx::query("UPDATE guides SET views = views + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Guide".to_string()));
        }

        let row: GuideRow = sqlx::query_as(&format!(
            "SELECT {} FROM guides WHERE id = ?",
            GUIDE_COLUMNS
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(guide_from_row(row))
    }
}

#[derive(Debug, Deserialize)]
pub struct GuidesQuery {
    pub category: Option<String>,
    pub search: Option<String>,
}

async fn author_of(
    state: &AppState,
    guide: &Guide,
    cache: &mut HashMap<String, Option<AuthorCard>>,
) -> Result<Option<AuthorCard>> {
    let Some(author_id) = guide.author_id.as_deref() else {
        return Ok(None);
    };
    if let Some(card) = cache.get(author_id) {
        return Ok(card.clone());
    }

    let card = state.users.find_user(author_id).await?.map(AuthorCard::from);
    cache.insert(author_id.to_string(), card.clone());
    Ok(card)
}

/// GET /api/guides?category=&search=
pub async fn list_guides(
    State(state): State<AppState>,
    Query(query): Query<GuidesQuery>,
) -> Result<Json<Vec<GuideView>>> {
    debug!("GET /api/guides - {:?}", query);

    let guides = state
        .guides
        .list(query.category.as_deref(), query.search.as_deref())
        .await?;

    let mut cache = HashMap::new();
    let mut views = Vec::with_capacity(guides.len());
    for guide in guides {
        let author = author_of(&state, &guide, &mut cache).await?;
        views.push(GuideView { guide, author });
    }

    Ok(Json(views))
}

/// GET /api/guides/{id}
pub async fn get_guide(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<GuideView>> {
    info!("GET /api/guides/{}", id);

    let guide = state.guides.open(&id).await?;
    let author = author_of(&state, &guide, &mut HashMap::new()).await?;
    Ok(Json(GuideView { guide, author }))
}
