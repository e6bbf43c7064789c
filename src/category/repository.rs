//! Category persistence.

use async_trait::async_trait;
use sqlx::PgPool;

use super::{Category, UpdateCategory};
use crate::error::{Result, ServerError};

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Categories ordered by `(sort_order, id)`.
    async fn list(&self, include_archived: bool) -> Result<Vec<Category>>;

    /// Duplicate names are a [`ServerError::Conflict`].
    async fn create(&self, name: &str, sort_order: i32) -> Result<Category>;

    /// `None` when the category does not exist.
    async fn update(&self, id: i64, update: &UpdateCategory) -> Result<Option<Category>>;

    /// Subset of `ids` that exist and are not archived.
    async fn usable(&self, ids: &[i64]) -> Result<Vec<i64>>;
}

fn duplicate_name(err: sqlx::Error) -> ServerError {
    match ServerError::from(err) {
        ServerError::Conflict(_) => {
            ServerError::Conflict("category name already exists".into())
        },
        err => err,
    }
}

/// PostgreSQL category repository.
#[derive(Clone)]
pub struct PgCategoryRepository {
    pool: PgPool,
}

impl PgCategoryRepository {
    /// Create a new [`PgCategoryRepository`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CategoryRepository for PgCategoryRepository {
    async fn list(&self, include_archived: bool) -> Result<Vec<Category>> {
        Ok(sqlx::query_as::<_, Category>(
            r#"SELECT id, name, is_archived, sort_order FROM categories
                WHERE $1 OR NOT is_archived
                ORDER BY sort_order, id"#,
        )
        .bind(include_archived)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create(&self, name: &str, sort_order: i32) -> Result<Category> {
        sqlx::query_as::<_, Category>(
            r#"INSERT INTO categories (name, sort_order) VALUES ($1, $2)
                RETURNING id, name, is_archived, sort_order"#,
        )
        .bind(name)
        .bind(sort_order)
        .fetch_one(&self.pool)
        .await
        .map_err(duplicate_name)
    }

    async fn update(&self, id: i64, update: &UpdateCategory) -> Result<Option<Category>> {
        sqlx::query_as::<_, Category>(
            r#"UPDATE categories SET
                    name = COALESCE($2, name),
                    is_archived = COALESCE($3, is_archived),
                    sort_order = COALESCE($4, sort_order)
                WHERE id = $1
                RETURNING id, name, is_archived, sort_order"#,
        )
        .bind(id)
        .bind(update.name.as_deref())
        .bind(update.is_archived)
        .bind(update.sort_order)
        .fetch_optional(&self.pool)
        .await
        .map_err(duplicate_name)
    }

    async fn usable(&self, ids: &[i64]) -> Result<Vec<i64>> {
        Ok(sqlx::query_scalar(
            r#"SELECT id FROM categories WHERE id = ANY($1) AND NOT is_archived"#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?)
    }
}
