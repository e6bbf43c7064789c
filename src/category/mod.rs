mod repository;

pub use repository::*;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{Result, ServerError};

/// Event category.
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub is_archived: bool,
    pub sort_order: i32,
}

/// Public view of a [`Category`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub id: i64,
    pub name: String,
}

impl From<Category> for CategorySummary {
    fn from(category: Category) -> Self {
        Self {
            id: category.id,
            name: category.name,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategory {
    #[validate(length(min = 1, max = 128, message = "Name must contain 1 to 128 characters."))]
    pub name: String,
    pub sort_order: Option<i32>,
}

/// Partial update, absent fields stay untouched.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCategory {
    #[validate(length(min = 1, max = 128, message = "Name must contain 1 to 128 characters."))]
    pub name: Option<String>,
    pub is_archived: Option<bool>,
    pub sort_order: Option<i32>,
}

/// Category catalog.
pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
}

impl CategoryService {
    /// Create a new [`CategoryService`].
    pub fn new(repo: Arc<dyn CategoryRepository>) -> Self {
        Self { repo }
    }

    /// Non-archived categories, by sort order.
    pub async fn list_public(&self) -> Result<Vec<CategorySummary>> {
        Ok(self
            .repo
            .list(false)
            .await?
            .into_iter()
            .map(CategorySummary::from)
            .collect())
    }

    /// Every category, archived ones included.
    pub async fn list_all(&self) -> Result<Vec<Category>> {
        self.repo.list(true).await
    }

    pub async fn create(&self, req: CreateCategory) -> Result<Category> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(ServerError::InvalidInput("name is required".into()));
        }

        let category = self.repo.create(name, req.sort_order.unwrap_or(0)).await?;
        tracing::info!(category_id = category.id, "category created");

        Ok(category)
    }

    pub async fn update(&self, id: i64, mut req: UpdateCategory) -> Result<Category> {
        if let Some(name) = req.name.as_mut() {
            *name = name.trim().to_owned();
            if name.is_empty() {
                return Err(ServerError::InvalidInput("name is required".into()));
            }
        }

        self.repo.update(id, &req).await?.ok_or(ServerError::NotFound)
    }
}
