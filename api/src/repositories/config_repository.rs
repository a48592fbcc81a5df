use anyhow::Result;
use chrono::Utc;
use sea_orm::{prelude::*, ActiveValue::Set, QueryOrder, QuerySelect};
use shared::entity::configs;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct NewConfig {
    pub name: Option<String>,
    pub filename: String,
    pub description: Option<String>,
    pub data: Json,
}

/// Fields a config update may touch; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct ConfigChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub data: Option<Json>,
}

impl ConfigChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.data.is_none()
    }
}

pub struct ConfigRepository {
    db: Arc<DatabaseConnection>,
}

impl ConfigRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn list(&self) -> Result<Vec<configs::Model>> {
        let configs = configs::Entity::find()
            .order_by_desc(configs::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(configs)
    }

    pub async fn find_by_id(&self, id: i32) -> Result<Option<configs::Model>> {
        let config = configs::Entity::find_by_id(id).one(self.db.as_ref()).await?;
        Ok(config)
    }

    pub async fn find_by_filename(&self, filename: &str) -> Result<Option<configs::Model>> {
        let config = configs::Entity::find()
            .filter(configs::Column::Filename.eq(filename))
            .one(self.db.as_ref())
            .await?;
        Ok(config)
    }

    /// Whether another config already uses `name`.
    pub async fn name_taken(&self, name: &str, except_id: Option<i32>) -> Result<bool> {
        let mut query = configs::Entity::find().filter(configs::Column::Name.eq(name));
        if let Some(id) = except_id {
            query = query.filter(configs::Column::Id.ne(id));
        }
        Ok(query.count(self.db.as_ref()).await? > 0)
    }

    pub async fn registered_filenames(&self) -> Result<HashSet<String>> {
        let filenames = configs::Entity::find()
            .select_only()
            .column(configs::Column::Filename)
            .into_tuple::<String>()
            .all(self.db.as_ref())
            .await?;
        Ok(filenames.into_iter().collect())
    }

    pub async fn create(&self, new: NewConfig) -> Result<configs::Model> {
        let now = Utc::now();
        let config = configs::ActiveModel {
            name: Set(new.name),
            filename: Set(new.filename),
            description: Set(new.description),
            data: Set(new.data),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(config)
    }

    pub async fn update(&self, config: configs::Model, changes: ConfigChanges) -> Result<configs::Model> {
        let mut active: configs::ActiveModel = config.into();
        if let Some(name) = changes.name {
            active.name = Set(Some(name));
        }
        if let Some(description) = changes.description {
            active.description = Set(Some(description));
        }
        if let Some(data) = changes.data {
            active.data = Set(data);
        }
        active.updated_at = Set(Utc::now());
        let config = active.update(self.db.as_ref()).await?;
        Ok(config)
    }

    pub async fn delete(&self, id: i32) -> Result<()> {
        configs::Entity::delete_by_id(id).exec(self.db.as_ref()).await?;
        Ok(())
    }
}
