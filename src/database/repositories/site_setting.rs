//! Site setting repository

use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set};
use std::sync::Arc;

use crate::entities::{prelude::*, site_settings};

#[derive(Clone)]
pub struct SiteSettingRepository {
    connection: Arc<DatabaseConnection>,
}

impl SiteSettingRepository {
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }

    /// The persisted override for `key`, if an admin has set one.
    pub async fn get(&self, key: &str) -> Result<Option<String>, DbErr> {
        let model = SiteSettings::find()
            .filter(site_settings::Column::Key.eq(key))
            .one(&*self.connection)
            .await?;
        Ok(model.map(|m| m.value))
    }

    /// Insert or replace the override for `key`.
    pub async fn upsert(&self, key: &str, value: &str) -> Result<(), DbErr> {
        let active_model = site_settings::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            updated_at: Set(chrono::Utc::now()),
        };

        SiteSettings::insert(active_model)
            .on_conflict(
                OnConflict::column(site_settings::Column::Key)
                    .update_columns([
                        site_settings::Column::Value,
                        site_settings::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&*self.connection)
            .await?;
        Ok(())
    }
}
