use anyhow::{Context, Result};
use sea_orm::{DatabaseConnection, EntityTrait, Set};

use crate::entities::{prelude::WebhookEvents, webhook_events};

pub struct WebhookEventRepository {
    conn: DatabaseConnection,
}

impl WebhookEventRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn is_processed(&self, event_id: &str) -> Result<bool> {
        let row = WebhookEvents::find_by_id(event_id.to_string())
            .one(&self.conn)
            .await
            .context("Failed to query webhook event")?;

        Ok(row.is_some())
    }

    pub async fn record(&self, event_id: &str, kind: &str) -> Result<()> {
        let active_model = webhook_events::ActiveModel {
            event_id: Set(event_id.to_string()),
            kind: Set(kind.to_string()),
            processed_at: Set(chrono::Utc::now()),
        };

        WebhookEvents::insert(active_model)
            .on_conflict(
                sea_orm::sea_query::OnConflict::column(webhook_events::Column::EventId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.conn)
            .await
            .context("Failed to record webhook event")?;

        Ok(())
    }
}
