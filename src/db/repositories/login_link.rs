use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    sea_query::Expr,
};

use super::user::generate_token;
use crate::entities::{login_links, prelude::LoginLinks};

pub struct LoginLinkRepository {
    conn: DatabaseConnection,
}

impl LoginLinkRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(&self, user_id: &str, ttl: Duration) -> Result<String> {
        let now = Utc::now();
        let token = generate_token();

        login_links::ActiveModel {
            token: Set(token.clone()),
            user_id: Set(user_id.to_string()),
            expires_at: Set(now + ttl),
            used_at: Set(None),
            created_at: Set(now),
        }
        .insert(&self.conn)
        .await
        .context("Failed to create login link")?;

        Ok(token)
    }

    /// Redeem a link, returning the user id it belongs to. A link is redeemed
    /// at most once and never after it expires.
    pub async fn redeem(&self, token: &str) -> Result<Option<String>> {
        let now = Utc::now();

        let Some(link) = LoginLinks::find_by_id(token.to_string())
            .one(&self.conn)
            .await
            .context("Failed to query login link")?
        else {
            return Ok(None);
        };

        if link.used_at.is_some() || link.expires_at <= now {
            return Ok(None);
        }

        let result = LoginLinks::update_many()
            .col_expr(login_links::Column::UsedAt, Expr::value(Some(now)))
            .filter(login_links::Column::Token.eq(token))
            .filter(login_links::Column::UsedAt.is_null())
            .exec(&self.conn)
            .await
            .context("Failed to consume login link")?;

        Ok((result.rows_affected == 1).then_some(link.user_id))
    }
}
