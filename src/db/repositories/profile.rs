use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, sea_query::Expr};

use crate::entities::{prelude::Profiles, profiles};
use crate::models::{Profile, normalize_email};

pub struct ProfileRepository {
    conn: DatabaseConnection,
}

impl ProfileRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_by_user_id(&self, user_id: &str) -> Result<Option<Profile>> {
        let row = Profiles::find()
            .filter(profiles::Column::UserId.eq(user_id))
            .one(&self.conn)
            .await
            .context("Failed to query profile by user id")?;

        Ok(row.map(Profile::from))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<Profile>> {
        let row = Profiles::find()
            .filter(profiles::Column::Email.eq(normalize_email(email)))
            .one(&self.conn)
            .await
            .context("Failed to query profile by email")?;

        Ok(row.map(Profile::from))
    }

    /// Profile for `email` that has not been linked to an identity yet.
    pub async fn get_unlinked_by_email(&self, email: &str) -> Result<Option<Profile>> {
        let row = Profiles::find()
            .filter(profiles::Column::Email.eq(normalize_email(email)))
            .filter(profiles::Column::UserId.is_null())
            .one(&self.conn)
            .await
            .context("Failed to query unlinked profile")?;

        Ok(row.map(Profile::from))
    }

    /// Record a completed checkout: open-ended access for `email`.
    ///
    /// Replays converge on the same row. `disabled` keeps its stored value and
    /// the customer id is only overwritten when one is supplied.
    pub async fn upsert_paid(&self, email: &str, customer_id: Option<&str>) -> Result<Profile> {
        let email = normalize_email(email);
        let now = Utc::now();

        let active_model = profiles::ActiveModel {
            email: Set(email.clone()),
            expires_at: Set(None),
            disabled: Set(false),
            stripe_customer_id: Set(customer_id.map(str::to_string)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let mut on_conflict = sea_orm::sea_query::OnConflict::column(profiles::Column::Email);
        on_conflict.update_columns([profiles::Column::ExpiresAt, profiles::Column::UpdatedAt]);
        if customer_id.is_some() {
            on_conflict.update_column(profiles::Column::StripeCustomerId);
        }

        Profiles::insert(active_model)
            .on_conflict(on_conflict.to_owned())
            .exec_without_returning(&self.conn)
            .await
            .context("Failed to upsert profile")?;

        self.get_by_email(&email)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Profile for {email} missing after upsert"))
    }

    /// Set the expiry of every profile billed to `customer_id`. Returns the
    /// number of rows touched.
    pub async fn set_expiry_by_customer(
        &self,
        customer_id: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<u64> {
        let result = Profiles::update_many()
            .col_expr(profiles::Column::ExpiresAt, Expr::value(expires_at))
            .col_expr(profiles::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(profiles::Column::StripeCustomerId.eq(customer_id))
            .exec(&self.conn)
            .await
            .context("Failed to update profile expiry")?;

        Ok(result.rows_affected)
    }

    /// Attach an identity to a profile that has none yet. Returns false when
    /// the profile was already linked.
    pub async fn link_user(&self, profile_id: i32, user_id: &str) -> Result<bool> {
        let result = Profiles::update_many()
            .col_expr(profiles::Column::UserId, Expr::value(user_id))
            .col_expr(profiles::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(profiles::Column::Id.eq(profile_id))
            .filter(profiles::Column::UserId.is_null())
            .exec(&self.conn)
            .await
            .context("Failed to link profile to user")?;

        Ok(result.rows_affected == 1)
    }

    pub async fn set_disabled(&self, email: &str, disabled: bool) -> Result<bool> {
        let result = Profiles::update_many()
            .col_expr(profiles::Column::Disabled, Expr::value(disabled))
            .col_expr(profiles::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(profiles::Column::Email.eq(normalize_email(email)))
            .exec(&self.conn)
            .await
            .context("Failed to update profile disabled flag")?;

        Ok(result.rows_affected > 0)
    }
}
