use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, SqlErr,
    sea_query::Expr,
};
use tracing::debug;

use super::user::generate_token;
use crate::entities::{prelude::SignupTokens, signup_tokens};
use crate::models::{SignupToken, normalize_email, signup_token::IssuedToken};

const ISSUE_ATTEMPTS: usize = 3;

pub struct SignupTokenRepository {
    conn: DatabaseConnection,
}

impl SignupTokenRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_by_token(&self, token: &str) -> Result<Option<SignupToken>> {
        let row = SignupTokens::find()
            .filter(signup_tokens::Column::Token.eq(token))
            .one(&self.conn)
            .await
            .context("Failed to query signup token")?;

        Ok(row.map(SignupToken::from))
    }

    /// The single unused row for `email`, live or expired.
    pub async fn get_unused_for_email(&self, email: &str) -> Result<Option<SignupToken>> {
        let row = SignupTokens::find()
            .filter(signup_tokens::Column::Email.eq(normalize_email(email)))
            .filter(signup_tokens::Column::UsedAt.is_null())
            .one(&self.conn)
            .await
            .context("Failed to query unused signup token")?;

        Ok(row.map(SignupToken::from))
    }

    /// Ensure a claimable token exists for `email`.
    ///
    /// Inserts a fresh row; the partial unique index on unused rows turns a
    /// concurrent or earlier issuance into a conflict, in which case the
    /// existing row is reused when live and re-armed in place when expired.
    pub async fn issue(&self, email: &str, ttl: Duration) -> Result<IssuedToken> {
        let email = normalize_email(email);

        for _ in 0..ISSUE_ATTEMPTS {
            let now = Utc::now();
            let active_model = signup_tokens::ActiveModel {
                token: Set(generate_token()),
                email: Set(email.clone()),
                expires_at: Set(now + ttl),
                used_at: Set(None),
                created_at: Set(now),
                ..Default::default()
            };

            match active_model.insert(&self.conn).await {
                Ok(model) => {
                    return Ok(IssuedToken {
                        token: SignupToken::from(model),
                        reused: false,
                    });
                }
                Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                    debug!(email = %email, "Signup token already present, reusing");
                }
                Err(e) => return Err(e).context("Failed to insert signup token"),
            }

            let Some(existing) = self.get_unused_for_email(&email).await? else {
                // The conflicting row was consumed in the meantime.
                continue;
            };

            if existing.is_claimable_at(now) {
                return Ok(IssuedToken {
                    token: existing,
                    reused: true,
                });
            }

            if let Some(rearmed) = self.rearm(&existing, ttl, now).await? {
                return Ok(IssuedToken {
                    token: rearmed,
                    reused: false,
                });
            }
        }

        anyhow::bail!("Could not issue signup token for {email} after repeated conflicts")
    }

    /// Overwrite an expired unused row with a fresh token and window. The
    /// update is keyed on the old token value so two re-armers cannot both win.
    async fn rearm(
        &self,
        existing: &SignupToken,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<SignupToken>> {
        let fresh = generate_token();

        let result = SignupTokens::update_many()
            .col_expr(signup_tokens::Column::Token, Expr::value(fresh.clone()))
            .col_expr(signup_tokens::Column::ExpiresAt, Expr::value(now + ttl))
            .col_expr(signup_tokens::Column::CreatedAt, Expr::value(now))
            .filter(signup_tokens::Column::Id.eq(existing.id))
            .filter(signup_tokens::Column::Token.eq(existing.token.as_str()))
            .filter(signup_tokens::Column::UsedAt.is_null())
            .exec(&self.conn)
            .await
            .context("Failed to re-arm expired signup token")?;

        if result.rows_affected != 1 {
            return Ok(None);
        }

        self.get_by_token(&fresh).await
    }

    /// Consume a token. Only the first caller observes `true`.
    pub async fn mark_used(&self, token_id: i32, now: DateTime<Utc>) -> Result<bool> {
        let result = SignupTokens::update_many()
            .col_expr(signup_tokens::Column::UsedAt, Expr::value(Some(now)))
            .filter(signup_tokens::Column::Id.eq(token_id))
            .filter(signup_tokens::Column::UsedAt.is_null())
            .exec(&self.conn)
            .await
            .context("Failed to mark signup token used")?;

        Ok(result.rows_affected == 1)
    }
}
