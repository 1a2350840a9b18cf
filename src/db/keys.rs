//! Database operations for keys.
//!
//! Every state transition is a single conditional `UPDATE ... WHERE status = ...`
//! whose affected-row count tells the caller whether it won. Counters are bumped
//! in SQL, never read and written back.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, ExprTrait};
use sea_orm::{
    ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, SqlErr,
};

use crate::entity::key::{self, ActiveModel, Entity as KeyEntity};
use crate::error::{AppError, AppResult};
use crate::models::{Key, KeyStatus};

use super::DbPool;

/// Outcome of inserting a freshly generated key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another key already owns this token
    TokenTaken,
}

impl DbPool {
    /// Insert a new key row.
    pub async fn insert_key(&self, k: &Key) -> AppResult<InsertOutcome> {
        let model = ActiveModel {
            token: Set(k.token.clone()),
            status: Set(k.status.as_str().to_string()),
            created_at: Set(k.created_at),
            expires_at: Set(k.expires_at),
            redeemed_by: Set(k.redeemed_by.clone()),
            redeemed_at: Set(k.redeemed_at),
            grant_closed_at: Set(k.grant_closed_at),
            revoke_attempts: Set(k.revoke_attempts),
        };

        match KeyEntity::insert(model)
            .exec_without_returning(self.connection())
            .await
        {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Ok(InsertOutcome::TokenTaken)
            }
            Err(e) => Err(AppError::StorageUnavailable(format!(
                "Failed to insert key: {}",
                e
            ))),
        }
    }

    /// Get a key by token.
    pub async fn get_key(&self, token: &str) -> AppResult<Option<Key>> {
        let result = KeyEntity::find_by_id(token.to_string())
            .one(self.connection())
            .await?;

        result.map(model_to_key).transpose()
    }

    /// Move an unused key to `revoked`. Returns false when the key was not unused.
    pub async fn revoke_if_unused(&self, token: &str) -> AppResult<bool> {
        let result = KeyEntity::update_many()
            .col_expr(key::Column::Status, Expr::value(KeyStatus::Revoked.as_str()))
            .filter(key::Column::Token.eq(token))
            .filter(key::Column::Status.eq(KeyStatus::Unused.as_str()))
            .exec(self.connection())
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// Move an unused key to `used`, recording who redeemed it and when.
    ///
    /// This is the only place a key becomes `used`; at most one caller per token
    /// ever sees `true`.
    pub async fn mark_used_if_unused(
        &self,
        token: &str,
        subject: &str,
        redeemed_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = KeyEntity::update_many()
            .col_expr(key::Column::Status, Expr::value(KeyStatus::Used.as_str()))
            .col_expr(key::Column::RedeemedBy, Expr::value(Some(subject.to_string())))
            .col_expr(key::Column::RedeemedAt, Expr::value(Some(redeemed_at)))
            .filter(key::Column::Token.eq(token))
            .filter(key::Column::Status.eq(KeyStatus::Unused.as_str()))
            .exec(self.connection())
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// Most recent keys, newest first. Ties on `created_at` are ordered by token.
    pub async fn list_recent_keys(&self, limit: u64) -> AppResult<Vec<Key>> {
        let results = KeyEntity::find()
            .order_by_desc(key::Column::CreatedAt)
            .order_by_desc(key::Column::Token)
            .limit(limit)
            .all(self.connection())
            .await?;

        results.into_iter().map(model_to_key).collect()
    }

    /// Redeemed keys whose privilege may still be active and that have
    /// revocation attempts left.
    pub async fn open_grants(&self, max_attempts: u32) -> AppResult<Vec<Key>> {
        let results = KeyEntity::find()
            .filter(key::Column::Status.eq(KeyStatus::Used.as_str()))
            .filter(key::Column::GrantClosedAt.is_null())
            .filter(key::Column::RevokeAttempts.lt(attempts_i32(max_attempts)))
            .order_by_asc(key::Column::RedeemedAt)
            .all(self.connection())
            .await?;

        results.into_iter().map(model_to_key).collect()
    }

    /// Open grants redeemed at or before `redeemed_before` whose revocation
    /// already failed at least once but has attempts left.
    pub async fn failed_open_grants(
        &self,
        max_attempts: u32,
        redeemed_before: DateTime<Utc>,
    ) -> AppResult<Vec<Key>> {
        let results = KeyEntity::find()
            .filter(key::Column::Status.eq(KeyStatus::Used.as_str()))
            .filter(key::Column::GrantClosedAt.is_null())
            .filter(key::Column::RevokeAttempts.gte(1))
            .filter(key::Column::RevokeAttempts.lt(attempts_i32(max_attempts)))
            .filter(key::Column::RedeemedAt.lte(redeemed_before))
            .order_by_asc(key::Column::RedeemedAt)
            .all(self.connection())
            .await?;

        results.into_iter().map(model_to_key).collect()
    }

    /// Mark the grant of a redeemed key as closed. Returns false if it was
    /// already closed, so each grant is closed exactly once.
    pub async fn close_grant(&self, token: &str, closed_at: DateTime<Utc>) -> AppResult<bool> {
        let result = KeyEntity::update_many()
            .col_expr(key::Column::GrantClosedAt, Expr::value(Some(closed_at)))
            .filter(key::Column::Token.eq(token))
            .filter(key::Column::Status.eq(KeyStatus::Used.as_str()))
            .filter(key::Column::GrantClosedAt.is_null())
            .exec(self.connection())
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// Count one more failed revocation. Returns the new attempt count.
    ///
    /// Scheduled tasks and the sweeper may fail on the same grant concurrently;
    /// the increment happens in the database so no failure is lost.
    pub async fn record_revoke_failure(&self, token: &str) -> AppResult<i32> {
        let result = KeyEntity::update_many()
            .col_expr(
                key::Column::RevokeAttempts,
                Expr::col(key::Column::RevokeAttempts).add(1),
            )
            .filter(key::Column::Token.eq(token))
            .exec(self.connection())
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::KeyNotFound);
        }

        let attempts = KeyEntity::find_by_id(token.to_string())
            .one(self.connection())
            .await?
            .map(|m| m.revoke_attempts)
            .ok_or(AppError::KeyNotFound)?;

        Ok(attempts)
    }

    /// Unused keys past their expiry that nobody tried to redeem yet.
    pub async fn count_expired_unused(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let count = KeyEntity::find()
            .filter(key::Column::Status.eq(KeyStatus::Unused.as_str()))
            .filter(key::Column::ExpiresAt.lt(now))
            .count(self.connection())
            .await?;

        Ok(count)
    }

    /// Open grants whose revocation exhausted all attempts.
    pub async fn count_stuck_grants(&self, max_attempts: u32) -> AppResult<u64> {
        let count = KeyEntity::find()
            .filter(key::Column::Status.eq(KeyStatus::Used.as_str()))
            .filter(key::Column::GrantClosedAt.is_null())
            .filter(key::Column::RevokeAttempts.gte(attempts_i32(max_attempts)))
            .count(self.connection())
            .await?;

        Ok(count)
    }
}

fn attempts_i32(max_attempts: u32) -> i32 {
    i32::try_from(max_attempts).unwrap_or(i32::MAX)
}

fn model_to_key(m: key::Model) -> AppResult<Key> {
    let status = KeyStatus::parse(&m.status).ok_or_else(|| {
        AppError::StorageUnavailable(format!("Unknown key status '{}'", m.status))
    })?;

    Ok(Key {
        token: m.token,
        status,
        created_at: m.created_at,
        expires_at: m.expires_at,
        redeemed_by: m.redeemed_by,
        redeemed_at: m.redeemed_at,
        grant_closed_at: m.grant_closed_at,
        revoke_attempts: m.revoke_attempts,
    })
}
