//! Account, access-token and currency-ledger operations.
//!
//! Each call checks out its own pooled connection (or transaction) and
//! releases it before returning; nothing is held between calls. Isolation
//! across concurrent callers comes from PostgreSQL:
//!
//! - balance changes are a single `UPDATE .. RETURNING` round trip
//! - first-time ledger creation races are settled by the primary key
//! - account provisioning is one transaction over three tables

use futures::TryStreamExt;
use sqlx::{Postgres, Row, Transaction};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::credentials::{
    Argon2Hasher, CredentialError, CredentialHasher, IdGenerator, UuidGenerator,
};
use super::error::ProvisionError;
use super::models::{AccountId, Currency, SERVER_STATISTIC_ID, keys, tables};
use crate::db::{Database, DbError, Executor, Predicate, Value};

pub struct AccountStore {
    db: Database,
    executor: Executor,
    hasher: Arc<dyn CredentialHasher>,
    ids: Arc<dyn IdGenerator>,
}

impl AccountStore {
    /// Store with Argon2 credentials, UUID account ids and the process-wide
    /// statement cache.
    pub fn new(db: Database) -> Self {
        Self::with_parts(
            db,
            Executor::new(),
            Arc::new(Argon2Hasher),
            Arc::new(UuidGenerator),
        )
    }

    pub fn with_parts(
        db: Database,
        executor: Executor,
        hasher: Arc<dyn CredentialHasher>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            db,
            executor,
            hasher,
            ids,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    // ------------------------------------------------------------------
    // Login, token, level, bans
    // ------------------------------------------------------------------

    /// Returns the account id if `username` exists and `password` matches.
    ///
    /// An unknown username and a wrong password both yield `None`. The unknown
    /// username path skips password verification and so returns sooner.
    pub async fn validate_login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<AccountId>, DbError> {
        let found = {
            let mut cursor = self.executor.select_rows(
                self.db.pool(),
                keys::VALIDATE_USER_LOGIN,
                tables::USERS,
                &["id", "password"],
                Predicate::equal_to("username", username),
                Some(1),
            )?;
            match cursor.try_next().await? {
                Some(row) => Some((
                    row.try_get::<String, _>("id")?,
                    row.try_get::<String, _>("password")?,
                )),
                None => None,
            }
        };

        let Some((account_id, digest)) = found else {
            debug!("Login rejected");
            return Ok(None);
        };

        let hasher = Arc::clone(&self.hasher);
        let password = password.to_owned();
        let verified = tokio::task::spawn_blocking(move || hasher.verify(&password, &digest))
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "Password verification task failed");
                false
            });

        if verified {
            debug!(account_id = %account_id, "Login accepted");
            Ok(Some(account_id))
        } else {
            debug!("Login rejected");
            Ok(None)
        }
    }

    /// True iff the account's current access token equals `token`.
    pub async fn validate_access_token(
        &self,
        account_id: &str,
        token: &str,
    ) -> Result<bool, DbError> {
        let count = self
            .executor
            .count(
                self.db.pool(),
                keys::VALIDATE_ACCESS_TOKEN,
                tables::USERS,
                Some(
                    Predicate::equal_to("id", account_id)
                        .and(Predicate::equal_to("access_token", token)),
                ),
            )
            .await?;
        Ok(count > 0)
    }

    /// Unconditional; an unknown account id updates nothing.
    pub async fn update_access_token(&self, account_id: &str, token: &str) -> Result<(), DbError> {
        let rows = self
            .executor
            .update(
                self.db.pool(),
                keys::UPDATE_ACCESS_TOKEN,
                tables::USERS,
                vec![("access_token", token.into())],
                Predicate::equal_to("id", account_id),
            )
            .await?;
        debug!(account_id, rows, "Access token updated");
        Ok(())
    }

    /// 0 when the account has no level stored.
    pub async fn get_user_level(&self, account_id: &str) -> Result<i16, DbError> {
        let level: Option<Option<i16>> = self
            .executor
            .select_scalar(
                self.db.pool(),
                keys::GET_USER_LEVEL,
                tables::USER_ACCESSES,
                "level",
                Predicate::equal_to("id", account_id),
            )
            .await?;
        Ok(level.flatten().unwrap_or(0))
    }

    /// 0 when the account has no unban time stored.
    pub async fn get_unban_time(&self, account_id: &str) -> Result<i64, DbError> {
        let unban_time: Option<Option<i64>> = self
            .executor
            .select_scalar(
                self.db.pool(),
                keys::GET_USER_UNBAN_TIME,
                tables::USER_ACCESSES,
                "unban_time",
                Predicate::equal_to("id", account_id),
            )
            .await?;
        Ok(unban_time.flatten().unwrap_or(0))
    }

    /// Resolve the character's owner (name matched case-insensitively) and
    /// upsert that account's unban time. Returns `false`, without error, when
    /// no character has that name.
    pub async fn set_unban_time_by_character_name(
        &self,
        character_name: &str,
        unban_time: i64,
    ) -> Result<bool, DbError> {
        let mut conn = self.db.pool().acquire().await?;

        let owner: Option<Option<String>> = self
            .executor
            .select_scalar(
                &mut *conn,
                keys::RESOLVE_CHARACTER_OWNER,
                tables::CHARACTERS,
                "user_id",
                Predicate::equal_to_ignore_case("character_name", character_name),
            )
            .await?;
        let Some(account_id) = owner.flatten().filter(|id| !id.trim().is_empty()) else {
            debug!(character_name, "Unban skipped, no such character");
            return Ok(false);
        };

        self.executor
            .upsert(
                &mut *conn,
                keys::SET_USER_UNBAN_TIME,
                tables::USER_ACCESSES,
                "id",
                vec![("unban_time", unban_time.into()), ("id", account_id.clone().into())],
            )
            .await?;
        info!(character_name, account_id = %account_id, unban_time, "Unban time set");
        Ok(true)
    }

    /// Returns `false`, without error, when no character has that name.
    pub async fn set_unmute_time_by_character_name(
        &self,
        character_name: &str,
        unmute_time: i64,
    ) -> Result<bool, DbError> {
        let rows = self
            .executor
            .update(
                self.db.pool(),
                keys::SET_CHARACTER_UNMUTE_TIME_BY_NAME,
                tables::CHARACTERS,
                vec![("unmute_time", unmute_time.into())],
                Predicate::equal_to_ignore_case("character_name", character_name),
            )
            .await?;
        info!(character_name, unmute_time, rows, "Unmute time set");
        Ok(rows > 0)
    }

    // ------------------------------------------------------------------
    // Currency ledger
    // ------------------------------------------------------------------

    /// Make sure the account has a ledger row, creating a zero-balance one if
    /// not. Losing a creation race to another caller is success.
    pub async fn ensure_ledger(&self, account_id: &str) -> Result<(), DbError> {
        let pool = self.db.pool();
        let count = self
            .executor
            .count(
                pool,
                keys::COUNT_USER_CURRENCIES,
                tables::USER_CURRENCIES,
                Some(Predicate::equal_to("id", account_id)),
            )
            .await?;
        if count > 0 {
            return Ok(());
        }

        let inserted = self
            .executor
            .insert(
                pool,
                keys::CREATE_USER_CURRENCIES,
                tables::USER_CURRENCIES,
                vec![
                    ("id", account_id.into()),
                    ("gold", Value::Int(0)),
                    ("cash", Value::Int(0)),
                ],
            )
            .await;
        match inserted {
            Ok(()) => {
                debug!(account_id, "Currency ledger created");
                Ok(())
            }
            Err(DbError::ConstraintViolation { .. }) => {
                debug!(account_id, "Currency ledger already created by another caller");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get_balance(&self, account_id: &str, currency: Currency) -> Result<i32, DbError> {
        self.ensure_ledger(account_id).await?;
        let balance: Option<Option<i32>> = self
            .executor
            .select_scalar(
                self.db.pool(),
                currency.get_key(),
                tables::USER_CURRENCIES,
                currency.column(),
                Predicate::equal_to("id", account_id),
            )
            .await?;
        Ok(balance.flatten().unwrap_or(0))
    }

    /// Add `delta` (may be negative) and return the new balance, atomically.
    pub async fn change_balance(
        &self,
        account_id: &str,
        currency: Currency,
        delta: i32,
    ) -> Result<i32, DbError> {
        self.ensure_ledger(account_id).await?;
        let balance = self
            .executor
            .increment(
                self.db.pool(),
                currency.change_key(),
                tables::USER_CURRENCIES,
                currency.column(),
                delta,
                Predicate::equal_to("id", account_id),
            )
            .await?;
        debug!(account_id, ?currency, delta, ?balance, "Balance changed");
        Ok(balance.unwrap_or(0))
    }

    pub async fn get_gold(&self, account_id: &str) -> Result<i32, DbError> {
        self.get_balance(account_id, Currency::Gold).await
    }

    pub async fn change_gold(&self, account_id: &str, delta: i32) -> Result<i32, DbError> {
        self.change_balance(account_id, Currency::Gold, delta).await
    }

    pub async fn get_cash(&self, account_id: &str) -> Result<i32, DbError> {
        self.get_balance(account_id, Currency::Cash).await
    }

    pub async fn change_cash(&self, account_id: &str, delta: i32) -> Result<i32, DbError> {
        self.change_balance(account_id, Currency::Cash, delta).await
    }

    // ------------------------------------------------------------------
    // Provisioning and discovery
    // ------------------------------------------------------------------

    /// Create the account, access grant and currency ledger rows in one
    /// transaction and return the new account id.
    ///
    /// On any failure the transaction is rolled back, the failure is logged,
    /// and the error is returned; no partial account is ever visible.
    pub async fn create_login(
        &self,
        username: &str,
        password: &str,
        email: Option<&str>,
    ) -> Result<AccountId, ProvisionError> {
        let account_id = self.ids.new_id();
        match self.provision(&account_id, username, password, email).await {
            Ok(()) => {
                info!(account_id = %account_id, "Account created");
                Ok(account_id)
            }
            Err(e) => {
                error!(account_id = %account_id, error = %e, "Account provisioning failed");
                Err(e)
            }
        }
    }

    async fn provision(
        &self,
        account_id: &str,
        username: &str,
        password: &str,
        email: Option<&str>,
    ) -> Result<(), ProvisionError> {
        let hasher = Arc::clone(&self.hasher);
        let owned = password.to_owned();
        let digest = tokio::task::spawn_blocking(move || hasher.hash(&owned))
            .await
            .map_err(|e| CredentialError(e.to_string()))??;

        // Blank means no email; anything else is stored as given.
        let email = email
            .filter(|e| !e.trim().is_empty())
            .map(str::to_owned);

        let mut tx = self.db.begin().await?;
        let inserted = self
            .insert_account_rows(&mut tx, account_id, username, digest, email)
            .await;

        if let Err(e) = inserted {
            if let Err(rollback) = tx.rollback().await {
                error!(account_id = %account_id, error = %rollback, "Rollback failed");
            }
            return Err(e.into());
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_account_rows(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        account_id: &str,
        username: &str,
        digest: String,
        email: Option<String>,
    ) -> Result<(), DbError> {
        self.executor
            .insert(
                &mut **tx,
                keys::CREATE_USER_LOGIN_USERS,
                tables::USERS,
                vec![
                    ("id", account_id.into()),
                    ("username", username.into()),
                    ("password", digest.into()),
                    ("email", email.into()),
                ],
            )
            .await?;
        self.executor
            .insert(
                &mut **tx,
                keys::CREATE_USER_LOGIN_ACCESSES,
                tables::USER_ACCESSES,
                vec![("id", account_id.into())],
            )
            .await?;
        self.executor
            .insert(
                &mut **tx,
                keys::CREATE_USER_LOGIN_CURRENCIES,
                tables::USER_CURRENCIES,
                vec![("id", account_id.into())],
            )
            .await?;
        Ok(())
    }

    /// Case-insensitive `LIKE` match count; `username` is used as the pattern.
    pub async fn find_username(&self, username: &str) -> Result<i64, DbError> {
        self.executor
            .count(
                self.db.pool(),
                keys::FIND_USERNAME,
                tables::USERS,
                Some(Predicate::like_ignore_case("username", username)),
            )
            .await
    }

    /// Case-insensitive `LIKE` match count; `email` is used as the pattern.
    pub async fn find_email(&self, email: &str) -> Result<i64, DbError> {
        self.executor
            .count(
                self.db.pool(),
                keys::FIND_EMAIL,
                tables::USERS,
                Some(Predicate::like_ignore_case("email", email)),
            )
            .await
    }

    pub async fn validate_email_verification(&self, account_id: &str) -> Result<bool, DbError> {
        let count = self
            .executor
            .count(
                self.db.pool(),
                keys::VALIDATE_EMAIL_VERIFICATION,
                tables::USERS,
                Some(Predicate::equal_to("id", account_id).and(Predicate::equal_to("is_verify", true))),
            )
            .await?;
        Ok(count > 0)
    }

    /// Upsert the single server statistic row.
    pub async fn update_user_count(&self, user_count: i32) -> Result<(), DbError> {
        self.executor
            .upsert(
                self.db.pool(),
                keys::UPDATE_USER_COUNT,
                tables::SERVER_STATISTIC,
                "id",
                vec![
                    ("user_count", user_count.into()),
                    ("id", SERVER_STATISTIC_ID.into()),
                ],
            )
            .await
    }
}
