//! Credential store adapter over the FreeRADIUS tables.

use std::time::Duration;

use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use tracing::debug;

use super::model::{
    AccountingRecord, AttributeRow, DailyUsage, ExportRow, Mutation, NewUser, Stats, UserRows,
    UserSummary, UserUpdate, ASSIGN_OP, CREATED_BY, DOWNLOAD_RATE_ATTRIBUTE, PASSWORD_ATTRIBUTE,
    UPLOAD_RATE_ATTRIBUTE,
};
use super::queries;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unsupported database URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// SQL dialect of the connected database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    /// MySQL/MariaDB, the usual FreeRADIUS backend.
    MySQL,
    /// SQLite, for development databases and tests.
    SQLite,
}

impl DatabaseType {
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("mysql://") || url.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if url.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    fn pick(self, mysql: &'static str, sqlite: &'static str) -> &'static str {
        match self {
            DatabaseType::MySQL => mysql,
            DatabaseType::SQLite => sqlite,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }
}

/// Pooled access to the credential and accounting tables.
///
/// Cheap to clone; all clones share one pool.
#[derive(Clone)]
pub struct Store {
    pool: AnyPool,
    db_type: DatabaseType,
}

impl Store {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let db_type = DatabaseType::from_url(&config.url).ok_or_else(|| {
            let scheme = config.url.split(':').next().unwrap_or_default();
            StoreError::UnsupportedScheme(scheme.to_owned())
        })?;

        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(1)
            .acquire_timeout(config.connect_timeout)
            .connect(&config.url)
            .await?;

        debug!(?db_type, max_connections = config.max_connections, "database pool ready");
        Ok(Self { pool, db_type })
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn database_type(&self) -> DatabaseType {
        self.db_type
    }

    // ── Users ────────────────────────────────────────────────────────────

    /// One page of users whose name contains `search`, newest first.
    pub async fn list_users(
        &self,
        search: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<UserSummary>> {
        let query = self
            .db_type
            .pick(queries::LIST_USERS_MYSQL, queries::LIST_USERS_SQLITE);
        let rows = sqlx::query(query)
            .bind(like_pattern(search))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(parse_user_summary).collect()
    }

    /// Number of users matching `search`, independent of paging.
    pub async fn count_users(&self, search: &str) -> Result<i64> {
        let row = sqlx::query(queries::COUNT_USERS)
            .bind(like_pattern(search))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }

    /// Creates every row of a new user in one transaction.
    ///
    /// Returns `Ok(false)` without writing anything if any `radcheck` row
    /// already exists for the username.
    pub async fn create_user(&self, user: &NewUser) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let check_query = self.db_type.pick(
            queries::COUNT_CHECK_ROWS_MYSQL,
            queries::COUNT_CHECK_ROWS_SQLITE,
        );
        let existing: i64 = sqlx::query(check_query)
            .bind(&user.username)
            .fetch_one(&mut *tx)
            .await?
            .try_get("n")?;
        if existing > 0 {
            return Ok(false);
        }

        sqlx::query(queries::INSERT_CHECK)
            .bind(&user.username)
            .bind(PASSWORD_ATTRIBUTE)
            .bind(ASSIGN_OP)
            .bind(&user.password)
            .execute(&mut *tx)
            .await?;

        for (attribute, rate) in [
            (UPLOAD_RATE_ATTRIBUTE, &user.bandwidth_up),
            (DOWNLOAD_RATE_ATTRIBUTE, &user.bandwidth_down),
        ] {
            sqlx::query(queries::INSERT_REPLY)
                .bind(&user.username)
                .bind(attribute)
                .bind(ASSIGN_OP)
                .bind(rate)
                .execute(&mut *tx)
                .await?;
        }

        let profile = user.profile.as_deref().filter(|p| !p.is_empty());
        if let Some(profile) = profile {
            sqlx::query(queries::INSERT_GROUP)
                .bind(&user.username)
                .bind(profile)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(queries::INSERT_USERINFO)
            .bind(&user.username)
            .bind(CREATED_BY)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Raw `radcheck` and `radreply` rows; both empty if the user is unknown.
    pub async fn user_rows(&self, username: &str) -> Result<UserRows> {
        let check_query = self
            .db_type
            .pick(queries::CHECK_ROWS_MYSQL, queries::CHECK_ROWS_SQLITE);
        let reply_query = self
            .db_type
            .pick(queries::REPLY_ROWS_MYSQL, queries::REPLY_ROWS_SQLITE);

        let check = sqlx::query(check_query)
            .bind(username)
            .fetch_all(&self.pool)
            .await?;
        let reply = sqlx::query(reply_query)
            .bind(username)
            .fetch_all(&self.pool)
            .await?;

        Ok(UserRows {
            check: check.iter().map(parse_attribute_row).collect::<Result<_>>()?,
            reply: reply.iter().map(parse_attribute_row).collect::<Result<_>>()?,
        })
    }

    /// Applies the present fields of `update` in one transaction.
    ///
    /// With `require_existing == false` a missing user is a silent no-op and
    /// the result is always [`Mutation::Applied`].
    pub async fn update_user(
        &self,
        update: &UserUpdate,
        require_existing: bool,
    ) -> Result<Mutation> {
        if update.is_empty() && !require_existing {
            return Ok(Mutation::Applied);
        }

        let mut tx = self.pool.begin().await?;

        if require_existing && !password_row_exists(&mut tx, &update.username).await? {
            return Ok(Mutation::NotFound);
        }

        if let Some(password) = &update.password {
            sqlx::query(queries::UPDATE_CHECK_VALUE)
                .bind(password)
                .bind(&update.username)
                .bind(PASSWORD_ATTRIBUTE)
                .execute(&mut *tx)
                .await?;
        }

        for (attribute, rate) in [
            (UPLOAD_RATE_ATTRIBUTE, &update.bandwidth_up),
            (DOWNLOAD_RATE_ATTRIBUTE, &update.bandwidth_down),
        ] {
            if let Some(rate) = rate {
                sqlx::query(queries::UPDATE_REPLY_VALUE)
                    .bind(rate)
                    .bind(&update.username)
                    .bind(attribute)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(Mutation::Applied)
    }

    /// Removes the user from all four credential tables in one transaction.
    pub async fn delete_user(&self, username: &str, require_existing: bool) -> Result<Mutation> {
        let mut tx = self.pool.begin().await?;

        if require_existing && !password_row_exists(&mut tx, username).await? {
            return Ok(Mutation::NotFound);
        }

        for query in [
            queries::DELETE_CHECK,
            queries::DELETE_REPLY,
            queries::DELETE_GROUP,
            queries::DELETE_USERINFO,
        ] {
            sqlx::query(query).bind(username).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(Mutation::Applied)
    }

    pub async fn export_rows(&self) -> Result<Vec<ExportRow>> {
        let query = self
            .db_type
            .pick(queries::EXPORT_MYSQL, queries::EXPORT_SQLITE);
        let rows = sqlx::query(query).fetch_all(&self.pool).await?;
        rows.iter().map(parse_export_row).collect()
    }

    // ── Accounting ───────────────────────────────────────────────────────

    /// The user's sessions, most recent start first.
    pub async fn history(&self, username: &str, limit: i64) -> Result<Vec<AccountingRecord>> {
        let query = self
            .db_type
            .pick(queries::HISTORY_MYSQL, queries::HISTORY_SQLITE);
        let rows = sqlx::query(query)
            .bind(username)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(parse_accounting_row).collect()
    }

    /// Per-day traffic over the trailing `days`, newest day first.
    pub async fn bandwidth_stats(
        &self,
        username: Option<&str>,
        days: i64,
    ) -> Result<Vec<DailyUsage>> {
        let query = match self.db_type {
            DatabaseType::MySQL => sqlx::query(queries::BANDWIDTH_MYSQL).bind(days),
            DatabaseType::SQLite => {
                sqlx::query(queries::BANDWIDTH_SQLITE).bind(format!("-{days} days"))
            }
        };
        let rows = query
            .bind(username)
            .bind(username)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(parse_daily_usage).collect()
    }

    pub async fn stats(&self) -> Result<Stats> {
        let total_users: i64 = sqlx::query(queries::COUNT_ALL_USERS)
            .fetch_one(&self.pool)
            .await?
            .try_get("total_users")?;
        let active_sessions: i64 = sqlx::query(queries::COUNT_ACTIVE_SESSIONS)
            .fetch_one(&self.pool)
            .await?
            .try_get("active_sessions")?;
        Ok(Stats {
            total_users,
            active_sessions,
        })
    }

    // ── API users ────────────────────────────────────────────────────────

    /// Role name stored for an API key, if the key is registered.
    pub async fn role_for_key(&self, api_key: &str) -> Result<Option<String>> {
        let row = sqlx::query(queries::ROLE_FOR_KEY)
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.try_get::<String, _>("role")).transpose()?)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("db_type", &self.db_type)
            .finish_non_exhaustive()
    }
}

async fn password_row_exists(
    tx: &mut sqlx::Transaction<'_, sqlx::Any>,
    username: &str,
) -> Result<bool> {
    let n: i64 = sqlx::query(queries::COUNT_PASSWORD_ROWS)
        .bind(username)
        .fetch_one(&mut **tx)
        .await?
        .try_get("n")?;
    Ok(n > 0)
}

fn like_pattern(search: &str) -> String {
    format!("%{search}%")
}

fn parse_user_summary(row: &AnyRow) -> Result<UserSummary> {
    Ok(UserSummary {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password: row.try_get("password")?,
        attributes: row.try_get("attributes")?,
    })
}

fn parse_attribute_row(row: &AnyRow) -> Result<AttributeRow> {
    Ok(AttributeRow {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        attribute: row.try_get("attribute")?,
        op: row.try_get("op")?,
        value: row.try_get("value")?,
    })
}

fn parse_export_row(row: &AnyRow) -> Result<ExportRow> {
    Ok(ExportRow {
        username: row.try_get("username")?,
        password: row.try_get("password")?,
        bandwidth_up: row.try_get("bandwidth_up")?,
        bandwidth_down: row.try_get("bandwidth_down")?,
        profile: row.try_get("profile")?,
        creationdate: row.try_get("creationdate")?,
    })
}

fn parse_accounting_row(row: &AnyRow) -> Result<AccountingRecord> {
    Ok(AccountingRecord {
        radacctid: row.try_get("radacctid")?,
        acctstarttime: row.try_get("acctstarttime")?,
        acctstoptime: row.try_get("acctstoptime")?,
        acctsessiontime: row.try_get("acctsessiontime")?,
        acctinputoctets: row.try_get("acctinputoctets")?,
        acctoutputoctets: row.try_get("acctoutputoctets")?,
        framedipaddress: row.try_get("framedipaddress")?,
        nasipaddress: row.try_get("nasipaddress")?,
    })
}

fn parse_daily_usage(row: &AnyRow) -> Result<DailyUsage> {
    Ok(DailyUsage {
        date: row.try_get("date")?,
        input_bytes: row.try_get("input_bytes")?,
        output_bytes: row.try_get("output_bytes")?,
        total_time: row.try_get("total_time")?,
    })
}
