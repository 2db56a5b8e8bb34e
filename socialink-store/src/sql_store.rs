use async_trait::async_trait;
use chrono::{DateTime, Utc};
use socialink_core::store::ExtraData;
use socialink_core::{LinkRecord, LinkStore, StoreError};
use sqlx::Database;
use uuid::Uuid;

/// A user row kept by [`SqlStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SqlUser {
    /// Primary key assigned by the database.
    pub id: i64,
    /// Login name.
    pub username: String,
}

/// Link storage backed by a `sqlx` pool.
///
/// Uniqueness of `(provider, external_id)` is enforced by the schema created in
/// `migrate`, so concurrent writers racing on the same identity see
/// [`StoreError::Duplicate`].
#[derive(Clone, Debug)]
pub struct SqlStore<DB: Database> {
    pool: sqlx::Pool<DB>,
    users_table: String,
    links_table: String,
}

impl<DB: Database> SqlStore<DB> {
    /// Create a store using the `socialink_users` and `socialink_links` tables.
    pub fn new(pool: sqlx::Pool<DB>) -> Self {
        Self {
            pool,
            users_table: "socialink_users".to_string(),
            links_table: "socialink_links".to_string(),
        }
    }

    /// Create a store using custom table names.
    pub fn with_table_names(
        pool: sqlx::Pool<DB>,
        users_table: impl Into<String>,
        links_table: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            users_table: users_table.into(),
            links_table: links_table.into(),
        }
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<DB> {
        &self.pool
    }
}

type LinkRow = (String, String, String, String, DateTime<Utc>, i64, String);

fn db_error(operation: &str, err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate,
        _ => StoreError::Backend(format!("{operation} error: {err}")),
    }
}

fn link_from_row(row: LinkRow) -> Result<LinkRecord<SqlUser>, StoreError> {
    let (id, provider, external_id, extra_json, created_at, user_id, username) = row;
    let id = Uuid::parse_str(&id)
        .map_err(|e| StoreError::Backend(format!("invalid link id {id}: {e}")))?;
    let extra_data: ExtraData = serde_json::from_str(&extra_json)
        .map_err(|e| StoreError::Backend(format!("extra data deserialization error: {e}")))?;

    Ok(LinkRecord {
        id,
        provider,
        external_id,
        user: SqlUser {
            id: user_id,
            username,
        },
        extra_data,
        created_at,
    })
}

fn encode_extra_data(extra_data: &ExtraData) -> Result<String, StoreError> {
    serde_json::to_string(extra_data)
        .map_err(|e| StoreError::Backend(format!("extra data serialization error: {e}")))
}

macro_rules! impl_sql_link_store {
    (
        $db:ty,
        label: $label:literal,
        user_id_column: $user_id_column:literal,
        timestamp_column: $timestamp_column:literal,
        params: [$p1:literal, $p2:literal, $p3:literal, $p4:literal, $p5:literal, $p6:literal]
    ) => {
        impl SqlStore<$db> {
            /// Create the users and links tables if they do not exist.
            pub async fn migrate(&self) -> Result<(), StoreError> {
                let users = format!(
                    "CREATE TABLE IF NOT EXISTS {} (id {}, username TEXT NOT NULL)",
                    self.users_table, $user_id_column
                );
                let links = format!(
                    "CREATE TABLE IF NOT EXISTS {links} (
                     id TEXT PRIMARY KEY,
                     provider TEXT NOT NULL,
                     external_id TEXT NOT NULL,
                     user_id BIGINT NOT NULL REFERENCES {users}(id),
                     extra_data TEXT NOT NULL,
                     created_at {ts} NOT NULL,
                     UNIQUE (provider, external_id))",
                    links = self.links_table,
                    users = self.users_table,
                    ts = $timestamp_column,
                );
                for statement in [users, links] {
                    sqlx::query(&statement)
                        .execute(&self.pool)
                        .await
                        .map_err(|e| db_error(concat!($label, " migrate"), e))?;
                }
                Ok(())
            }
        }

        #[async_trait]
        impl LinkStore for SqlStore<$db> {
            type User = SqlUser;

            async fn find_link(
                &self,
                provider: &str,
                external_id: &str,
            ) -> Result<Option<LinkRecord<SqlUser>>, StoreError> {
                let query = format!(
                    "SELECT l.id, l.provider, l.external_id, l.extra_data, l.created_at, u.id, u.username
                     FROM {} l JOIN {} u ON u.id = l.user_id
                     WHERE l.provider = {} AND l.external_id = {}",
                    self.links_table, self.users_table, $p1, $p2
                );
                let row: Option<LinkRow> = sqlx::query_as(&query)
                    .bind(provider)
                    .bind(external_id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| db_error(concat!($label, " find_link"), e))?;

                row.map(link_from_row).transpose()
            }

            async fn create_link(
                &self,
                provider: &str,
                external_id: &str,
                user: &SqlUser,
            ) -> Result<LinkRecord<SqlUser>, StoreError> {
                let link = LinkRecord::new(provider, external_id, user.clone());
                let query = format!(
                    "INSERT INTO {} (id, provider, external_id, user_id, extra_data, created_at)
                     VALUES ({}, {}, {}, {}, {}, {})",
                    self.links_table, $p1, $p2, $p3, $p4, $p5, $p6
                );

                sqlx::query(&query)
                    .bind(link.id.to_string())
                    .bind(&link.provider)
                    .bind(&link.external_id)
                    .bind(user.id)
                    .bind(encode_extra_data(&link.extra_data)?)
                    .bind(link.created_at)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| db_error(concat!($label, " create_link"), e))?;

                Ok(link)
            }

            async fn rebind_link(
                &self,
                link: &LinkRecord<SqlUser>,
                new_user: &SqlUser,
            ) -> Result<LinkRecord<SqlUser>, StoreError> {
                let query = format!(
                    "UPDATE {} SET user_id = {} WHERE id = {}",
                    self.links_table, $p1, $p2
                );
                let result = sqlx::query(&query)
                    .bind(new_user.id)
                    .bind(link.id.to_string())
                    .execute(&self.pool)
                    .await
                    .map_err(|e| db_error(concat!($label, " rebind_link"), e))?;

                if result.rows_affected() == 0 {
                    return Err(StoreError::NotFound);
                }
                let mut rebound = link.clone();
                rebound.user = new_user.clone();
                Ok(rebound)
            }

            async fn create_user(&self, username: &str) -> Result<SqlUser, StoreError> {
                let query = format!(
                    "INSERT INTO {} (username) VALUES ({}) RETURNING id",
                    self.users_table, $p1
                );
                let (id,): (i64,) = sqlx::query_as(&query)
                    .bind(username)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| db_error(concat!($label, " create_user"), e))?;

                Ok(SqlUser {
                    id,
                    username: username.to_string(),
                })
            }

            async fn update_extra_data(
                &self,
                link: &LinkRecord<SqlUser>,
                extra_data: ExtraData,
            ) -> Result<LinkRecord<SqlUser>, StoreError> {
                let query = format!(
                    "UPDATE {} SET extra_data = {} WHERE id = {}",
                    self.links_table, $p1, $p2
                );
                let result = sqlx::query(&query)
                    .bind(encode_extra_data(&extra_data)?)
                    .bind(link.id.to_string())
                    .execute(&self.pool)
                    .await
                    .map_err(|e| db_error(concat!($label, " update_extra_data"), e))?;

                if result.rows_affected() == 0 {
                    return Err(StoreError::NotFound);
                }
                let mut updated = link.clone();
                updated.extra_data = extra_data;
                Ok(updated)
            }
        }
    };
}

#[cfg(feature = "postgres")]
impl_sql_link_store!(
    sqlx::Postgres,
    label: "Postgres",
    user_id_column: "BIGSERIAL PRIMARY KEY",
    timestamp_column: "TIMESTAMPTZ",
    params: ["$1", "$2", "$3", "$4", "$5", "$6"]
);

#[cfg(feature = "sqlite")]
impl_sql_link_store!(
    sqlx::Sqlite,
    label: "Sqlite",
    user_id_column: "INTEGER PRIMARY KEY AUTOINCREMENT",
    timestamp_column: "TEXT",
    params: ["?1", "?2", "?3", "?4", "?5", "?6"]
);
