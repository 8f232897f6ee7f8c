use std::fmt;

use argon2::{
    password_hash::{
        errors::Error as HashError, rand_core::OsRng, PasswordHash, PasswordHasher,
        PasswordVerifier, SaltString,
    },
    Argon2,
};
use chrono::{NaiveDateTime, Utc};
use sqlx::{query, query_as, query_scalar, Error as SqlxError, FromRow, SqliteExecutor, Type};
use tunnelhub_common::db::{DbPool, Id, NoId};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize, Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
    Premium,
}

impl UserRole {
    /// Premium relays are reserved for paying users and administrators.
    #[must_use]
    pub fn has_premium_access(self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Premium)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::User => write!(f, "user"),
            UserRole::Premium => write!(f, "premium"),
        }
    }
}

#[derive(Clone, Debug, FromRow, PartialEq, Serialize)]
pub struct User<I = NoId> {
    pub id: I,
    pub username: String,
    #[serde(skip_serializing)]
    pub(crate) password_hash: Option<String>,
    pub email: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    pub is_locked: bool,
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub max_devices: i64,
    pub data_limit_mb: Option<i64>,
    // lifetime transfer counters, advanced only by the usage aggregator
    pub total_uploaded: i64,
    pub total_downloaded: i64,
    pub last_login: Option<NaiveDateTime>,
    pub last_connection: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

fn hash_password(password: &str) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

impl User {
    #[must_use]
    pub fn new<S: Into<String>>(username: S, password: Option<&str>, email: Option<String>) -> Self {
        let now = Utc::now().naive_utc();
        let password_hash = password.and_then(|password| hash_password(password).ok());
        Self {
            id: NoId,
            username: username.into(),
            password_hash,
            email,
            role: UserRole::User,
            is_active: true,
            is_locked: false,
            device_id: None,
            device_name: None,
            max_devices: 1,
            data_limit_mb: None,
            total_uploaded: 0,
            total_downloaded: 0,
            last_login: None,
            last_connection: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn save<'e, E>(self, executor: E) -> Result<User<Id>, SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        let id = query_scalar(
            "INSERT INTO \"user\" (username, password_hash, email, role, is_active, is_locked, \
            device_id, device_name, max_devices, data_limit_mb, total_uploaded, total_downloaded, \
            last_login, last_connection, created_at, updated_at) \
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
            RETURNING id",
        )
        .bind(&self.username)
        .bind(&self.password_hash)
        .bind(&self.email)
        .bind(self.role)
        .bind(self.is_active)
        .bind(self.is_locked)
        .bind(&self.device_id)
        .bind(&self.device_name)
        .bind(self.max_devices)
        .bind(self.data_limit_mb)
        .bind(self.total_uploaded)
        .bind(self.total_downloaded)
        .bind(self.last_login)
        .bind(self.last_connection)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(executor)
        .await?;
        Ok(User::<Id> {
            id,
            username: self.username,
            password_hash: self.password_hash,
            email: self.email,
            role: self.role,
            is_active: self.is_active,
            is_locked: self.is_locked,
            device_id: self.device_id,
            device_name: self.device_name,
            max_devices: self.max_devices,
            data_limit_mb: self.data_limit_mb,
            total_uploaded: self.total_uploaded,
            total_downloaded: self.total_downloaded,
            last_login: self.last_login,
            last_connection: self.last_connection,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl<I> User<I> {
    pub fn set_password(&mut self, password: &str) {
        self.password_hash = hash_password(password).ok();
    }

    pub(crate) fn verify_password(&self, password: &str) -> Result<(), HashError> {
        match &self.password_hash {
            Some(hash) => {
                let parsed_hash = PasswordHash::new(hash)?;
                Argon2::default().verify_password(password.as_bytes(), &parsed_hash)
            }
            None => {
                error!("Password not set for user {}", self.username);
                Err(HashError::Password)
            }
        }
    }

    #[must_use]
    pub fn used_bytes(&self) -> i64 {
        self.total_uploaded + self.total_downloaded
    }

    #[must_use]
    pub fn used_mb(&self) -> f64 {
        self.used_bytes() as f64 / BYTES_PER_MB
    }

    /// Remaining data allowance in megabytes, `None` when the account is unlimited.
    #[must_use]
    pub fn remaining_quota_mb(&self) -> Option<f64> {
        self.data_limit_mb
            .map(|limit| (limit as f64 - self.used_mb()).max(0.0))
    }

    /// Share of the data allowance already consumed, `None` when unlimited.
    #[must_use]
    pub fn used_percent(&self) -> Option<f64> {
        self.data_limit_mb
            .map(|limit| self.used_mb() / limit as f64 * 100.0)
    }

    #[must_use]
    pub fn quota_exceeded(&self) -> bool {
        self.data_limit_mb
            .is_some_and(|limit| self.used_mb() >= limit as f64)
    }

    /// Device lock check. A locked account with a bound device rejects any
    /// differing device identifier; a request carrying no identifier is
    /// accepted (clients predating device registration keep working).
    #[must_use]
    pub fn check_device_lock(&self, presented: Option<&str>) -> bool {
        if !self.is_locked {
            return true;
        }
        match (&self.device_id, presented) {
            (Some(bound), Some(presented)) => bound == presented,
            _ => true,
        }
    }
}

impl User<Id> {
    pub async fn find_by_id<'e, E>(executor: E, id: Id) -> Result<Option<Self>, SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        query_as(
            "SELECT id, username, password_hash, email, role, is_active, is_locked, device_id, \
            device_name, max_devices, data_limit_mb, total_uploaded, total_downloaded, last_login, \
            last_connection, created_at, updated_at FROM \"user\" WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_username<'e, E>(
        executor: E,
        username: &str,
    ) -> Result<Option<Self>, SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        query_as(
            "SELECT id, username, password_hash, email, role, is_active, is_locked, device_id, \
            device_name, max_devices, data_limit_mb, total_uploaded, total_downloaded, last_login, \
            last_connection, created_at, updated_at FROM \"user\" WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_email<'e, E>(executor: E, email: &str) -> Result<Option<Self>, SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        query_as(
            "SELECT id, username, password_hash, email, role, is_active, is_locked, device_id, \
            device_name, max_devices, data_limit_mb, total_uploaded, total_downloaded, last_login, \
            last_connection, created_at, updated_at FROM \"user\" WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(executor)
        .await
    }

    pub async fn all<'e, E>(executor: E) -> Result<Vec<Self>, SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        query_as(
            "SELECT id, username, password_hash, email, role, is_active, is_locked, device_id, \
            device_name, max_devices, data_limit_mb, total_uploaded, total_downloaded, last_login, \
            last_connection, created_at, updated_at FROM \"user\" ORDER BY created_at DESC",
        )
        .fetch_all(executor)
        .await
    }

    /// Persist mutable account fields. Lifetime transfer counters are
    /// excluded; `add_usage` is their only write path.
    pub async fn save<'e, E>(&self, executor: E) -> Result<(), SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        query(
            "UPDATE \"user\" SET username = ?, password_hash = ?, email = ?, role = ?, \
            is_active = ?, is_locked = ?, device_id = ?, device_name = ?, max_devices = ?, \
            data_limit_mb = ?, last_login = ?, last_connection = ?, updated_at = ? \
            WHERE id = ?",
        )
        .bind(&self.username)
        .bind(&self.password_hash)
        .bind(&self.email)
        .bind(self.role)
        .bind(self.is_active)
        .bind(self.is_locked)
        .bind(&self.device_id)
        .bind(&self.device_name)
        .bind(self.max_devices)
        .bind(self.data_limit_mb)
        .bind(self.last_login)
        .bind(self.last_connection)
        .bind(Utc::now().naive_utc())
        .bind(self.id)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn delete<'e, E>(self, executor: E) -> Result<(), SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        query("DELETE FROM \"user\" WHERE id = ?")
            .bind(self.id)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Advance lifetime transfer counters. Single write path for these
    /// columns; called by the usage aggregator when a session is rolled up.
    pub(crate) async fn add_usage<'e, E>(
        executor: E,
        user_id: Id,
        uploaded: i64,
        downloaded: i64,
    ) -> Result<(), SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        query(
            "UPDATE \"user\" SET total_uploaded = total_uploaded + ?, \
            total_downloaded = total_downloaded + ? WHERE id = ?",
        )
        .bind(uploaded)
        .bind(downloaded)
        .bind(user_id)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub(crate) async fn touch_last_connection<'e, E>(
        executor: E,
        user_id: Id,
        timestamp: NaiveDateTime,
    ) -> Result<(), SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        query("UPDATE \"user\" SET last_connection = ? WHERE id = ?")
            .bind(timestamp)
            .bind(user_id)
            .execute(executor)
            .await?;
        Ok(())
    }

    pub async fn update_last_login<'e, E>(&mut self, executor: E) -> Result<(), SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        let now = Utc::now().naive_utc();
        query("UPDATE \"user\" SET last_login = ? WHERE id = ?")
            .bind(now)
            .bind(self.id)
            .execute(executor)
            .await?;
        self.last_login = Some(now);
        Ok(())
    }

    pub async fn bind_device<'e, E>(
        &mut self,
        executor: E,
        device_id: String,
        device_name: Option<String>,
    ) -> Result<(), SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        query("UPDATE \"user\" SET device_id = ?, device_name = ? WHERE id = ?")
            .bind(&device_id)
            .bind(&device_name)
            .bind(self.id)
            .execute(executor)
            .await?;
        self.device_id = Some(device_id);
        self.device_name = device_name;
        Ok(())
    }

    /// Lock the account to its currently bound device.
    pub async fn lock_device<'e, E>(&mut self, executor: E) -> Result<(), SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        query("UPDATE \"user\" SET is_locked = TRUE WHERE id = ?")
            .bind(self.id)
            .execute(executor)
            .await?;
        self.is_locked = true;
        Ok(())
    }

    /// Release the device lock and forget the binding.
    pub async fn unlock_device<'e, E>(&mut self, executor: E) -> Result<(), SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        query("UPDATE \"user\" SET is_locked = FALSE, device_id = NULL, device_name = NULL WHERE id = ?")
            .bind(self.id)
            .execute(executor)
            .await?;
        self.is_locked = false;
        self.device_id = None;
        self.device_name = None;
        Ok(())
    }

    /// Create the default admin account unless one exists already.
    pub async fn init_admin_user(pool: &DbPool, default_password: &str) -> Result<(), SqlxError> {
        if User::find_by_username(pool, "admin").await?.is_some() {
            return Ok(());
        }
        info!("Creating default admin user");
        let mut user = User::new("admin", Some(default_password), None);
        user.role = UserRole::Admin;
        user.save(pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn test_user() -> User {
        User::new("scott", Some("hunter2"), Some("scott@example.com".into()))
    }

    #[test]
    fn test_password_verification() {
        let user = test_user();
        assert!(user.verify_password("hunter2").is_ok());
        assert!(user.verify_password("-wrong-").is_err());
    }

    #[test]
    fn test_quota_math() {
        let mut user = test_user();
        assert_eq!(user.remaining_quota_mb(), None);
        assert_eq!(user.used_percent(), None);
        assert!(!user.quota_exceeded());

        user.data_limit_mb = Some(100);
        user.total_uploaded = 100 * 1024 * 1024;
        user.total_downloaded = 50 * 1024 * 1024;
        assert_eq!(user.used_mb(), 150.0);
        assert_eq!(user.remaining_quota_mb(), Some(0.0));
        assert_eq!(user.used_percent(), Some(150.0));
        assert!(user.quota_exceeded());
    }

    #[test]
    fn test_device_lock() {
        let mut user = test_user();
        // unlocked accounts accept anything
        assert!(user.check_device_lock(Some("phone-1")));

        user.is_locked = true;
        // locked without a binding is still permissive
        assert!(user.check_device_lock(Some("phone-1")));

        user.device_id = Some("phone-1".into());
        assert!(user.check_device_lock(Some("phone-1")));
        assert!(!user.check_device_lock(Some("phone-2")));
        // missing identifier is treated as compatible
        assert!(user.check_device_lock(None));
    }
}
