use crate::models::*;
use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

fn account_from_row(row: &SqliteRow) -> Result<Account> {
    Ok(Account {
        id: row.try_get::<String, _>("id")?.parse()?,
        name: row.try_get("name")?,
        server: row.try_get("server")?,
        username: row.try_get("username")?,
        password: row.try_get("password")?,
        user_agent: row.try_get("user_agent")?,
        enabled: row.try_get("enabled")?,
        last_sync: row.try_get("last_sync")?,
        last_sync_status: row.try_get("last_sync_status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn credential_from_row(row: &SqliteRow) -> Result<Credential> {
    Ok(Credential {
        id: row.try_get::<String, _>("id")?.parse()?,
        account_id: row.try_get::<String, _>("account_id")?.parse()?,
        username: row.try_get("username")?,
        password: row.try_get("password")?,
        max_connections: row.try_get("max_connections")?,
        active_connections: row.try_get("active_connections")?,
        status: row.try_get("status")?,
        exp_date: row.try_get("exp_date")?,
        enabled: row.try_get("enabled")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const ACCOUNT_COLUMNS: &str = "id, name, server, username, password, user_agent, enabled, \
     last_sync, last_sync_status, created_at, updated_at";

const CREDENTIAL_COLUMNS: &str = "id, account_id, username, password, max_connections, \
     active_connections, status, exp_date, enabled, created_at, updated_at";

impl super::Database {
    pub async fn create_account(&self, request: &AccountCreateRequest) -> Result<Account> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO accounts (id, name, server, username, password, user_agent, enabled, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(&request.name)
        .bind(&request.server)
        .bind(&request.username)
        .bind(&request.password)
        .bind(request.user_agent.as_deref().unwrap_or("okhttp/3.14.9"))
        .bind(request.enabled)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_account(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created account"))
    }

    pub async fn get_account(&self, id: Uuid) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(account_from_row).collect()
    }

    pub async fn list_enabled_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE enabled = 1 ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(account_from_row).collect()
    }

    pub async fn delete_account(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_account_sync_outcome(&self, id: Uuid, status: &str) -> Result<()> {
        sqlx::query(
            "UPDATE accounts SET last_sync = ?, last_sync_status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(status)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn create_credential(&self, request: &CredentialCreateRequest) -> Result<Credential> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO credentials (id, account_id, username, password, max_connections, active_connections, enabled, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(request.account_id.to_string())
        .bind(&request.username)
        .bind(&request.password)
        .bind(request.max_connections)
        .bind(request.enabled)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_credential(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created credential"))
    }

    pub async fn get_credential(&self, id: Uuid) -> Result<Option<Credential>> {
        let row = sqlx::query(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(credential_from_row).transpose()
    }

    pub async fn list_credentials(&self, account_id: Uuid) -> Result<Vec<Credential>> {
        let rows = sqlx::query(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE account_id = ? ORDER BY created_at"
        ))
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(credential_from_row).collect()
    }

    pub async fn list_enabled_credentials(&self, account_id: Uuid) -> Result<Vec<Credential>> {
        let rows = sqlx::query(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE account_id = ? AND enabled = 1 ORDER BY created_at"
        ))
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(credential_from_row).collect()
    }

    /// First credential for API calls; the catalog is identical across all of
    /// an account's credentials. Falls back to the account's legacy fields.
    pub async fn primary_credential(&self, account: &Account) -> Result<Option<LeasedCredential>> {
        let credentials = self.list_credentials(account.id).await?;
        if let Some(first) = credentials.into_iter().next() {
            return Ok(Some(LeasedCredential::Tracked(first)));
        }

        match (&account.username, &account.password) {
            (Some(username), Some(password)) => Ok(Some(LeasedCredential::Legacy {
                username: username.clone(),
                password: password.clone(),
            })),
            _ => Ok(None),
        }
    }

    /// Refresh provider-reported fields after an auth round-trip.
    pub async fn update_credential_auth_info(
        &self,
        id: Uuid,
        max_connections: Option<i32>,
        status: Option<&str>,
        exp_date: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE credentials
             SET max_connections = COALESCE(?, max_connections),
                 status = COALESCE(?, status),
                 exp_date = COALESCE(?, exp_date),
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(max_connections)
        .bind(status)
        .bind(exp_date)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_credential(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM credentials WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
