//! Workspace repository (thin CRUD).

use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use curio_core::{Error, Result, Workspace};

/// PostgreSQL workspace repository.
pub struct PgWorkspaceRepository {
    pool: Pool<Postgres>,
}

impl PgWorkspaceRepository {
    /// Create a new PgWorkspaceRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Create a workspace, returning its id.
    pub async fn create(&self, name: &str) -> Result<Uuid> {
        let id = Uuid::now_v7();
        sqlx::query("INSERT INTO workspace (id, name) VALUES ($1, $2)")
            .bind(id)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(id)
    }

    /// List all workspaces, newest first.
    pub async fn list(&self) -> Result<Vec<Workspace>> {
        let rows = sqlx::query("SELECT id, name, created_at FROM workspace ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| Workspace {
                id: row.get("id"),
                name: row.get("name"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    /// Delete a workspace. Items, sessions, and turns cascade at the schema
    /// level.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM workspace WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("workspace {}", id)));
        }
        Ok(())
    }

    /// Check a workspace exists.
    pub async fn exists(&self, id: Uuid) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM workspace WHERE id = $1) AS found")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.get("found"))
    }
}
