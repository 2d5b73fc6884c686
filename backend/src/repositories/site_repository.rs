//! Database repository for sites and site permissions.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::database::models::Site;

pub struct SiteRepository<'a> {
    /// Shared SQLite connection pool
    pool: &'a SqlitePool,
}

impl<'a> SiteRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    #[cfg(test)]
    pub async fn create_site(&self, slug: &str, title: &str) -> Result<Site> {
        let site = sqlx::query_as::<_, Site>(
            "INSERT INTO sites (slug, title) VALUES (?, ?) RETURNING id, slug, title",
        )
        .bind(slug)
        .bind(title)
        .fetch_one(self.pool)
        .await?;

        Ok(site)
    }

    pub async fn get_site_by_id(&self, id: i64) -> Result<Option<Site>> {
        let site = sqlx::query_as::<_, Site>("SELECT id, slug, title FROM sites WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(site)
    }

    pub async fn get_site_by_slug(&self, slug: &str) -> Result<Option<Site>> {
        let site = sqlx::query_as::<_, Site>("SELECT id, slug, title FROM sites WHERE slug = ?")
            .bind(slug)
            .fetch_optional(self.pool)
            .await?;

        Ok(site)
    }

    /// Resolves a site reference given either as a numeric id or a slug.
    pub async fn find_site(&self, reference: &str) -> Result<Option<Site>> {
        match reference.parse::<i64>() {
            Ok(id) => self.get_site_by_id(id).await,
            Err(_) => self.get_site_by_slug(reference).await,
        }
    }

    /// Grants a role on a site, replacing any previous role of the user there.
    pub async fn grant_permission(&self, site_id: i64, user_id: &str, role: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO site_permissions (site_id, user_id, role)
            VALUES (?, ?, ?)
            ON CONFLICT (site_id, user_id) DO UPDATE SET role = excluded.role
            "#,
        )
        .bind(site_id)
        .bind(user_id)
        .bind(role)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Sites on which the user holds any permission.
    pub async fn get_user_sites(&self, user_id: &str) -> Result<Vec<Site>> {
        let sites = sqlx::query_as::<_, Site>(
            r#"
            SELECT s.id, s.slug, s.title
            FROM sites s
            JOIN site_permissions p ON p.site_id = s.id
            WHERE p.user_id = ?
            ORDER BY s.id
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(sites)
    }

    #[cfg(test)]
    pub async fn get_permission_role(&self, site_id: i64, user_id: &str) -> Result<Option<String>> {
        let role = sqlx::query_scalar::<_, String>(
            "SELECT role FROM site_permissions WHERE site_id = ? AND user_id = ?",
        )
        .bind(site_id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(role)
    }
}
