//! Postgres-backed `resource_versions` table (§6), implementing
//! [`oms_occ::VersionStore`] — the OCC ledger that is the actual
//! source of truth for parent-commit validation (§4.5).

use oms_occ::version::{ResourceVersion, VersionStore};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::warn;

pub enum VersionRepo {
    Postgres(PgPool),
    #[cfg(feature = "mock")]
    Mock(std::sync::Arc<oms_occ::version::InMemoryVersionStore>),
}

impl VersionRepo {
    pub fn new(pool: PgPool) -> Self {
        Self::Postgres(pool)
    }

    #[cfg(feature = "mock")]
    pub fn new_mock() -> Self {
        Self::Mock(std::sync::Arc::new(oms_occ::version::InMemoryVersionStore::new()))
    }
}

#[async_trait::async_trait]
impl VersionStore for VersionRepo {
    async fn head(&self, resource_type: &str, resource_id: &str) -> Option<ResourceVersion> {
        match self {
            Self::Postgres(pool) => {
                let row: Option<(Json<ResourceVersion>,)> = sqlx::query_as(
                    "SELECT data FROM resource_versions WHERE resource_type = $1 AND resource_id = $2 ORDER BY version DESC LIMIT 1",
                )
                .bind(resource_type)
                .bind(resource_id)
                .fetch_optional(pool)
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "resource_versions head query failed");
                    None
                });
                row.map(|(Json(v),)| v)
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.head(resource_type, resource_id).await,
        }
    }

    async fn append(&self, row: ResourceVersion) {
        match self {
            Self::Postgres(pool) => {
                let _ = sqlx::query(
                    "INSERT INTO resource_versions (resource_type, resource_id, version, data, created_at) VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(&row.resource_type)
                .bind(&row.resource_id)
                .bind(row.version)
                .bind(Json(&row))
                .bind(row.created_at)
                .execute(pool)
                .await
                .map_err(|e| warn!(error = %e, "resource_versions append failed"));
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.append(row).await,
        }
    }

    async fn history(&self, resource_type: &str, resource_id: &str) -> Vec<ResourceVersion> {
        match self {
            Self::Postgres(pool) => {
                let rows: Vec<(Json<ResourceVersion>,)> = sqlx::query_as(
                    "SELECT data FROM resource_versions WHERE resource_type = $1 AND resource_id = $2 ORDER BY version ASC",
                )
                .bind(resource_type)
                .bind(resource_id)
                .fetch_all(pool)
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "resource_versions history query failed");
                    Vec::new()
                });
                rows.into_iter().map(|(Json(v),)| v).collect()
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.history(resource_type, resource_id).await,
        }
    }
}
