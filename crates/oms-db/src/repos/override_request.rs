//! Postgres-backed `override_requests` table (§6), implementing
//! [`oms_policy::OverrideStore`] for the emergency-override workflow
//! (§4.7).

use async_trait::async_trait;
use oms_policy::override_request::{OverrideRequest, OverrideStore};
use oms_types::OverrideId;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::warn;

pub enum OverrideRepo {
    Postgres(PgPool),
    #[cfg(feature = "mock")]
    Mock(std::sync::Arc<oms_policy::override_request::InMemoryOverrideStore>),
}

impl OverrideRepo {
    pub fn new(pool: PgPool) -> Self {
        Self::Postgres(pool)
    }

    #[cfg(feature = "mock")]
    pub fn new_mock() -> Self {
        Self::Mock(std::sync::Arc::new(oms_policy::override_request::InMemoryOverrideStore::new()))
    }
}

#[async_trait]
impl OverrideStore for OverrideRepo {
    async fn get(&self, id: OverrideId) -> Option<OverrideRequest> {
        match self {
            Self::Postgres(pool) => {
                let row: Option<(Json<OverrideRequest>,)> = sqlx::query_as("SELECT data FROM override_requests WHERE id = $1")
                    .bind(id.to_string())
                    .fetch_optional(pool)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "override_requests get failed");
                        None
                    });
                row.map(|(Json(r),)| r)
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.get(id).await,
        }
    }

    async fn put(&self, request: OverrideRequest) {
        match self {
            Self::Postgres(pool) => {
                let _ = sqlx::query(
                    "INSERT INTO override_requests (id, branch, status, data, created_at) VALUES ($1, $2, $3, $4, now())
                     ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status, data = EXCLUDED.data",
                )
                .bind(request.id.to_string())
                .bind(&request.branch)
                .bind(format!("{:?}", request.status))
                .bind(Json(&request))
                .execute(pool)
                .await
                .map_err(|e| warn!(error = %e, "override_requests put failed"));
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.put(request).await,
        }
    }

    async fn find_active_for(&self, resource: &str, action: &str, branch: &str, token: &str) -> Option<OverrideRequest> {
        match self {
            Self::Postgres(pool) => {
                let rows: Vec<(Json<OverrideRequest>,)> = sqlx::query_as(
                    "SELECT data FROM override_requests WHERE branch = $1 AND status = 'Approved'",
                )
                .bind(branch)
                .fetch_all(pool)
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "override_requests find_active_for query failed");
                    Vec::new()
                });
                let now = chrono::Utc::now();
                rows.into_iter()
                    .map(|(Json(r),)| r)
                    .find(|r| r.resource == resource && r.action == action && r.override_token.as_deref() == Some(token) && r.is_live(now))
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.find_active_for(resource, action, branch, token).await,
        }
    }
}
