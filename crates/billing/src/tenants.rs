//! Tenant resolution
//!
//! Maps the external identifiers carried by an event to an internal tenant
//! row. Resolution order: explicit `tenant_id` in event metadata, then
//! lookup by Stripe customer id. A miss is a valid outcome; the caller
//! decides whether it is retryable.

use std::collections::HashMap;

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::BillingResult;

pub struct TenantResolver {
    pool: PgPool,
}

impl TenantResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolve an event to a tenant id via metadata, then customer id
    pub async fn resolve(
        &self,
        metadata: &HashMap<String, String>,
        customer_id: Option<&str>,
    ) -> BillingResult<Option<Uuid>> {
        if let Some(raw) = metadata.get("tenant_id") {
            match Uuid::parse_str(raw) {
                Ok(tenant_id) => {
                    let exists: Option<(Uuid,)> =
                        sqlx::query_as("SELECT id FROM tenants WHERE id = $1")
                            .bind(tenant_id)
                            .fetch_optional(&self.pool)
                            .await?;
                    if let Some((id,)) = exists {
                        return Ok(Some(id));
                    }
                    tracing::warn!(
                        tenant_id = %tenant_id,
                        "Event metadata names a tenant that does not exist, falling back to customer lookup"
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        raw = %raw,
                        "Event metadata carries an unparseable tenant_id, falling back to customer lookup"
                    );
                }
            }
        }

        match customer_id {
            Some(customer_id) => self.resolve_customer(customer_id).await,
            None => Ok(None),
        }
    }

    /// Look up a tenant by its linked Stripe customer id
    pub async fn resolve_customer(&self, customer_id: &str) -> BillingResult<Option<Uuid>> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM tenants WHERE stripe_customer_id = $1")
                .bind(customer_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id,)| id))
    }
}
