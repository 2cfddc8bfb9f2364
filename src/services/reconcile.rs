//! Usage Reconciler — restores the cached usage counter to backend truth.
//!
//! Drift accumulates from length-unknown uploads, write confirmations that
//! never landed, counter races, and objects touched outside this gateway.
//! Reconciliation fully enumerates the remote bucket and overwrites the
//! counter; it is O(object count) and meant to be an explicit, caller-paid
//! maintenance operation, not a per-request check.

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::GatewayResult;
use crate::models::bucket::Bucket;
use crate::remote::objects::RemoteObjectClient;
use crate::services::quota::QuotaLedger;

const RECONCILE_PAGE_SIZE: usize = 1000;

#[derive(Debug, Serialize)]
pub struct ReconcileOutcome {
    pub bucket_id: Uuid,
    pub previous_bytes: i64,
    pub actual_bytes: i64,
    pub delta_bytes: i64,
}

#[derive(Clone)]
pub struct UsageReconciler {
    ledger: QuotaLedger,
    objects: RemoteObjectClient,
}

impl UsageReconciler {
    pub fn new(ledger: QuotaLedger, objects: RemoteObjectClient) -> Self {
        Self { ledger, objects }
    }

    /// Enumerate every remote object, sum the reported sizes, and overwrite
    /// the local counter with the result.
    pub async fn reconcile(&self, bucket: &Bucket) -> GatewayResult<ReconcileOutcome> {
        let previous = self.ledger.get_quota(bucket.id).await?.usage_bytes;

        let mut actual: i64 = 0;
        let mut token: Option<String> = None;
        let mut pages = 0u32;
        loop {
            let page = self
                .objects
                .list_objects(
                    &bucket.backend_name,
                    None,
                    RECONCILE_PAGE_SIZE,
                    token.as_deref(),
                )
                .await?;
            actual += page.objects.iter().map(|obj| obj.size).sum::<i64>();
            pages += 1;

            match (page.is_truncated, page.next_token) {
                (true, Some(next)) => token = Some(next),
                _ => break,
            }
        }
        debug!("reconcile walked {} page(s) of {}", pages, bucket.backend_name);

        self.ledger.set_usage(bucket.id, actual).await?;
        info!(
            "reconciled bucket {}: usage {} -> {}",
            bucket.id, previous, actual
        );

        Ok(ReconcileOutcome {
            bucket_id: bucket.id,
            previous_bytes: previous,
            actual_bytes: actual,
            delta_bytes: actual - previous,
        })
    }
}
