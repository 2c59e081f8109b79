use std::sync::Arc;
use uuid::Uuid;

use crate::{database::RecordStore, errors::Result};

/// One repaired counter: the cached value disagreed with the sum of the
/// tenant's file sizes and was overwritten.
#[derive(Debug)]
pub struct Correction {
    pub user_id: Uuid,
    pub email: String,
    pub previous: i64,
    pub actual: i64,
}

/// Out-of-band consistency repair for the quota ledger.
///
/// Recomputes every tenant's true usage from the authoritative file records
/// and overwrites the cached counter where they differ. Runs without any
/// per-request lock, so drift observed during a concurrent mutation is
/// expected and will be caught on the next pass. Running it twice with no
/// intervening mutation reports nothing on the second pass.
pub struct Reconciler {
    store: Arc<dyn RecordStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn run(&self) -> Result<Vec<Correction>> {
        let users = self.store.list_users().await?;
        tracing::info!(tenants = users.len(), "starting storage usage reconciliation");

        let mut corrections = Vec::new();
        for user in users {
            // A failure for one tenant is logged and skipped; the batch
            // continues with the rest.
            let actual = match self.store.sum_file_sizes(user.id).await {
                Ok(total) => total,
                Err(e) => {
                    tracing::warn!(
                        user_id = %user.id,
                        email = %user.email,
                        error = %e,
                        "could not compute true usage, skipping tenant"
                    );
                    continue;
                }
            };

            if actual == user.bytes_used {
                continue;
            }

            if let Err(e) = self.store.set_bytes_used(user.id, actual).await {
                tracing::warn!(
                    user_id = %user.id,
                    email = %user.email,
                    error = %e,
                    "could not write corrected usage, skipping tenant"
                );
                continue;
            }

            tracing::info!(
                user_id = %user.id,
                email = %user.email,
                previous = user.bytes_used,
                actual,
                "corrected bytes_used drift"
            );
            corrections.push(Correction {
                user_id: user.id,
                email: user.email,
                previous: user.bytes_used,
                actual,
            });
        }

        Ok(corrections)
    }
}
