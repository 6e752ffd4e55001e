use crate::domain::errors::AdminError;
use crate::domain::ports::TopicAdmin;
use crate::domain::topic::TopicDescriptor;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const CLIENT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const ADMIN_CLIENT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of the config reconciliation step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigReconcile {
    Unchanged,
    /// Keys that were altered
    Altered(Vec<String>),
    Failed,
}

/// Result of the partition reconciliation step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionReconcile {
    Unchanged { live: u32 },
    Increased { from: u32, to: u32 },
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Created,
    Reconciled {
        config: ConfigReconcile,
        partitions: PartitionReconcile,
    },
    /// Creation failed for a reason other than the topic already existing
    Abandoned,
}

/// Creates the metrics topic, or brings an existing one in line with the descriptor.
///
/// Every request is idempotent so that agents on different nodes may run this
/// concurrently: creation on an existing topic falls through to reconciliation, config
/// changes are computed as a diff, and the partition count only ever grows.
pub struct TopicProvisioner {
    admin: Arc<dyn TopicAdmin>,
    descriptor: TopicDescriptor,
    request_timeout: Duration,
}

impl TopicProvisioner {
    pub fn new(admin: Arc<dyn TopicAdmin>, descriptor: TopicDescriptor) -> Self {
        Self {
            admin,
            descriptor,
            request_timeout: CLIENT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn descriptor(&self) -> &TopicDescriptor {
        &self.descriptor
    }

    /// Create-then-reconcile. Never fails; problems are logged and reflected in the outcome.
    pub async fn provision(&self) -> ProvisionOutcome {
        match self.create_topic().await {
            Ok(()) => ProvisionOutcome::Created,
            Err(AdminError::TopicExists { .. }) => {
                debug!(
                    "Metrics topic {} already exists, reconciling its configuration.",
                    self.descriptor.name()
                );
                let (config, partitions) = self.reconcile().await;
                ProvisionOutcome::Reconciled { config, partitions }
            }
            Err(e) => {
                warn!(
                    "Unable to create metrics topic {}: {}",
                    self.descriptor.name(),
                    e
                );
                ProvisionOutcome::Abandoned
            }
        }
    }

    pub async fn create_topic(&self) -> Result<(), AdminError> {
        self.bounded(self.admin.create_topic(&self.descriptor)).await?;
        info!(
            "Metrics topic {} is created with {} partitions (replication factor {}).",
            self.descriptor.name(),
            self.descriptor.partitions(),
            self.descriptor.replication_factor()
        );
        Ok(())
    }

    /// Runs both best-effort reconciliation steps; a failing step does not stop the other.
    pub async fn reconcile(&self) -> (ConfigReconcile, PartitionReconcile) {
        let config = self.maybe_update_topic_config().await;
        let partitions = self.maybe_increase_partition_count().await;
        (config, partitions)
    }

    pub async fn maybe_update_topic_config(&self) -> ConfigReconcile {
        let topic = self.descriptor.name();
        let live = match self.bounded(self.admin.describe_config(topic)).await {
            Ok(live) => live,
            Err(e) => {
                warn!("Unable to describe config of metrics topic {}: {}", topic, e);
                return ConfigReconcile::Failed;
            }
        };

        let ops = self.descriptor.config_diff(&live);
        if ops.is_empty() {
            debug!("Config of metrics topic {} is up to date.", topic);
            return ConfigReconcile::Unchanged;
        }

        let keys: Vec<String> = ops.iter().map(|op| op.key.clone()).collect();
        match self.bounded(self.admin.alter_config(topic, &ops)).await {
            Ok(()) => {
                info!("Updated config of metrics topic {}: {:?}", topic, keys);
                ConfigReconcile::Altered(keys)
            }
            Err(e) => {
                warn!("Unable to update config of metrics topic {}: {}", topic, e);
                ConfigReconcile::Failed
            }
        }
    }

    pub async fn maybe_increase_partition_count(&self) -> PartitionReconcile {
        let topic = self.descriptor.name();
        let desired = self.descriptor.partitions();
        let description = match self.bounded(self.admin.describe_topic(topic)).await {
            Ok(description) => description,
            Err(e) => {
                warn!(
                    "Unable to increase metrics topic {} partition count to {}: {}",
                    topic, desired, e
                );
                return PartitionReconcile::Failed;
            }
        };

        if description.partitions >= desired {
            return PartitionReconcile::Unchanged {
                live: description.partitions,
            };
        }

        match self
            .bounded(self.admin.increase_partitions(topic, desired))
            .await
        {
            Ok(()) => {
                info!(
                    "Increased metrics topic {} partition count from {} to {}.",
                    topic, description.partitions, desired
                );
                PartitionReconcile::Increased {
                    from: description.partitions,
                    to: desired,
                }
            }
            Err(e) => {
                warn!(
                    "Unable to increase metrics topic {} partition count to {}: {}",
                    topic, desired, e
                );
                PartitionReconcile::Failed
            }
        }
    }

    /// Releases the admin client; a slow close is logged and otherwise ignored.
    pub async fn release(&self, timeout: Duration) {
        match tokio::time::timeout(timeout, self.admin.close(timeout)).await {
            Ok(Ok(())) => debug!("Admin client closed."),
            Ok(Err(e)) => warn!("Failed to close admin client: {}", e),
            Err(_) => warn!("Admin client did not close within {:?}", timeout),
        }
    }

    async fn bounded<T, F>(&self, request: F) -> Result<T, AdminError>
    where
        F: Future<Output = Result<T, AdminError>>,
    {
        tokio::time::timeout(self.request_timeout, request)
            .await
            .map_err(|_| AdminError::Timeout {
                timeout: self.request_timeout,
            })?
    }
}
