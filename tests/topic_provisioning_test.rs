use async_trait::async_trait;
use metrics_reporter::application::reporting::topic_provisioner::{
    ConfigReconcile, PartitionReconcile, ProvisionOutcome, TopicProvisioner,
};
use metrics_reporter::domain::errors::AdminError;
use metrics_reporter::domain::ports::TopicAdmin;
use metrics_reporter::domain::topic::{
    AlterConfigOp, AlterOpType, CLEANUP_POLICY_CONFIG, CleanupPolicy, RETENTION_MS_CONFIG,
    TopicDescription, TopicDescriptor,
};
use metrics_reporter::infrastructure::mock::{AdminCall, InMemoryBroker};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const TOPIC: &str = "__BrokerMetrics";

fn descriptor(partitions: i32, retention: Duration) -> TopicDescriptor {
    TopicDescriptor::new(TOPIC, partitions, 1, retention, CleanupPolicy::Delete).unwrap()
}

fn hours(h: u64) -> Duration {
    Duration::from_secs(h * 60 * 60)
}

#[tokio::test]
async fn test_fresh_cluster_gets_topic_created_once() {
    let broker = InMemoryBroker::new();
    let provisioner = TopicProvisioner::new(Arc::new(broker.clone()), descriptor(3, hours(5)));

    let outcome = provisioner.provision().await;

    assert_eq!(outcome, ProvisionOutcome::Created);
    assert_eq!(broker.partition_count(TOPIC), Some(3));
    let config = broker.topic_config(TOPIC).unwrap();
    assert_eq!(config[RETENTION_MS_CONFIG], "18000000");
    assert_eq!(config[CLEANUP_POLICY_CONFIG], "delete");
    assert_eq!(broker.admin_calls(), vec![AdminCall::CreateTopic(TOPIC.to_string())]);
}

#[tokio::test]
async fn test_second_agent_reconciles_existing_topic() {
    let broker = InMemoryBroker::new();
    let first = TopicProvisioner::new(Arc::new(broker.clone()), descriptor(3, hours(5)));
    let second = TopicProvisioner::new(Arc::new(broker.clone()), descriptor(3, hours(5)));

    assert_eq!(first.provision().await, ProvisionOutcome::Created);
    let outcome = second.provision().await;

    assert_eq!(
        outcome,
        ProvisionOutcome::Reconciled {
            config: ConfigReconcile::Unchanged,
            partitions: PartitionReconcile::Unchanged { live: 3 },
        }
    );
    // Nothing to change, so no alter or increase request was sent
    let calls = broker.admin_calls();
    assert!(!calls.iter().any(|c| matches!(c, AdminCall::AlterConfig(..))));
    assert!(!calls.iter().any(|c| matches!(c, AdminCall::IncreasePartitions(..))));
}

#[tokio::test]
async fn test_retention_drift_is_fixed_with_a_single_alter() {
    let broker = InMemoryBroker::new().with_topic(
        TOPIC,
        3,
        &[(RETENTION_MS_CONFIG, "86400000"), (CLEANUP_POLICY_CONFIG, "delete")],
    );
    let provisioner = TopicProvisioner::new(Arc::new(broker.clone()), descriptor(3, hours(1)));

    let outcome = provisioner.provision().await;

    assert!(matches!(
        outcome,
        ProvisionOutcome::Reconciled {
            config: ConfigReconcile::Altered(ref keys),
            ..
        } if keys == &vec![RETENTION_MS_CONFIG.to_string()]
    ));
    let alters: Vec<Vec<AlterConfigOp>> = broker
        .admin_calls()
        .into_iter()
        .filter_map(|c| match c {
            AdminCall::AlterConfig(_, ops) => Some(ops),
            _ => None,
        })
        .collect();
    assert_eq!(alters.len(), 1);
    assert_eq!(alters[0].len(), 1);
    assert_eq!(alters[0][0].op, AlterOpType::Set);
    assert_eq!(alters[0][0].value, "3600000");
    assert_eq!(broker.topic_config(TOPIC).unwrap()[RETENTION_MS_CONFIG], "3600000");
}

#[tokio::test]
async fn test_missing_cleanup_policy_counts_as_drift() {
    let broker =
        InMemoryBroker::new().with_topic(TOPIC, 3, &[(RETENTION_MS_CONFIG, "18000000")]);
    let provisioner = TopicProvisioner::new(Arc::new(broker.clone()), descriptor(3, hours(5)));

    let config = provisioner.maybe_update_topic_config().await;

    assert_eq!(
        config,
        ConfigReconcile::Altered(vec![CLEANUP_POLICY_CONFIG.to_string()])
    );
}

#[tokio::test]
async fn test_partitions_grow_but_never_shrink() {
    let small = InMemoryBroker::new().with_topic(TOPIC, 2, &[]);
    let grow = TopicProvisioner::new(Arc::new(small.clone()), descriptor(6, hours(5)));
    assert_eq!(
        grow.maybe_increase_partition_count().await,
        PartitionReconcile::Increased { from: 2, to: 6 }
    );
    assert_eq!(small.partition_count(TOPIC), Some(6));

    let large = InMemoryBroker::new().with_topic(TOPIC, 12, &[]);
    let keep = TopicProvisioner::new(Arc::new(large.clone()), descriptor(6, hours(5)));
    assert_eq!(
        keep.maybe_increase_partition_count().await,
        PartitionReconcile::Unchanged { live: 12 }
    );
    assert_eq!(large.partition_count(TOPIC), Some(12));
}

#[tokio::test]
async fn test_unavailable_cluster_abandons_without_error() {
    let broker = InMemoryBroker::new();
    broker.fail_admin_with(Some(AdminError::Network {
        reason: "connection refused".to_string(),
    }));
    let provisioner = TopicProvisioner::new(Arc::new(broker.clone()), descriptor(3, hours(5)));

    assert_eq!(provisioner.provision().await, ProvisionOutcome::Abandoned);
    assert_eq!(broker.partition_count(TOPIC), None);
}

#[test]
fn test_invalid_descriptor_is_rejected_before_any_request() {
    assert!(TopicDescriptor::new(TOPIC, -1, 1, hours(5), CleanupPolicy::Delete).is_err());
    assert!(TopicDescriptor::new(TOPIC, 3, 0, hours(5), CleanupPolicy::Delete).is_err());
}

/// Admin whose config lookups never answer
struct StalledConfigAdmin {
    inner: InMemoryBroker,
}

#[async_trait]
impl TopicAdmin for StalledConfigAdmin {
    async fn create_topic(&self, descriptor: &TopicDescriptor) -> Result<(), AdminError> {
        self.inner.create_topic(descriptor).await
    }
    async fn describe_config(&self, _topic: &str) -> Result<HashMap<String, String>, AdminError> {
        std::future::pending().await
    }
    async fn alter_config(&self, topic: &str, ops: &[AlterConfigOp]) -> Result<(), AdminError> {
        self.inner.alter_config(topic, ops).await
    }
    async fn describe_topic(&self, topic: &str) -> Result<TopicDescription, AdminError> {
        self.inner.describe_topic(topic).await
    }
    async fn increase_partitions(&self, topic: &str, total: u32) -> Result<(), AdminError> {
        self.inner.increase_partitions(topic, total).await
    }
    async fn close(&self, timeout: Duration) -> Result<(), AdminError> {
        TopicAdmin::close(&self.inner, timeout).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_stalled_config_step_does_not_block_partition_step() {
    let broker = InMemoryBroker::new().with_topic(TOPIC, 1, &[]);
    let admin = StalledConfigAdmin {
        inner: broker.clone(),
    };
    let provisioner = TopicProvisioner::new(Arc::new(admin), descriptor(4, hours(5)))
        .with_request_timeout(Duration::from_secs(2));

    let outcome = provisioner.provision().await;

    assert_eq!(
        outcome,
        ProvisionOutcome::Reconciled {
            config: ConfigReconcile::Failed,
            partitions: PartitionReconcile::Increased { from: 1, to: 4 },
        }
    );
    assert_eq!(broker.partition_count(TOPIC), Some(4));
}

#[tokio::test]
async fn test_release_closes_admin_client() {
    let broker = InMemoryBroker::new();
    let provisioner = TopicProvisioner::new(Arc::new(broker.clone()), descriptor(1, hours(5)));

    tokio_test::assert_ok!(provisioner.create_topic().await);
    provisioner.release(Duration::from_secs(1)).await;

    assert_eq!(broker.admin_calls().last(), Some(&AdminCall::Close));
}
