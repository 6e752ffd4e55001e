//! In-memory broker implementing both the admin and the producer ports.
//!
//! Used by the demo binary and by tests. Deliveries are resolved on `flush`, which is
//! also where injected send failures are reported.

use crate::config::{BOOTSTRAP_SERVERS, CLIENT_ID, ProducerEnvConfig};
use crate::domain::errors::{AdminError, PublishError};
use crate::domain::ports::{
    BrokerClientFactory, DeliveryCallback, ProducerRecord, RecordMetadata, RecordProducer,
    TopicAdmin,
};
use crate::domain::topic::{AlterConfigOp, AlterOpType, TopicDescription, TopicDescriptor};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

/// Administrative request received by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCall {
    CreateTopic(String),
    DescribeConfig(String),
    AlterConfig(String, Vec<AlterConfigOp>),
    DescribeTopic(String),
    IncreasePartitions(String, u32),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    Producer,
    Admin,
}

/// Client that connected to the broker, with the settings it was built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConnection {
    pub kind: ClientKind,
    pub client_id: String,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
struct TopicState {
    partitions: u32,
    replication_factor: u16,
    configs: HashMap<String, String>,
    records: Vec<ProducerRecord>,
}

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, TopicState>,
    pending: Vec<(ProducerRecord, DeliveryCallback)>,
    fail_next_sends: usize,
    admin_failure: Option<AdminError>,
    admin_calls: Vec<AdminCall>,
    connections: Vec<ClientConnection>,
    producer_closed: bool,
}

#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a topic as if another agent or an operator had created it.
    pub fn with_topic(self, name: &str, partitions: u32, configs: &[(&str, &str)]) -> Self {
        self.state().topics.insert(
            name.to_string(),
            TopicState {
                partitions,
                replication_factor: 1,
                configs: configs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                records: Vec::new(),
            },
        );
        self
    }

    /// The next `count` deliveries fail.
    pub fn fail_next_sends(&self, count: usize) {
        self.state().fail_next_sends = count;
    }

    /// Every admin request fails with `error` until cleared with `None`.
    pub fn fail_admin_with(&self, error: Option<AdminError>) {
        self.state().admin_failure = error;
    }

    pub fn admin_calls(&self) -> Vec<AdminCall> {
        self.state().admin_calls.clone()
    }

    pub fn records(&self, topic: &str) -> Vec<ProducerRecord> {
        self.state()
            .topics
            .get(topic)
            .map(|t| t.records.clone())
            .unwrap_or_default()
    }

    pub fn topic_config(&self, topic: &str) -> Option<HashMap<String, String>> {
        self.state().topics.get(topic).map(|t| t.configs.clone())
    }

    pub fn partition_count(&self, topic: &str) -> Option<u32> {
        self.state().topics.get(topic).map(|t| t.partitions)
    }

    pub fn replication_factor(&self, topic: &str) -> Option<u16> {
        self.state().topics.get(topic).map(|t| t.replication_factor)
    }

    pub fn connections(&self) -> Vec<ClientConnection> {
        self.state().connections.clone()
    }

    pub fn pending_sends(&self) -> usize {
        self.state().pending.len()
    }

    pub fn producer_closed(&self) -> bool {
        self.state().producer_closed
    }

    fn connect(&self, kind: ClientKind, config: &ProducerEnvConfig) -> Result<(), String> {
        if config.get(BOOTSTRAP_SERVERS).is_none() {
            return Err(format!("{} is not set", BOOTSTRAP_SERVERS));
        }
        let client_id = config
            .get(CLIENT_ID)
            .ok_or_else(|| format!("{} is not set", CLIENT_ID))?;
        info!("InMemoryBroker: {:?} client {} connected", kind, client_id);
        self.state().connections.push(ClientConnection {
            kind,
            client_id: client_id.to_string(),
            properties: config.properties().clone(),
        });
        Ok(())
    }

    fn admin_request(&self, call: AdminCall) -> Result<MutexGuard<'_, BrokerState>, AdminError> {
        let mut state = self.state();
        state.admin_calls.push(call);
        match state.admin_failure.clone() {
            Some(error) => Err(error),
            None => Ok(state),
        }
    }

    fn deliver_pending(&self) {
        let outcomes: Vec<(DeliveryCallback, Result<RecordMetadata, PublishError>)> = {
            let mut state = self.state();
            let pending: Vec<_> = state.pending.drain(..).collect();
            pending
                .into_iter()
                .map(|(record, callback)| {
                    let outcome = Self::append(&mut state, record);
                    (callback, outcome)
                })
                .collect()
        };
        // Callbacks run without the broker lock held
        for (callback, outcome) in outcomes {
            callback(outcome);
        }
    }

    fn append(
        state: &mut BrokerState,
        record: ProducerRecord,
    ) -> Result<RecordMetadata, PublishError> {
        if state.fail_next_sends > 0 {
            state.fail_next_sends -= 1;
            return Err(PublishError::Delivery {
                topic: record.topic,
                reason: "injected failure".to_string(),
            });
        }
        let Some(topic) = state.topics.get_mut(&record.topic) else {
            return Err(PublishError::Delivery {
                reason: "unknown topic".to_string(),
                topic: record.topic,
            });
        };
        let mut hasher = DefaultHasher::new();
        record.key.hash(&mut hasher);
        let partition = (hasher.finish() % u64::from(topic.partitions.max(1))) as u32;
        let metadata = RecordMetadata {
            topic: record.topic.clone(),
            partition,
            offset: topic.records.len() as u64,
        };
        topic.records.push(record);
        Ok(metadata)
    }
}

impl BrokerClientFactory for InMemoryBroker {
    fn producer(
        &self,
        config: &ProducerEnvConfig,
    ) -> Result<Arc<dyn RecordProducer>, PublishError> {
        self.connect(ClientKind::Producer, config)
            .map_err(|reason| PublishError::Configuration { reason })?;
        Ok(Arc::new(self.clone()))
    }

    fn admin(&self, config: &ProducerEnvConfig) -> Result<Arc<dyn TopicAdmin>, AdminError> {
        self.connect(ClientKind::Admin, config)
            .map_err(|reason| AdminError::InvalidRequest { reason })?;
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl TopicAdmin for InMemoryBroker {
    async fn create_topic(&self, descriptor: &TopicDescriptor) -> Result<(), AdminError> {
        let mut state = self.admin_request(AdminCall::CreateTopic(descriptor.name().to_string()))?;
        if state.topics.contains_key(descriptor.name()) {
            return Err(AdminError::TopicExists {
                topic: descriptor.name().to_string(),
            });
        }
        state.topics.insert(
            descriptor.name().to_string(),
            TopicState {
                partitions: descriptor.partitions(),
                replication_factor: descriptor.replication_factor(),
                configs: descriptor.configs(),
                records: Vec::new(),
            },
        );
        info!("InMemoryBroker: created topic {}", descriptor.name());
        Ok(())
    }

    async fn describe_config(&self, topic: &str) -> Result<HashMap<String, String>, AdminError> {
        let state = self.admin_request(AdminCall::DescribeConfig(topic.to_string()))?;
        state
            .topics
            .get(topic)
            .map(|t| t.configs.clone())
            .ok_or_else(|| AdminError::UnknownTopic {
                topic: topic.to_string(),
            })
    }

    async fn alter_config(&self, topic: &str, ops: &[AlterConfigOp]) -> Result<(), AdminError> {
        let mut state =
            self.admin_request(AdminCall::AlterConfig(topic.to_string(), ops.to_vec()))?;
        let topic_state = state
            .topics
            .get_mut(topic)
            .ok_or_else(|| AdminError::UnknownTopic {
                topic: topic.to_string(),
            })?;
        for op in ops {
            match op.op {
                AlterOpType::Set => {
                    topic_state.configs.insert(op.key.clone(), op.value.clone());
                }
                AlterOpType::Delete => {
                    topic_state.configs.remove(&op.key);
                }
            }
        }
        Ok(())
    }

    async fn describe_topic(&self, topic: &str) -> Result<TopicDescription, AdminError> {
        let state = self.admin_request(AdminCall::DescribeTopic(topic.to_string()))?;
        state
            .topics
            .get(topic)
            .map(|t| TopicDescription {
                name: topic.to_string(),
                partitions: t.partitions,
            })
            .ok_or_else(|| AdminError::UnknownTopic {
                topic: topic.to_string(),
            })
    }

    async fn increase_partitions(&self, topic: &str, total: u32) -> Result<(), AdminError> {
        let mut state =
            self.admin_request(AdminCall::IncreasePartitions(topic.to_string(), total))?;
        let topic_state = state
            .topics
            .get_mut(topic)
            .ok_or_else(|| AdminError::UnknownTopic {
                topic: topic.to_string(),
            })?;
        if total < topic_state.partitions {
            return Err(AdminError::InvalidRequest {
                reason: format!(
                    "topic {} has {} partitions, cannot shrink to {}",
                    topic, topic_state.partitions, total
                ),
            });
        }
        topic_state.partitions = total;
        Ok(())
    }

    async fn close(&self, _timeout: Duration) -> Result<(), AdminError> {
        self.state().admin_calls.push(AdminCall::Close);
        Ok(())
    }
}

#[async_trait]
impl RecordProducer for InMemoryBroker {
    fn send(
        &self,
        record: ProducerRecord,
        on_complete: DeliveryCallback,
    ) -> Result<(), PublishError> {
        let mut state = self.state();
        if state.producer_closed {
            return Err(PublishError::Closed);
        }
        state.pending.push((record, on_complete));
        Ok(())
    }

    async fn flush(&self) -> Result<(), PublishError> {
        self.deliver_pending();
        Ok(())
    }

    async fn close(&self, _timeout: Duration) -> Result<(), PublishError> {
        self.deliver_pending();
        self.state().producer_closed = true;
        debug!("InMemoryBroker: producer closed");
        Ok(())
    }
}
