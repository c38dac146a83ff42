use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::{Mutex, Notify};

use crate::models::{Mission, MissionResult};

/// Named-list broker. Producers push to the head, consumers block on the tail,
/// so each list drains in FIFO order.
#[async_trait]
pub trait QueueBroker: Send + Sync {
    async fn push(&self, queue: &str, payload: String) -> Result<(), QueueError>;

    /// Wait until `queue` has an item and remove it from the tail.
    async fn blocking_pop(&self, queue: &str) -> Result<String, QueueError>;

    async fn depth(&self, queue: &str) -> Result<u64, QueueError>;

    async fn health_check(&self) -> Result<(), QueueError>;
}

/// Redis lists via LPUSH / BRPOP.
pub struct RedisBroker {
    client: redis::Client,
}

impl RedisBroker {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl QueueBroker for RedisBroker {
    async fn push(&self, queue: &str, payload: String) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        conn.lpush::<_, _, ()>(queue, payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn blocking_pop(&self, queue: &str) -> Result<String, QueueError> {
        // A dedicated connection: BRPOP holds it until an item arrives.
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        loop {
            let popped: Option<(String, String)> = conn
                .brpop(queue, 0.0)
                .await
                .map_err(QueueError::Redis)?;
            if let Some((_, payload)) = popped {
                return Ok(payload);
            }
        }
    }

    async fn depth(&self, queue: &str) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let depth: u64 = conn.llen(queue).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}

/// In-process broker with the same list semantics as Redis.
///
/// Suitable for a single process hosting both the dispatch server and its
/// workers, and for tests.
#[derive(Default)]
pub struct MemoryBroker {
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    pushed: Notify,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueBroker for MemoryBroker {
    async fn push(&self, queue: &str, payload: String) -> Result<(), QueueError> {
        self.lists
            .lock()
            .await
            .entry(queue.to_string())
            .or_default()
            .push_front(payload);
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn blocking_pop(&self, queue: &str) -> Result<String, QueueError> {
        loop {
            // Register interest before checking so a concurrent push is not missed.
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(payload) = self
                .lists
                .lock()
                .await
                .get_mut(queue)
                .and_then(VecDeque::pop_back)
            {
                return Ok(payload);
            }

            notified.await;
        }
    }

    async fn depth(&self, queue: &str) -> Result<u64, QueueError> {
        let lists = self.lists.lock().await;
        Ok(lists.get(queue).map_or(0, |l| l.len() as u64))
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

/// Typed access to the mission (task) and result queues.
pub struct JobQueue {
    broker: Arc<dyn QueueBroker>,
    task_queue: String,
    result_queue: String,
}

impl JobQueue {
    pub fn new(
        broker: Arc<dyn QueueBroker>,
        task_queue: impl Into<String>,
        result_queue: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            task_queue: task_queue.into(),
            result_queue: result_queue.into(),
        }
    }

    /// Enqueue an accepted mission for the workers.
    pub async fn enqueue_mission(&self, mission: &Mission) -> Result<(), QueueError> {
        let payload = serde_json::to_string(mission).map_err(QueueError::Serialize)?;
        self.broker.push(&self.task_queue, payload).await
    }

    /// Block until a mission is available.
    ///
    /// A payload that is not a valid mission is consumed and reported as
    /// `QueueError::Serialize`.
    pub async fn next_mission(&self) -> Result<Mission, QueueError> {
        let payload = self.broker.blocking_pop(&self.task_queue).await?;
        serde_json::from_str(&payload).map_err(QueueError::Serialize)
    }

    pub async fn push_result(&self, result: &MissionResult) -> Result<(), QueueError> {
        let payload = serde_json::to_string(result).map_err(QueueError::Serialize)?;
        self.broker.push(&self.result_queue, payload).await
    }

    pub async fn next_result(&self) -> Result<MissionResult, QueueError> {
        let payload = self.broker.blocking_pop(&self.result_queue).await?;
        serde_json::from_str(&payload).map_err(QueueError::Serialize)
    }

    /// Pending missions not yet picked up by a worker.
    pub async fn queue_depth(&self) -> Result<u64, QueueError> {
        self.broker.depth(&self.task_queue).await
    }

    pub async fn health_check(&self) -> Result<(), QueueError> {
        self.broker.health_check().await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_memory_broker_is_fifo() {
        let broker = MemoryBroker::new();
        broker.push("q", "a".to_string()).await.unwrap();
        broker.push("q", "b".to_string()).await.unwrap();
        assert_eq!(broker.depth("q").await.unwrap(), 2);
        assert_eq!(broker.blocking_pop("q").await.unwrap(), "a");
        assert_eq!(broker.blocking_pop("q").await.unwrap(), "b");
        assert_eq!(broker.depth("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_blocking_pop_waits_for_push() {
        let broker = Arc::new(MemoryBroker::new());
        let waiter = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.blocking_pop("q").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        broker.push("other", "x".to_string()).await.unwrap();
        broker.push("q", "y".to_string()).await.unwrap();
        let popped = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(popped, "y");
    }

    #[tokio::test]
    async fn test_malformed_mission_payload() {
        let broker = Arc::new(MemoryBroker::new());
        broker.push("tasks", "{not json".to_string()).await.unwrap();
        let queue = JobQueue::new(broker, "tasks", "results");
        assert!(matches!(queue.next_mission().await, Err(QueueError::Serialize(_))));
    }
}
