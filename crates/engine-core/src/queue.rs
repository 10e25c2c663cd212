use model::records::batch::Batch;
use std::sync::Arc;
use tokio::sync::{
    Mutex,
    mpsc::{self, error::TrySendError},
};

/// Unit of work handed from readers to writers.
#[derive(Debug)]
pub enum Task {
    Batch(Batch),
    /// Tells the writer that pulls it to exit its loop.
    Stop,
}

#[derive(Debug, thiserror::Error)]
#[error("task queue is closed")]
pub struct QueueClosed;

/// Bounded multi-producer, multi-consumer FIFO of [`Task`]s.
///
/// Producers block on `push` while the queue is full. Consumers take turns
/// on the receiving end, so each task is delivered to exactly one writer.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    tx: mpsc::Sender<Task>,
    rx: Arc<Mutex<mpsc::Receiver<Task>>>,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    pub async fn push(&self, task: Task) -> Result<(), QueueClosed> {
        self.tx.send(task).await.map_err(|_| QueueClosed)
    }

    /// Enqueues without waiting. Returns false if the queue is full.
    pub fn try_push(&self, task: Task) -> bool {
        match self.tx.try_send(task) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Waits for the next task. `None` only if every sender is gone, which
    /// cannot happen while this handle is alive.
    pub async fn pull(&self) -> Option<Task> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes whatever is still queued and returns how many batches were
    /// among it. Stop sentinels are discarded silently.
    pub async fn drain(&self) -> usize {
        let mut rx = self.rx.lock().await;
        let mut batches = 0;
        while let Ok(task) = rx.try_recv() {
            if matches!(task, Task::Batch(_)) {
                batches += 1;
            }
        }
        batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::core::table::TableRef;

    fn batch(n: usize) -> Task {
        let rows = (0..n)
            .map(|i| {
                let mut r = serde_json::Map::new();
                r.insert("id".into(), i.into());
                r
            })
            .collect();
        Task::Batch(Batch::new(format!("b{n}"), TableRef::new("db", "t"), rows, n * 8))
    }

    #[tokio::test]
    async fn delivers_in_push_order() {
        let queue = TaskQueue::new(4);
        queue.push(batch(1)).await.unwrap();
        queue.push(batch(2)).await.unwrap();
        queue.push(Task::Stop).await.unwrap();
        assert_eq!(queue.len(), 3);

        assert!(matches!(queue.pull().await, Some(Task::Batch(b)) if b.len() == 1));
        assert!(matches!(queue.pull().await, Some(Task::Batch(b)) if b.len() == 2));
        assert!(matches!(queue.pull().await, Some(Task::Stop)));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn try_push_refuses_when_full() {
        let queue = TaskQueue::new(1);
        assert!(queue.try_push(Task::Stop));
        assert!(!queue.try_push(Task::Stop));
    }

    #[tokio::test]
    async fn each_task_goes_to_one_consumer() {
        let queue = TaskQueue::new(16);
        for i in 0..10 {
            queue.push(batch(i + 1)).await.unwrap();
        }
        for _ in 0..3 {
            queue.push(Task::Stop).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..3 {
            let q = queue.clone();
            handles.push(tokio::spawn(async move {
                let mut seen = 0usize;
                while let Some(Task::Batch(b)) = q.pull().await {
                    seen += b.len();
                }
                seen
            }));
        }

        let mut total = 0;
        for h in handles {
            total += h.await.unwrap();
        }
        assert_eq!(total, (1..=10).sum::<usize>());
    }

    #[tokio::test]
    async fn drain_counts_leftover_batches() {
        let queue = TaskQueue::new(8);
        queue.push(batch(1)).await.unwrap();
        queue.push(Task::Stop).await.unwrap();
        queue.push(batch(3)).await.unwrap();
        assert_eq!(queue.drain().await, 2);
        assert!(queue.is_empty());
    }
}
