//! Test utilities and mock implementations.
//!
//! Recording handlers and scripted subscriptions for exercising the
//! watcher, publisher and consumer without a broker.

use std::collections::VecDeque;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::bus::{BusError, Delivery, Result as BusResult, Subscription};
use crate::watcher::FileHandler;

/// File handler that records every path it is given.
#[derive(Default)]
pub struct RecordingHandler {
    paths: Mutex<Vec<PathBuf>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.paths.lock().unwrap().clone()
    }
}

impl FileHandler for RecordingHandler {
    fn file_created(&self, path: PathBuf) {
        self.paths.lock().unwrap().push(path);
    }
}

/// Subscription that replays pre-scripted batches.
pub struct ScriptedSubscription {
    topic: String,
    batches: VecDeque<Vec<Delivery>>,
    commits: Arc<Mutex<Vec<i64>>>,
    closes: Arc<AtomicUsize>,
    fail_poll: bool,
    on_commit: Option<Box<dyn FnMut(&Delivery) + Send>>,
}

/// Observers for a [`ScriptedSubscription`] after it was moved into a consumer.
#[derive(Clone)]
pub struct SubscriptionObserver {
    commits: Arc<Mutex<Vec<i64>>>,
    closes: Arc<AtomicUsize>,
}

impl SubscriptionObserver {
    pub fn commits(&self) -> Vec<i64> {
        self.commits.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl ScriptedSubscription {
    pub fn new(topic: &str, batches: Vec<Vec<Delivery>>) -> (Self, SubscriptionObserver) {
        let commits = Arc::new(Mutex::new(Vec::new()));
        let closes = Arc::new(AtomicUsize::new(0));
        let observer = SubscriptionObserver {
            commits: Arc::clone(&commits),
            closes: Arc::clone(&closes),
        };
        let subscription = Self {
            topic: topic.to_string(),
            batches: batches.into(),
            commits,
            closes,
            fail_poll: false,
            on_commit: None,
        };
        (subscription, observer)
    }

    /// Fail every poll once the scripted batches are used up.
    pub fn failing_when_drained(mut self) -> Self {
        self.fail_poll = true;
        self
    }

    /// Run `hook` after each commit.
    pub fn on_commit(mut self, hook: impl FnMut(&Delivery) + Send + 'static) -> Self {
        self.on_commit = Some(Box::new(hook));
        self
    }
}

#[async_trait]
impl Subscription for ScriptedSubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn poll(&mut self, timeout: Duration) -> BusResult<Vec<Delivery>> {
        match self.batches.pop_front() {
            Some(batch) => Ok(batch),
            None if self.fail_poll => Err(BusError::Poll("scripted failure".to_string())),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(Vec::new())
            }
        }
    }

    async fn commit(&mut self, delivery: &Delivery) -> BusResult<()> {
        self.commits.lock().unwrap().push(delivery.offset);
        if let Some(hook) = self.on_commit.as_mut() {
            hook(delivery);
        }
        Ok(())
    }

    async fn close(&mut self) -> BusResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn delivery(topic: &str, offset: i64, value: &str) -> Delivery {
    Delivery {
        topic: topic.to_string(),
        partition: 0,
        offset,
        value: value.to_string(),
    }
}

/// Write `content` outside `dir`, then move it in, so the file appears complete.
pub fn drop_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let staging = dir
        .parent()
        .expect("watched dir has a parent")
        .join(format!(".staging-{}", name));
    std::fs::write(&staging, content).unwrap();
    let target = dir.join(name);
    std::fs::rename(&staging, &target).unwrap();
    target
}

/// Poll `check` every 10 ms until it holds or `timeout` passes.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
