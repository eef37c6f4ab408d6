//! Test doubles for the remote collection and the user prompt
use std::sync::{Arc, Mutex as SyncMutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::Mutex;

use crate::error::{Error, ErrorKind};
use crate::item::{Item, ItemId, Locator};
use crate::prompt::Prompt;
use crate::remote::RemoteCollection;

/// Number of requests received by a [`MemoryCollection`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Calls {
    pub list: usize,
    pub create: usize,
    pub update: usize,
    pub delete: usize,
}

#[derive(Debug)]
enum Failure {
    Status(StatusCode),
    Network,
}

struct Inner<T> {
    items: Vec<(ItemId, T)>,
    next_id: u64,
    calls: Calls,
    fail_next: Option<Failure>,
}

impl<T> Inner<T> {
    fn position(&self, at: &Locator) -> Result<usize, Error> {
        let id = match at {
            Locator::Id(id) => id.clone(),
            Locator::Link(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .map(ItemId::from)
                .ok_or(Error::status(StatusCode::NOT_FOUND, "bad link"))?,
        };
        self.items
            .iter()
            .position(|(i, _)| i == &id)
            .ok_or(Error::status(StatusCode::NOT_FOUND, format!("no item {id}")))
    }

    fn take_failure(&mut self) -> Result<(), Error> {
        match self.fail_next.take() {
            Some(Failure::Status(status)) => Err(Error::status(status, "injected failure")),
            Some(Failure::Network) => Err(Error::new(ErrorKind::Network, "connection refused")),
            None => Ok(()),
        }
    }
}

/// An in-memory collection server
///
/// Identifiers are assigned sequentially starting at 1. Clones share the
/// same collection, so a test can keep a handle to inspect it after passing
/// one to a [`ListSync`](crate::sync::ListSync).
pub struct MemoryCollection<T> {
    inner: Arc<Mutex<Inner<T>>>,
    echo: bool,
    latency: Option<Duration>,
}

impl<T> Clone for MemoryCollection<T> {
    fn clone(&self) -> Self {
        MemoryCollection {
            inner: Arc::clone(&self.inner),
            echo: self.echo,
            latency: self.latency,
        }
    }
}

impl<T> Default for MemoryCollection<T> {
    fn default() -> Self {
        MemoryCollection {
            inner: Arc::new(Mutex::new(Inner {
                items: Vec::new(),
                next_id: 1,
                calls: Calls::default(),
                fail_next: None,
            })),
            echo: true,
            latency: None,
        }
    }
}

impl<T> MemoryCollection<T> {
    pub fn new() -> Self {
        MemoryCollection::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = T>) -> Self {
        let items: Vec<(ItemId, T)> = items
            .into_iter()
            .enumerate()
            .map(|(i, fields)| (ItemId::from(i as u64 + 1), fields))
            .collect();
        let next_id = items.len() as u64 + 1;
        MemoryCollection {
            inner: Arc::new(Mutex::new(Inner {
                items,
                next_id,
                calls: Calls::default(),
                fail_next: None,
            })),
            ..MemoryCollection::default()
        }
    }

    /// Answer create and update requests with an empty body
    pub fn without_echo(self) -> Self {
        MemoryCollection {
            echo: false,
            ..self
        }
    }

    /// Delay every response
    pub fn with_latency(self, millis: u64) -> Self {
        MemoryCollection {
            latency: Some(Duration::from_millis(millis)),
            ..self
        }
    }

    /// Make the next request fail with the given status
    pub async fn fail_next(&self, status: u16) {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.inner.lock().await.fail_next = Some(Failure::Status(status));
    }

    /// Make the next request fail without a response
    pub async fn disconnect_next(&self) {
        self.inner.lock().await.fail_next = Some(Failure::Network);
    }

    pub async fn calls(&self) -> Calls {
        self.inner.lock().await.calls
    }

    /// The server side state of the collection
    pub async fn items(&self) -> Vec<Item<T>>
    where
        T: Clone,
    {
        self.inner
            .lock()
            .await
            .items
            .iter()
            .map(|(id, fields)| Item::from_server(Some(id.clone()), None, fields.clone()))
            .collect()
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl<T> RemoteCollection<T> for MemoryCollection<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn list(&self) -> Result<Vec<Item<T>>, Error> {
        self.delay().await;
        let mut inner = self.inner.lock().await;
        inner.calls.list += 1;
        inner.take_failure()?;
        Ok(inner
            .items
            .iter()
            .map(|(id, fields)| Item::from_server(Some(id.clone()), None, fields.clone()))
            .collect())
    }

    async fn create(&self, fields: &T) -> Result<Option<Item<T>>, Error> {
        self.delay().await;
        let mut inner = self.inner.lock().await;
        inner.calls.create += 1;
        inner.take_failure()?;
        let id = ItemId::from(inner.next_id);
        inner.next_id += 1;
        inner.items.push((id.clone(), fields.clone()));
        Ok(self
            .echo
            .then(|| Item::from_server(Some(id), None, fields.clone())))
    }

    async fn update(&self, at: &Locator, fields: &T) -> Result<Option<Item<T>>, Error> {
        self.delay().await;
        let mut inner = self.inner.lock().await;
        inner.calls.update += 1;
        inner.take_failure()?;
        let pos = inner.position(at)?;
        inner.items[pos].1 = fields.clone();
        let id = inner.items[pos].0.clone();
        Ok(self
            .echo
            .then(|| Item::from_server(Some(id), None, fields.clone())))
    }

    async fn delete(&self, at: &Locator) -> Result<(), Error> {
        self.delay().await;
        let mut inner = self.inner.lock().await;
        inner.calls.delete += 1;
        inner.take_failure()?;
        let pos = inner.position(at)?;
        inner.items.remove(pos);
        Ok(())
    }
}

#[derive(Default)]
struct PromptLog {
    confirmations: usize,
    alerts: Vec<String>,
    notices: Vec<String>,
}

/// A prompt that answers confirmations with a fixed value and records
/// everything it is asked to show
#[derive(Clone)]
pub struct ScriptedPrompt {
    answer: bool,
    log: Arc<SyncMutex<PromptLog>>,
}

impl Default for ScriptedPrompt {
    fn default() -> Self {
        ScriptedPrompt {
            answer: true,
            log: Arc::default(),
        }
    }
}

impl ScriptedPrompt {
    /// A prompt that accepts every confirmation
    pub fn new() -> Self {
        ScriptedPrompt::default()
    }

    /// A prompt that declines every confirmation
    pub fn declining() -> Self {
        ScriptedPrompt {
            answer: false,
            ..ScriptedPrompt::default()
        }
    }

    fn log(&self) -> MutexGuard<'_, PromptLog> {
        // a panicking test poisons the lock, the log is still readable
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn confirmations(&self) -> usize {
        self.log().confirmations
    }

    pub fn alerts(&self) -> Vec<String> {
        self.log().alerts.clone()
    }

    pub fn notices(&self) -> Vec<String> {
        self.log().notices.clone()
    }
}

impl Prompt for ScriptedPrompt {
    fn confirm(&self, _message: &str) -> bool {
        self.log().confirmations += 1;
        self.answer
    }

    fn alert(&self, message: &str) {
        self.log().alerts.push(message.to_string());
    }

    fn notify(&self, message: &str) {
        self.log().notices.push(message.to_string());
    }
}
