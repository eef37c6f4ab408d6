use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use json_patch::{diff, Patch};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, field, span, warn, Instrument, Level, Span};

#[cfg(feature = "logging")]
mod logging;

#[cfg(feature = "logging")]
pub use logging::init as init_logging;

use crate::edit::Commit;
use crate::error::{Error, ErrorKind};
use crate::item::{Item, Locator};
use crate::list::{Key, ListState};
use crate::prompt::{Prompt, Unattended};
use crate::remote::RemoteCollection;

/// How the local list is reconciled after the server accepts a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Read the whole collection again and replace the list with it
    #[default]
    Refetch,
    /// Apply the same change to the local list without a round trip
    LocalPatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Opts {
    /// Reconciliation after successful mutations. Defaults to refetch
    policy: Policy,
    /// Ask for confirmation before deleting. Defaults to true
    confirm_delete: bool,
    /// Name of the items in user facing messages. Defaults to `item`
    label: String,
    /// Number of change notifications buffered per subscriber. Defaults to 64
    feed_capacity: usize,
}

impl Default for Opts {
    fn default() -> Self {
        Opts {
            policy: Policy::default(),
            confirm_delete: true,
            label: "item".to_string(),
            feed_capacity: 64,
        }
    }
}

impl Opts {
    pub fn policy(self, policy: Policy) -> Self {
        let mut opts = self;
        opts.policy = policy;
        opts
    }

    pub fn confirm_delete(self, confirm_delete: bool) -> Self {
        let mut opts = self;
        opts.confirm_delete = confirm_delete;
        opts
    }

    pub fn label(self, label: impl Into<String>) -> Self {
        let mut opts = self;
        opts.label = label.into();
        opts
    }

    pub fn feed_capacity(self, feed_capacity: usize) -> Self {
        let mut opts = self;
        opts.feed_capacity = feed_capacity.max(1);
        opts
    }
}

/// A confirmed server response to apply to the list
enum Outcome<T> {
    Created(Option<Item<T>>),
    Updated(Option<Item<T>>),
    Deleted,
}

/// Store the outcome of an operation in its span
pub(crate) fn record<R>(span: &Span, res: &Result<R, Error>) {
    match res {
        Ok(_) => span.record("return", "success"),
        Err(e) if e.is_cancelled() => span.record("return", "cancelled"),
        Err(e) => span
            .record("return", "failure")
            .record("error", field::display(e)),
    };
}

/// Keeps a local list in step with a remote collection
///
/// Every mutation first marks the affected entry as pending. Once the server
/// confirms it, the entry is committed and, with [`Policy::Refetch`], the
/// whole list is read again. If the server rejects it, the change is rolled
/// back so the confirmed state is exactly what it was before the call.
///
/// Failures are returned to the caller and also reported: network failures
/// are logged, failures reported by the server are passed to
/// [`Prompt::alert`].
///
/// A `ListSync` lives as long as the view showing the list.
/// [`ListSync::unmount`] abandons any request in flight and no response is
/// applied afterwards.
pub struct ListSync<T, C> {
    remote: C,
    prompt: Arc<dyn Prompt>,
    opts: Opts,
    state: RwLock<ListState<T>>,
    mounted: AtomicBool,
    cancel: CancellationToken,
    changes: broadcast::Sender<Patch>,
}

impl<T, C> ListSync<T, C>
where
    T: Clone + Serialize + Send + Sync + 'static,
    C: RemoteCollection<T>,
{
    pub fn new(remote: C) -> Self {
        let opts = Opts::default();
        let (changes, _) = broadcast::channel(opts.feed_capacity);
        ListSync {
            remote,
            prompt: Arc::new(Unattended),
            opts,
            state: RwLock::new(ListState::new()),
            mounted: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            changes,
        }
    }

    pub fn with_opts(self, opts: Opts) -> Self {
        let (changes, _) = broadcast::channel(opts.feed_capacity);
        ListSync {
            opts,
            changes,
            ..self
        }
    }

    pub fn with_prompt<P: Prompt + 'static>(self, prompt: P) -> Self {
        ListSync {
            prompt: Arc::new(prompt),
            ..self
        }
    }

    pub fn remote(&self) -> &C {
        &self.remote
    }

    /// Load the list for the first time
    ///
    /// Only the first call reads the collection, later calls do nothing.
    pub async fn mount(&self) -> Result<(), Error> {
        if self.mounted.swap(true, Ordering::SeqCst) {
            debug!("already mounted");
            return Ok(());
        }
        self.refresh().await
    }

    /// Abandon requests in flight and stop applying responses
    pub fn unmount(&self) {
        self.cancel.cancel();
    }

    pub fn is_unmounted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Subscribe to changes of the list
    ///
    /// Every change is described as a JSON patch between the previous and the
    /// new serialized [`ListState`]. Subscribers that fall behind skip
    /// changes, the latest state can always be read with
    /// [`ListSync::read`].
    pub fn changes(&self) -> impl Stream<Item = Patch> + Send + 'static {
        BroadcastStream::new(self.changes.subscribe()).filter_map(|res| match res {
            Ok(patch) => Some(patch),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "change feed subscriber fell behind");
                None
            }
        })
    }

    /// Read the current list state
    pub async fn read<R>(&self, f: impl FnOnce(&ListState<T>) -> R) -> R {
        let state = self.state.read().await;
        f(&state)
    }

    /// The last state confirmed by the server
    pub async fn items(&self) -> Vec<Item<T>> {
        self.read(|s| s.committed()).await
    }

    /// The list as it should be displayed, including unconfirmed changes
    pub async fn visible(&self) -> Vec<Item<T>> {
        self.read(|s| s.visible()).await
    }

    /// Read the whole collection and replace the list with it
    pub async fn refresh(&self) -> Result<(), Error> {
        let span = span!(Level::INFO, "refresh", return = field::Empty, error = field::Empty);
        async {
            let res = self.fetch().await;
            if let Err(err) = &res {
                self.report(err, "load");
            }
            record(&Span::current(), &res);
            res
        }
        .instrument(span)
        .await
    }

    /// Add a new item to the collection
    ///
    /// The returned key addresses the new entry. With [`Policy::Refetch`] the
    /// key is only kept if the server echoes the created item back, as that
    /// is the only way to match it with the refreshed list.
    pub async fn create(&self, fields: T) -> Result<Key, Error> {
        let span = span!(Level::INFO, "create", return = field::Empty, error = field::Empty);
        async {
            let key = self.mutate(|s| s.begin_create(fields.clone())).await?;
            let res = match self.call(self.remote.create(&fields)).await {
                Ok(echo) => self.settle(key, Outcome::Created(echo)).await.map(|_| key),
                Err(err) => Err(self.abort(key, err, "add").await),
            };
            record(&Span::current(), &res);
            res
        }
        .instrument(span)
        .await
    }

    /// Replace the fields of an entry
    pub async fn update(&self, key: Key, fields: T) -> Result<(), Error> {
        let span = span!(Level::INFO, "update", key = %key, return = field::Empty, error = field::Empty);
        async {
            let at = self
                .mutate(|s| {
                    let at = locate(s, key)?;
                    s.begin_update(key, fields.clone())?;
                    Ok::<_, Error>(at)
                })
                .await??;
            let res = match self.call(self.remote.update(&at, &fields)).await {
                Ok(echo) => self.settle(key, Outcome::Updated(echo)).await,
                Err(err) => Err(self.abort(key, err, "update").await),
            };
            record(&Span::current(), &res);
            res
        }
        .instrument(span)
        .await
    }

    /// Remove an entry from the collection
    ///
    /// Unless disabled in [`Opts`], the user is asked to confirm first.
    /// Returns `false` if the user declined, in which case no request is
    /// made.
    pub async fn delete(&self, key: Key) -> Result<bool, Error> {
        let span = span!(Level::INFO, "delete", key = %key, return = field::Empty, error = field::Empty);
        async {
            if self.is_unmounted() {
                return Err(Error::from(ErrorKind::Cancelled));
            }
            let at = self.read(|s| locate(s, key)).await?;
            if self.opts.confirm_delete && !self.prompt.confirm("Are you sure you want to delete?") {
                debug!("delete declined");
                Span::current().record("return", "declined");
                return Ok(false);
            }

            self.mutate(|s| s.begin_delete(key)).await??;
            let res = match self.call(self.remote.delete(&at)).await {
                Ok(()) => self.settle(key, Outcome::Deleted).await,
                Err(err) => Err(self.abort(key, err, "delete").await),
            };
            if res.is_ok() {
                self.prompt
                    .notify(&format!("{} deleted successfully", capitalize(&self.opts.label)));
            }
            record(&Span::current(), &res);
            res.map(|_| true)
        }
        .instrument(span)
        .await
    }

    /// Send the result of an inline edit
    ///
    /// Returns `true` if an update was sent. Unchanged values are not sent.
    pub async fn commit(&self, commit: Commit<T>) -> Result<bool, Error> {
        match commit {
            Commit::Unchanged => Ok(false),
            Commit::Changed { key, value } => self.update(key, value).await.map(|_| true),
        }
    }

    async fn fetch(&self) -> Result<(), Error> {
        let items = self.call(self.remote.list()).await?;
        debug!(len = items.len(), "collection read");
        self.mutate(|s| s.replace(items)).await
    }

    /// Race a request against unmounting
    async fn call<F, R>(&self, request: F) -> Result<R, Error>
    where
        F: Future<Output = Result<R, Error>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ErrorKind::Cancelled.into()),
            res = request => res,
        }
    }

    /// Change the list and notify subscribers
    async fn mutate<R>(&self, f: impl FnOnce(&mut ListState<T>) -> R) -> Result<R, Error> {
        let mut state = self.state.write().await;
        // checked under the lock, no change is applied after unmounting
        if self.cancel.is_cancelled() {
            return Err(ErrorKind::Cancelled.into());
        }

        let before = serde_json::to_value(&*state);
        let res = f(&mut state);
        let after = serde_json::to_value(&*state);
        drop(state);

        match (before, after) {
            (Ok(before), Ok(after)) => {
                let patch = diff(&before, &after);
                if !patch.0.is_empty() {
                    for change in patch.0.iter() {
                        debug!("- {}", change);
                    }
                    // nobody listening is fine
                    let _ = self.changes.send(patch);
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                error!("failed to serialize list state, change not published: {e}");
            }
        }
        Ok(res)
    }

    /// Apply a confirmed change according to the reconciliation policy
    async fn settle(&self, key: Key, outcome: Outcome<T>) -> Result<(), Error> {
        let refetch = match (&self.opts.policy, &outcome) {
            (Policy::Refetch, _) => true,
            // the server did not tell us the identifier it assigned
            (Policy::LocalPatch, Outcome::Created(None)) => true,
            (Policy::LocalPatch, _) => false,
        };

        let applied = self
            .mutate(|s| match outcome {
                Outcome::Created(echo) => s.commit_create(key, echo),
                Outcome::Updated(echo) => s.commit_update(key, echo),
                Outcome::Deleted => s.commit_delete(key).map(|_| ()),
            })
            .await?;
        if let Err(e) = applied {
            // the entry was replaced by a refresh in the meantime
            debug!("entry {key} is gone: {e}");
        }

        if refetch {
            match self.fetch().await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => warn!("refetch failed, keeping the local change: {e}"),
            }
        }
        Ok(())
    }

    /// Undo a rejected change and report the failure
    async fn abort(&self, key: Key, err: Error, action: &str) -> Error {
        if !err.is_cancelled() {
            match self.mutate(|s| s.rollback(key)).await {
                Ok(Err(e)) => debug!("entry {key} is gone: {e}"),
                Ok(Ok(())) | Err(_) => {}
            }
        }
        self.report(&err, action);
        err
    }

    fn report(&self, err: &Error, action: &str) {
        if err.is_cancelled() {
            debug!("{action} abandoned, the list was unmounted");
        } else if err.is_application() {
            warn!("{action} failed: {err}");
            self.prompt
                .alert(&format!("Failed to {action} {}", self.opts.label));
        } else {
            error!("{action} failed: {err}");
        }
    }
}

fn locate<T>(state: &ListState<T>, key: Key) -> Result<Locator, Error> {
    state
        .get(key)
        .ok_or(Error::from(ErrorKind::NotFound))?
        .item()
        .locator()
        .ok_or(ErrorKind::NotPersisted.into())
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
