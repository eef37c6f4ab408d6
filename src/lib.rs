#![cfg_attr(docsrs, feature(doc_cfg))]
//! listsync keeps a local list of items in step with a remote REST collection.
//!
//! A view showing a list usually needs the same few things: load the collection when the
//! view appears, let the user add, edit and remove entries, show those changes right away and
//! make sure that what is displayed matches the server once the requests complete. This library
//! packages that pattern.
//!
//! # Features
//!
//! - Collection client. [`HttpCollection`](remote::HttpCollection) talks to a REST endpoint and
//!   understands plain JSON arrays, `{ "data": .. }` wrappers and HAL documents where items are
//!   addressed by their `_links.self.href`.
//! - Explicit authentication. Tokens live in an [`AuthContext`](auth::AuthContext) passed to the
//!   clients that need it, there is no global session.
//! - Optimistic changes. Every mutation is applied to the list as *pending* and only becomes part
//!   of the confirmed state once the server accepts it. Rejected changes are rolled back.
//! - Reconciliation policies. After a successful change the list is either read again from the
//!   server ([`Policy::Refetch`](sync::Policy::Refetch)) or patched locally
//!   ([`Policy::LocalPatch`](sync::Policy::LocalPatch)).
//! - Inline editing. [`InlineEdit`](edit::InlineEdit) models the focus, type, commit cycle of an
//!   editable cell and only produces an update when the value changed.
//! - Observable state. Changes to the list are published as [JSON Patch](https://datatracker.ietf.org/doc/html/rfc6902)
//!   documents. For more detailed logging, the library uses the [tracing crate](https://crates.io/crates/tracing).
//!
//! # ListSync
//!
//! A [`ListSync`](sync::ListSync) owns the list state for as long as the view is mounted. It is
//! created from any [`RemoteCollection`](remote::RemoteCollection) implementation.
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use listsync::sync::{ListSync, Opts, Policy};
//! use listsync::testing::MemoryCollection;
//!
//! #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
//! struct Todo {
//!     title: String,
//!     done: bool,
//! }
//!
//! # tokio_test::block_on(async {
//! let sync = ListSync::new(MemoryCollection::new())
//!     .with_opts(Opts::default().policy(Policy::LocalPatch).label("todo"));
//!
//! // load the collection
//! sync.mount().await.unwrap();
//!
//! let key = sync
//!     .create(Todo { title: "milk".into(), done: false })
//!     .await
//!     .unwrap();
//! sync.update(key, Todo { title: "milk".into(), done: true }).await.unwrap();
//!
//! let items = sync.items().await;
//! assert_eq!(items.len(), 1);
//! assert!(items[0].fields().done);
//! # })
//! ```
//!
//! Entries are addressed by a [`Key`](list::Key) that is assigned locally, so an entry can be
//! referenced before the server assigns it an identifier.
//!
//! # Talking to a server
//!
//! ```rust,no_run
//! use serde::{Deserialize, Serialize};
//! use url::Url;
//! use listsync::auth::{AuthContext, Credentials};
//! use listsync::envelope::Envelope;
//! use listsync::remote::{Config, HttpCollection};
//! use listsync::sync::ListSync;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Car {
//!     brand: String,
//!     model: String,
//! }
//!
//! # tokio_test::block_on(async {
//! let base = Url::parse("http://localhost:8080/api/").unwrap();
//! let auth = AuthContext::new();
//! auth.login(
//!     &reqwest::Client::new(),
//!     base.join("login").unwrap(),
//!     &Credentials::new("user", "user"),
//! )
//! .await
//! .unwrap();
//!
//! let cars: HttpCollection<Car> =
//!     HttpCollection::new(Config::new(base, "cars").envelope(Envelope::Hal)).with_auth(auth);
//! let sync = ListSync::new(cars);
//! sync.mount().await.unwrap();
//! # })
//! ```
//!
//! # Failures
//!
//! Every operation returns an [`Error`]. Failures reported by the server are also passed to the
//! [`Prompt`](prompt::Prompt) so the user can be told about them, failures to reach the server
//! are logged.
//!
//! # Logging
//!
//! The library emits [tracing](https://crates.io/crates/tracing) spans for every list operation.
//! Applications using the [log crate](https://crates.io/crates/log) can enable the `logging`
//! feature and call `listsync::sync::init_logging()` to have those operations reported as log
//! records.
pub mod auth;
pub mod edit;
pub mod envelope;
pub mod error;
pub mod item;
pub mod list;
pub mod prompt;
pub mod remote;
pub mod sync;

#[cfg(any(test, feature = "testing"))]
#[cfg_attr(docsrs, doc(cfg(feature = "testing")))]
pub mod testing;

pub use error::{Error, ErrorKind};
pub use item::{Item, ItemId, Locator};
