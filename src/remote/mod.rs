//! Access to a REST collection endpoint
use async_trait::async_trait;

use crate::error::Error;
use crate::item::{Item, Locator};

mod http;
pub use http::*;

/// CRUD operations against one remote collection
///
/// Implementations perform a single request per call and never retry.
/// `create` and `update` return the item as echoed back by the server, or
/// `None` if the response had no body.
#[async_trait]
pub trait RemoteCollection<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// Read the full collection
    async fn list(&self) -> Result<Vec<Item<T>>, Error>;

    /// Submit a new item, the server assigns its identifier
    async fn create(&self, fields: &T) -> Result<Option<Item<T>>, Error>;

    /// Replace the item at the given location
    async fn update(&self, at: &Locator, fields: &T) -> Result<Option<Item<T>>, Error>;

    /// Remove the item at the given location
    async fn delete(&self, at: &Locator) -> Result<(), Error>;
}
