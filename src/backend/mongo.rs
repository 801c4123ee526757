//! MongoDB document store
//!
//! One `MongoStore` wraps one collection. The underlying client keeps its own
//! connection pool and is shared by every engine call and by the reclamation
//! task.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use mongodb::bson::{doc, Document};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use tracing::info;

use super::{DocumentStore, Projection, RecordStream, Selector, StoreError, StoreResult};
use crate::cache::field;
use crate::config::Config;

// == Mongo Store ==
#[derive(Debug, Clone)]
pub struct MongoStore {
    database: Database,
    collection: Collection<Document>,
}

impl MongoStore {
    /// Builds a client from `config.mongo_uri` and binds it to the configured
    /// database and collection.
    ///
    /// Connect and server-selection timeouts follow `store_timeout_ms`. The
    /// driver connects lazily, so an unreachable server surfaces on the first
    /// call rather than here.
    pub async fn connect(config: &Config) -> StoreResult<Self> {
        let mut options = ClientOptions::parse(&config.mongo_uri)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let timeout = config.store_timeout();
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);
        if options.app_name.is_none() {
            options.app_name = Some(env!("CARGO_PKG_NAME").to_string());
        }

        let client =
            Client::with_options(options).map_err(|e| StoreError::Connection(e.to_string()))?;
        info!(
            "MongoDB client configured for {}.{}",
            config.database, config.collection
        );

        Ok(Self::from_client(&client, &config.database, &config.collection))
    }

    /// Binds an existing client to `database.collection`.
    pub fn from_client(client: &Client, database: &str, collection: &str) -> Self {
        let database = client.database(database);
        let collection = database.collection::<Document>(collection);
        Self {
            database,
            collection,
        }
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn ping(&self) -> StoreResult<()> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn find(&self, selector: &Selector, projection: Projection) -> StoreResult<RecordStream> {
        let cursor = match projection.to_document() {
            Some(fields) => {
                self.collection
                    .find(selector.to_filter())
                    .projection(fields)
                    .await?
            }
            None => self.collection.find(selector.to_filter()).await?,
        };
        Ok(cursor.map_err(StoreError::from).boxed())
    }

    async fn find_one(&self, selector: &Selector) -> StoreResult<Option<Document>> {
        Ok(self.collection.find_one(selector.to_filter()).await?)
    }

    async fn count(&self, selector: &Selector) -> StoreResult<u64> {
        Ok(self.collection.count_documents(selector.to_filter()).await?)
    }

    async fn upsert(&self, key: &str, record: Document) -> StoreResult<()> {
        // Server-side replace-or-insert; the unique `key` index keeps two
        // concurrent first writes from both inserting.
        self.collection
            .replace_one(Selector::Key(key.to_string()).to_filter(), record)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn touch(&self, key: &str, at: i64) -> StoreResult<bool> {
        let mut set = Document::new();
        set.insert(field::LAST_ACCESSED, at);
        set.insert(field::LAST_UPDATED, at);
        let mut inc = Document::new();
        inc.insert(field::HITS, 1_i64);

        let result = self
            .collection
            .update_one(
                Selector::Key(key.to_string()).to_filter(),
                doc! { "$set": set, "$inc": inc },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn delete_one(&self, selector: &Selector) -> StoreResult<u64> {
        Ok(self.collection.delete_one(selector.to_filter()).await?.deleted_count)
    }

    async fn delete_many(&self, selector: &Selector) -> StoreResult<u64> {
        Ok(self.collection.delete_many(selector.to_filter()).await?.deleted_count)
    }

    async fn create_index(&self, field: &str, unique: bool) -> StoreResult<()> {
        let mut keys = Document::new();
        keys.insert(field, 1_i32);
        let model = IndexModel::builder()
            .keys(keys)
            .options(IndexOptions::builder().unique(unique).build())
            .build();
        self.collection.create_index(model).await?;
        Ok(())
    }

    async fn drop_collection(&self) -> StoreResult<()> {
        self.collection.drop().await?;
        Ok(())
    }
}
