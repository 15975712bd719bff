pub mod cache;
pub mod config;
pub mod edit;
pub mod ingest;
pub mod metrics;
pub mod record;
pub mod search;
pub mod session;
pub mod shelf;
pub mod store;
pub mod testing;
pub mod topics;

pub use cache::{CacheError, PartitionCache};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DatabaseConfig,
    ResolverConfig, SearchConfig, ServerConfig, SessionConfig, StoreConfig,
};
pub use edit::{EditBuffer, EditEntry, EditError};
pub use ingest::{extract_doi, parse_keys, DoiOrgResolver, ResolveError, ResolvedWork, Resolver};
pub use record::{Ack, Document, Record, RecordField, UNKNOWN_FIELD};
pub use search::{Highlight, SearchEngine, SearchError};
pub use session::{
    FileSessionStorage, MemorySessionStorage, SessionContext, SessionError, SessionStorage,
};
pub use shelf::{ErrorKind, Notification, NotificationLevel, Shelf, ShelfError};
pub use store::{fetch_partitions, HttpRecordStore, RecordStore, SqliteRecordStore, StoreError};
pub use topics::{TopicCatalog, TopicError};
