mod database;
mod feed_repo;
mod ops_repo;

pub use database::Database;
pub use feed_repo::FeedRepository;
pub use ops_repo::{OpsRepository, FAKE_FETCH, QUICK_FETCH, REPLICATION_LAG};
