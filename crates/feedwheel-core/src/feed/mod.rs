mod models;
mod updater;

pub use models::{
    Feed, FeedId, NewFeed, OpsSnapshot, UpdateOptions, PUSH_LAG_MAX_SECS, SCHEDULED_LAG_MAX_SECS,
};
pub use updater::{FeedUpdater, HttpFeedUpdater, UpdateOutcome};
