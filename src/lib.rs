pub mod aggregator;
pub mod backend;
pub mod chat;
pub mod config;
pub mod error;
pub mod fallback;
pub mod models;
pub mod request;
pub mod rotation;
pub mod tmdb;
pub mod view;
pub mod watchlist;

pub use aggregator::MediaAggregator;
pub use config::Config;
pub use error::{AggregationFailure, AllFailed, ReconcileFailure, RequestFailure};
pub use models::{EntityRef, MediaKind, MediaRecord};
pub use request::Executor;
