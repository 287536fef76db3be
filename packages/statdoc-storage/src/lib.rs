pub mod corpus;
pub mod db;
pub mod jobs;
pub mod models;
pub mod schema;

mod error;

pub use error::{Error, Result};
pub use jobs::{BoxFuture, CompletionBundle, JobStore, PgJobStore};
