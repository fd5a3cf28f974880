//! Crawl job execution: deduplicated enqueue, batch workers, the submission
//! queue, and the stores and collaborators they run against.

pub mod collaborators;
pub mod enqueue;
pub mod error;
pub mod extractor;
pub mod memory;
pub mod pipeline;
pub mod postgres;
pub mod registry;
pub mod scorer;
pub mod store;
pub mod submissions;
pub mod types;
pub mod worker;

pub use collaborators::{
    Classification, ContentScore, ExtractedPage, ExtractionError, Extractor, ScoreInput, Scorer,
    ScoringError,
};
pub use enqueue::{EnqueueOutcome, EnqueueSummary};
pub use error::{JobFailure, PipelineError, StoreError};
pub use extractor::HttpExtractor;
pub use memory::MemoryStore;
pub use pipeline::{Pipeline, PipelineSettings, Stores};
pub use postgres::PgStore;
pub use registry::Registry;
pub use scorer::HttpScorer;
pub use store::{ContentStore, DomainLimiter, JobStore, SubmissionStore};
pub use submissions::{SubmissionBatchResult, SubmissionResult, SubmissionStatus};
pub use types::{
    ContentRecord, ContentSummary, CrawlDomain, CrawlJob, JobFilter, JobStats, NewJob,
    NewSubmission, Submission,
};
pub use worker::{BatchResult, JobOutcome, OutcomeStatus, MAX_BATCH_CONCURRENCY, MAX_BATCH_SIZE};
