//! In-process store implementing every store seam behind one mutex.
//!
//! Each trait method runs as a single critical section, which gives the same
//! atomicity the Postgres store gets from single-statement updates. The store
//! keeps its own clock offset so callers can move time forward without
//! sleeping.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use realpress_core::{
    window::{DEFAULT_CRAWL_DELAY_MS, DEFAULT_MAX_CONCURRENT},
    Admission, DomainWindow, JobStatus, SubmissionStage,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::collaborators::ContentScore;
use crate::error::StoreError;
use crate::store::{ContentStore, DomainLimiter, JobStore, SubmissionStore};
use crate::types::{
    ContentRecord, ContentSummary, CrawlDomain, CrawlJob, JobFilter, JobStats, NewJob,
    NewSubmission, Submission,
};

#[derive(Debug)]
struct StoredContent {
    record: ContentRecord,
    scores: Vec<ContentScore>,
}

#[derive(Debug, Default)]
struct MemoryState {
    clock_offset: Duration,
    next_job_id: i64,
    jobs: BTreeMap<i64, CrawlJob>,
    job_ids_by_hash: HashMap<String, i64>,
    domains: HashMap<String, CrawlDomain>,
    next_content_id: i64,
    content: BTreeMap<i64, StoredContent>,
    content_ids_by_hash: HashMap<String, i64>,
    submissions: HashMap<Uuid, Submission>,
}

impl MemoryState {
    fn now(&self) -> DateTime<Utc> {
        Utc::now() + self.clock_offset
    }

    fn job_mut(&mut self, id: i64) -> Result<&mut CrawlJob, StoreError> {
        self.jobs.get_mut(&id).ok_or(StoreError::NotFound)
    }

    fn processing_job(&mut self, id: i64) -> Result<Option<&mut CrawlJob>, StoreError> {
        let job = self.job_mut(id)?;
        Ok((job.status == JobStatus::Processing).then_some(job))
    }

    fn processing_submission(&mut self, id: Uuid) -> Result<Option<&mut Submission>, StoreError> {
        let submission = self.submissions.get_mut(&id).ok_or(StoreError::NotFound)?;
        Ok((submission.status == JobStatus::Processing).then_some(submission))
    }

    fn domain_entry(&mut self, domain: &str) -> &mut CrawlDomain {
        let now = self.now();
        self.domains
            .entry(domain.to_string())
            .or_insert_with(|| CrawlDomain {
                domain: domain.to_string(),
                allowed: true,
                is_priority: false,
                crawl_delay_ms: DEFAULT_CRAWL_DELAY_MS,
                max_concurrent: DEFAULT_MAX_CONCURRENT,
                requests_in_window: 0,
                window_start: now,
                success_count: 0,
                failure_count: 0,
                scored_count: 0,
                avg_score: None,
                last_request_at: None,
            })
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the store's clock forward. Affects claim eligibility and windows.
    pub async fn advance_clock(&self, by: Duration) {
        let mut state = self.state.lock().await;
        state.clock_offset += by;
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn enqueue(&self, job: &NewJob) -> Result<Option<i64>, StoreError> {
        let mut state = self.state.lock().await;
        if state.job_ids_by_hash.contains_key(&job.url.hash)
            || state.content_ids_by_hash.contains_key(&job.url.hash)
        {
            return Ok(None);
        }

        state.next_job_id += 1;
        let id = state.next_job_id;
        let now = state.now();
        state.jobs.insert(
            id,
            CrawlJob {
                id,
                url: job.url.url.clone(),
                url_hash: job.url.hash.clone(),
                domain: job.url.domain.clone(),
                source: job.metadata.source_tag().to_string(),
                metadata: job.metadata.clone(),
                priority: job.priority,
                status: JobStatus::Pending,
                attempts: 0,
                max_attempts: job.max_attempts,
                scheduled_at: now,
                started_at: None,
                completed_at: None,
                last_error: None,
                content_id: None,
                created_at: now,
                updated_at: now,
            },
        );
        state.job_ids_by_hash.insert(job.url.hash.clone(), id);
        Ok(Some(id))
    }

    async fn claim_next(&self) -> Result<Option<CrawlJob>, StoreError> {
        let mut state = self.state.lock().await;
        let now = state.now();
        let next = state
            .jobs
            .values()
            .filter(|j| {
                j.status == JobStatus::Pending && j.scheduled_at <= now && j.attempts < j.max_attempts
            })
            .min_by_key(|j| (Reverse(j.priority), j.scheduled_at, j.id))
            .map(|j| j.id);

        let Some(id) = next else {
            return Ok(None);
        };
        let job = state.job_mut(id)?;
        job.status = JobStatus::Processing;
        job.attempts += 1;
        job.started_at = Some(now);
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn complete(&self, id: i64, content_id: i64) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let now = state.now();
        let Some(job) = state.processing_job(id)? else {
            return Ok(false);
        };
        job.status = JobStatus::Completed;
        job.completed_at = Some(now);
        job.content_id = Some(content_id);
        job.last_error = None;
        job.updated_at = now;
        Ok(true)
    }

    async fn reschedule(
        &self,
        id: i64,
        delay_secs: i64,
        error: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let mut state = self.state.lock().await;
        let now = state.now();
        let Some(job) = state.processing_job(id)? else {
            return Ok(None);
        };
        job.status = JobStatus::Pending;
        job.scheduled_at = now + Duration::seconds(delay_secs);
        job.last_error = Some(error.to_string());
        job.updated_at = now;
        Ok(Some(job.scheduled_at))
    }

    async fn dead_letter(&self, id: i64, error: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let now = state.now();
        let Some(job) = state.processing_job(id)? else {
            return Ok(false);
        };
        job.status = JobStatus::DeadLetter;
        job.completed_at = Some(now);
        job.last_error = Some(error.to_string());
        job.updated_at = now;
        Ok(true)
    }

    async fn stale_claims(
        &self,
        lease_secs: i64,
        limit: i64,
    ) -> Result<Vec<CrawlJob>, StoreError> {
        let state = self.state.lock().await;
        let cutoff = state.now() - Duration::seconds(lease_secs);
        let mut stale: Vec<CrawlJob> = state
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Processing)
            .filter(|j| j.started_at.is_some_and(|started| started < cutoff))
            .cloned()
            .collect();
        stale.sort_by_key(|j| (j.started_at, j.id));
        stale.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(stale)
    }

    async fn retry(&self, id: i64) -> Result<CrawlJob, StoreError> {
        let mut state = self.state.lock().await;
        let now = state.now();
        let job = state.job_mut(id)?;
        if !job.status.is_retryable() {
            return Err(StoreError::InvalidTransition {
                id: id.to_string(),
                expected_status: "failed or dead_letter",
            });
        }
        job.status = JobStatus::Pending;
        job.attempts = 0;
        job.last_error = None;
        job.scheduled_at = now;
        job.started_at = None;
        job.completed_at = None;
        job.updated_at = now;
        Ok(job.clone())
    }

    async fn cancel(&self, id: i64) -> Result<CrawlJob, StoreError> {
        let mut state = self.state.lock().await;
        let now = state.now();
        let job = state.job_mut(id)?;
        if !job.status.is_cancellable() {
            return Err(StoreError::InvalidTransition {
                id: id.to_string(),
                expected_status: "not completed or cancelled",
            });
        }
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(now);
        job.updated_at = now;
        Ok(job.clone())
    }

    async fn get(&self, id: i64) -> Result<CrawlJob, StoreError> {
        let state = self.state.lock().await;
        state.jobs.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<CrawlJob>, StoreError> {
        let state = self.state.lock().await;
        let offset = usize::try_from(filter.offset.max(0)).unwrap_or(usize::MAX);
        let limit = usize::try_from(filter.limit.max(0)).unwrap_or(usize::MAX);
        Ok(state
            .jobs
            .values()
            .rev()
            .filter(|j| filter.status.is_none_or(|s| j.status == s))
            .filter(|j| filter.domain.as_ref().is_none_or(|d| &j.domain == d))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<JobStats, StoreError> {
        let state = self.state.lock().await;
        let mut stats = JobStats::default();
        for job in state.jobs.values() {
            stats.count(job.status);
        }
        Ok(stats)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl DomainLimiter for MemoryStore {
    async fn check_admission(
        &self,
        domain: &str,
        window_ms: i64,
    ) -> Result<Admission, StoreError> {
        let mut state = self.state.lock().await;
        let now = state.now();
        let entry = state.domain_entry(domain);

        let mut window = DomainWindow {
            allowed: entry.allowed,
            crawl_delay_ms: entry.crawl_delay_ms,
            max_concurrent: entry.max_concurrent,
            requests_in_window: entry.requests_in_window,
            window_start: entry.window_start,
        };
        let admission = window.try_admit(now, window_ms);
        if admission.is_admitted() {
            entry.requests_in_window = window.requests_in_window;
            entry.window_start = window.window_start;
            entry.last_request_at = Some(now);
        }
        Ok(admission)
    }

    async fn record_request(
        &self,
        domain: &str,
        success: bool,
        score: Option<f64>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let now = state.now();
        let entry = state.domain_entry(domain);
        if success {
            entry.success_count += 1;
        } else {
            entry.failure_count += 1;
        }
        if let Some(score) = score {
            #[allow(clippy::cast_precision_loss)]
            let scored = entry.scored_count as f64;
            let previous = entry.avg_score.unwrap_or(0.0);
            entry.avg_score = Some((previous * scored + score) / (scored + 1.0));
            entry.scored_count += 1;
        }
        entry.last_request_at = Some(now);
        Ok(())
    }

    async fn set_allowed(&self, domain: &str, allowed: bool) -> Result<CrawlDomain, StoreError> {
        let mut state = self.state.lock().await;
        let entry = state.domain_entry(domain);
        entry.allowed = allowed;
        Ok(entry.clone())
    }

    async fn set_priority(
        &self,
        domain: &str,
        is_priority: bool,
    ) -> Result<CrawlDomain, StoreError> {
        let mut state = self.state.lock().await;
        let entry = state.domain_entry(domain);
        entry.is_priority = is_priority;
        Ok(entry.clone())
    }

    async fn configure(
        &self,
        domain: &str,
        crawl_delay_ms: Option<i32>,
        max_concurrent: Option<i32>,
    ) -> Result<CrawlDomain, StoreError> {
        let mut state = self.state.lock().await;
        let entry = state.domain_entry(domain);
        if let Some(delay) = crawl_delay_ms {
            entry.crawl_delay_ms = delay.max(1);
        }
        if let Some(concurrency) = max_concurrent {
            entry.max_concurrent = concurrency.max(0);
        }
        Ok(entry.clone())
    }

    async fn get_domain(&self, domain: &str) -> Result<CrawlDomain, StoreError> {
        let state = self.state.lock().await;
        state.domains.get(domain).cloned().ok_or(StoreError::NotFound)
    }

    async fn list_domains(&self, limit: i64, offset: i64) -> Result<Vec<CrawlDomain>, StoreError> {
        let state = self.state.lock().await;
        let mut domains: Vec<CrawlDomain> = state.domains.values().cloned().collect();
        domains.sort_by(|a, b| {
            b.is_priority
                .cmp(&a.is_priority)
                .then_with(|| a.domain.cmp(&b.domain))
        });
        Ok(domains
            .into_iter()
            .skip(usize::try_from(offset.max(0)).unwrap_or(usize::MAX))
            .take(usize::try_from(limit.max(0)).unwrap_or(usize::MAX))
            .collect())
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn find_by_url_hash(&self, url_hash: &str) -> Result<Option<i64>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.content_ids_by_hash.get(url_hash).copied())
    }

    async fn save_scored(
        &self,
        content: &ContentRecord,
        score: &ContentScore,
    ) -> Result<i64, StoreError> {
        let mut state = self.state.lock().await;
        if let Some(&id) = state.content_ids_by_hash.get(&content.url_hash) {
            if let Some(stored) = state.content.get_mut(&id) {
                stored.record = content.clone();
                stored.scores.push(score.clone());
            }
            return Ok(id);
        }

        state.next_content_id += 1;
        let id = state.next_content_id;
        state.content.insert(
            id,
            StoredContent {
                record: content.clone(),
                scores: vec![score.clone()],
            },
        );
        state
            .content_ids_by_hash
            .insert(content.url_hash.clone(), id);
        Ok(id)
    }

    async fn summary(&self, content_id: i64) -> Result<ContentSummary, StoreError> {
        let state = self.state.lock().await;
        let stored = state.content.get(&content_id).ok_or(StoreError::NotFound)?;
        let latest = stored.scores.last();
        Ok(ContentSummary {
            content_id,
            url: stored.record.url.clone(),
            title: stored.record.title.clone(),
            composite_score: latest.map(|s| s.composite_score),
            classification: latest.map(|s| s.classification.as_str().to_string()),
            confidence: latest.map(|s| s.confidence),
        })
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn create(&self, submission: &NewSubmission) -> Result<Submission, StoreError> {
        let mut state = self.state.lock().await;
        if let Some(active) = state.submissions.values().find(|s| {
            s.url_hash == submission.url.hash
                && matches!(s.status, JobStatus::Pending | JobStatus::Processing)
        }) {
            return Ok(active.clone());
        }

        let now = state.now();
        let existing_content = state
            .content_ids_by_hash
            .get(&submission.url.hash)
            .copied();
        let (status, stage, completed_at) = match existing_content {
            Some(_) => (JobStatus::Completed, SubmissionStage::Done, Some(now)),
            None => (JobStatus::Pending, SubmissionStage::Queued, None),
        };

        let created = Submission {
            id: Uuid::new_v4(),
            url: submission.url.url.clone(),
            url_hash: submission.url.hash.clone(),
            domain: submission.url.domain.clone(),
            tier: submission.tier,
            priority: submission.tier.priority(),
            status,
            stage,
            progress: stage.progress(),
            attempts: 0,
            max_attempts: submission.max_attempts,
            scheduled_at: now,
            started_at: None,
            completed_at,
            last_error: None,
            content_id: existing_content,
            created_at: now,
        };
        state.submissions.insert(created.id, created.clone());
        Ok(created)
    }

    async fn claim_next(&self) -> Result<Option<Submission>, StoreError> {
        let mut state = self.state.lock().await;
        let now = state.now();
        let next = state
            .submissions
            .values()
            .filter(|s| {
                s.status == JobStatus::Pending && s.scheduled_at <= now && s.attempts < s.max_attempts
            })
            .min_by_key(|s| submission_order(s))
            .map(|s| s.id);

        let Some(id) = next else {
            return Ok(None);
        };
        let submission = state.submissions.get_mut(&id).ok_or(StoreError::NotFound)?;
        submission.status = JobStatus::Processing;
        submission.attempts += 1;
        submission.started_at = Some(now);
        Ok(Some(submission.clone()))
    }

    async fn update_stage(&self, id: Uuid, stage: SubmissionStage) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let Some(submission) = state.processing_submission(id)? else {
            return Ok(false);
        };
        submission.stage = stage;
        submission.progress = stage.progress();
        Ok(true)
    }

    async fn complete(&self, id: Uuid, content_id: i64) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let now = state.now();
        let Some(submission) = state.processing_submission(id)? else {
            return Ok(false);
        };
        submission.status = JobStatus::Completed;
        submission.stage = SubmissionStage::Done;
        submission.progress = SubmissionStage::Done.progress();
        submission.content_id = Some(content_id);
        submission.completed_at = Some(now);
        submission.last_error = None;
        Ok(true)
    }

    async fn reschedule(
        &self,
        id: Uuid,
        delay_secs: i64,
        error: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let mut state = self.state.lock().await;
        let now = state.now();
        let Some(submission) = state.processing_submission(id)? else {
            return Ok(None);
        };
        submission.status = JobStatus::Pending;
        submission.stage = SubmissionStage::Retrying;
        submission.progress = SubmissionStage::Retrying.progress();
        submission.scheduled_at = now + Duration::seconds(delay_secs);
        submission.last_error = Some(error.to_string());
        Ok(Some(submission.scheduled_at))
    }

    async fn dead_letter(&self, id: Uuid, error: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let now = state.now();
        let Some(submission) = state.processing_submission(id)? else {
            return Ok(false);
        };
        submission.status = JobStatus::DeadLetter;
        submission.stage = SubmissionStage::Failed;
        submission.progress = SubmissionStage::Failed.progress();
        submission.completed_at = Some(now);
        submission.last_error = Some(error.to_string());
        Ok(true)
    }

    async fn stale_claims(
        &self,
        lease_secs: i64,
        limit: i64,
    ) -> Result<Vec<Submission>, StoreError> {
        let state = self.state.lock().await;
        let cutoff = state.now() - Duration::seconds(lease_secs);
        let mut stale: Vec<Submission> = state
            .submissions
            .values()
            .filter(|s| s.status == JobStatus::Processing)
            .filter(|s| s.started_at.is_some_and(|started| started < cutoff))
            .cloned()
            .collect();
        stale.sort_by_key(|s| (s.started_at, s.id));
        stale.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(stale)
    }

    async fn cancel(&self, id: Uuid) -> Result<Submission, StoreError> {
        let mut state = self.state.lock().await;
        let now = state.now();
        let submission = state.submissions.get_mut(&id).ok_or(StoreError::NotFound)?;
        if !submission.status.is_cancellable() {
            return Err(StoreError::InvalidTransition {
                id: id.to_string(),
                expected_status: "not completed or cancelled",
            });
        }
        submission.status = JobStatus::Cancelled;
        submission.stage = SubmissionStage::Cancelled;
        submission.progress = SubmissionStage::Cancelled.progress();
        submission.completed_at = Some(now);
        Ok(submission.clone())
    }

    async fn retry(&self, id: Uuid) -> Result<Submission, StoreError> {
        let mut state = self.state.lock().await;
        let now = state.now();
        let me = state.submissions.get(&id).ok_or(StoreError::NotFound)?;
        let url_taken = state.submissions.values().any(|s| {
            s.url_hash == me.url_hash
                && matches!(s.status, JobStatus::Pending | JobStatus::Processing)
        });
        if !me.status.is_retryable() || url_taken {
            return Err(StoreError::InvalidTransition {
                id: id.to_string(),
                expected_status: "failed or dead_letter, with no other active submission",
            });
        }

        let submission = state.submissions.get_mut(&id).ok_or(StoreError::NotFound)?;
        submission.status = JobStatus::Pending;
        submission.stage = SubmissionStage::Queued;
        submission.progress = SubmissionStage::Queued.progress();
        submission.attempts = 0;
        submission.last_error = None;
        submission.scheduled_at = now;
        submission.started_at = None;
        submission.completed_at = None;
        Ok(submission.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Submission, StoreError> {
        let state = self.state.lock().await;
        state.submissions.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn queue_position(&self, id: Uuid) -> Result<Option<i64>, StoreError> {
        let state = self.state.lock().await;
        let me = state.submissions.get(&id).ok_or(StoreError::NotFound)?;
        if me.status != JobStatus::Pending {
            return Ok(None);
        }
        let my_order = submission_order(me);
        let ahead = state
            .submissions
            .values()
            .filter(|s| s.status == JobStatus::Pending && submission_order(s) < my_order)
            .count();
        Ok(Some(i64::try_from(ahead).unwrap_or(i64::MAX)))
    }
}

fn submission_order(s: &Submission) -> (Reverse<i32>, DateTime<Utc>, DateTime<Utc>, Uuid) {
    (Reverse(s.priority), s.scheduled_at, s.created_at, s.id)
}

#[cfg(test)]
mod tests {
    use realpress_core::{normalize_url, JobMetadata, RejectReason, Tier};

    use super::*;

    fn new_job(url: &str, priority: i32) -> NewJob {
        NewJob {
            url: normalize_url(url).unwrap(),
            metadata: JobMetadata::Manual,
            priority,
            max_attempts: 3,
        }
    }

    #[tokio::test]
    async fn enqueue_dedups_on_url_hash() {
        let store = MemoryStore::new();
        assert!(store
            .enqueue(&new_job("https://example.com/a", 0))
            .await
            .unwrap()
            .is_some());
        assert!(store
            .enqueue(&new_job("https://EXAMPLE.com/a/", 0))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn claim_orders_by_priority_then_age() {
        let store = MemoryStore::new();
        store.enqueue(&new_job("https://example.com/low", -5)).await.unwrap();
        store.enqueue(&new_job("https://example.com/old", 1)).await.unwrap();
        store.enqueue(&new_job("https://example.com/high", 10)).await.unwrap();
        store.enqueue(&new_job("https://example.com/new", 1)).await.unwrap();

        let order: Vec<String> = [
            JobStore::claim_next(&store).await.unwrap().unwrap(),
            JobStore::claim_next(&store).await.unwrap().unwrap(),
            JobStore::claim_next(&store).await.unwrap().unwrap(),
            JobStore::claim_next(&store).await.unwrap().unwrap(),
        ]
        .into_iter()
        .map(|j| j.url)
        .collect();

        assert_eq!(
            order,
            vec![
                "https://example.com/high",
                "https://example.com/old",
                "https://example.com/new",
                "https://example.com/low",
            ]
        );
        assert!(JobStore::claim_next(&store).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_skips_jobs_not_yet_due() {
        let store = MemoryStore::new();
        store.enqueue(&new_job("https://example.com/a", 0)).await.unwrap();
        let job = JobStore::claim_next(&store).await.unwrap().unwrap();
        let due = JobStore::reschedule(&store, job.id, 30, "boom")
            .await
            .unwrap()
            .unwrap();
        assert!(due > Utc::now() + Duration::seconds(29));

        assert!(JobStore::claim_next(&store).await.unwrap().is_none());
        store.advance_clock(Duration::seconds(31)).await;
        let again = JobStore::claim_next(&store).await.unwrap().unwrap();
        assert_eq!(again.id, job.id);
        assert_eq!(again.attempts, 2);
    }

    #[tokio::test]
    async fn stale_claims_lists_oldest_first_up_to_the_limit() {
        let store = MemoryStore::new();
        for url in ["https://example.com/a", "https://example.com/b", "https://example.com/c"] {
            store.enqueue(&new_job(url, 0)).await.unwrap();
        }
        let first = JobStore::claim_next(&store).await.unwrap().unwrap();
        store.advance_clock(Duration::seconds(10)).await;
        let second = JobStore::claim_next(&store).await.unwrap().unwrap();
        store.advance_clock(Duration::seconds(100)).await;
        JobStore::claim_next(&store).await.unwrap().unwrap();

        let stale = JobStore::stale_claims(&store, 50, 10).await.unwrap();
        let ids: Vec<i64> = stale.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);

        let limited = JobStore::stale_claims(&store, 50, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, first.id);
    }

    #[tokio::test]
    async fn admission_window_caps_and_rolls_over() {
        let store = MemoryStore::new();
        for _ in 0..60 {
            assert!(store
                .check_admission("example.com", 60_000)
                .await
                .unwrap()
                .is_admitted());
        }
        assert_eq!(
            store.check_admission("example.com", 60_000).await.unwrap(),
            Admission::Rejected(RejectReason::WindowFull { cap: 60 })
        );

        store.advance_clock(Duration::seconds(60)).await;
        assert_eq!(
            store.check_admission("example.com", 60_000).await.unwrap(),
            Admission::Admitted {
                requests_in_window: 1
            }
        );
    }

    #[tokio::test]
    async fn record_request_keeps_a_running_mean() {
        let store = MemoryStore::new();
        store
            .record_request("example.com", true, Some(0.2))
            .await
            .unwrap();
        store
            .record_request("example.com", true, Some(0.8))
            .await
            .unwrap();
        store.record_request("example.com", false, None).await.unwrap();

        let domain = store.get_domain("example.com").await.unwrap();
        assert_eq!(domain.success_count, 2);
        assert_eq!(domain.failure_count, 1);
        assert_eq!(domain.requests_in_window, 0);
        assert!((domain.avg_score.unwrap() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn queue_position_follows_tier_priority() {
        let store = MemoryStore::new();
        let submit = |url: &str, tier: Tier| NewSubmission {
            url: normalize_url(url).unwrap(),
            tier,
            max_attempts: 3,
        };
        let free = store
            .create(&submit("https://example.com/a", Tier::Free))
            .await
            .unwrap();
        let enterprise = store
            .create(&submit("https://example.com/b", Tier::Enterprise))
            .await
            .unwrap();

        assert_eq!(store.queue_position(enterprise.id).await.unwrap(), Some(0));
        assert_eq!(store.queue_position(free.id).await.unwrap(), Some(1));
    }
}
