//! Commit-and-resolve pipeline.
//!
//! One request walks the whole chain: validate the message, read the current
//! file revision, write the new version, wait for the build workflow run
//! triggered by that commit, derive the artifact key, then wait for the
//! out-of-band shortener to publish a record under that key. Each stage has
//! its own failure variant in [`CommitError`] and its own method here, so
//! stages are testable in isolation.
//!
//! Both waits are plain `tokio::time::sleep` loops inside the request
//! future; a client disconnect drops the future and cancels the pending
//! sleep, so no worker is ever parked on a dead request.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::commit::filename::{derive_object_key, extract_timestamp};
use crate::github::{BuildRun, VcsError, VersionControl};
use crate::lookup::{LookupError, ShortUrlRecord, ShortUrlStore};

/// The run feed is most-recent-first; a handful of entries is enough to find
/// the run for a commit made seconds ago.
const RUN_FEED_PAGE_SIZE: u32 = 5;

/// Fixed-interval polling of the workflow-run feed. Defaults give a
/// five-minute ceiling.
#[derive(Debug, Clone)]
pub struct BuildPollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for BuildPollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 60,
        }
    }
}

/// Exponential-backoff polling of the short-URL table. Defaults:
/// 500 ms doubling across 5 attempts, so the worst case waits
/// 500+1000+2000+4000+8000 ms before giving up.
#[derive(Debug, Clone)]
pub struct RecordPollPolicy {
    pub initial_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RecordPollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommitSettings {
    pub resume_path: String,
    pub branch: String,
    pub build_poll: BuildPollPolicy,
    pub record_poll: RecordPollPolicy,
}

impl Default for CommitSettings {
    fn default() -> Self {
        Self {
            resume_path: "resume.tex".to_string(),
            branch: "main".to_string(),
            build_poll: BuildPollPolicy::default(),
            record_poll: RecordPollPolicy::default(),
        }
    }
}

/// What the pipeline hands back on success.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub short_url: String,
    pub commit_sha: String,
    pub object_key: String,
    pub run_id: u64,
}

/// One variant per failing stage. The pipeline never retries beyond its two
/// polling loops; callers re-invoke the whole flow (which repeats the read
/// and write, producing a fresh commit).
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("No timestamp found in commit message")]
    MissingTimestamp,

    #[error("Version control error: {0}")]
    Vcs(VcsError),

    #[error("Commit conflict: {0}")]
    Conflict(String),

    #[error("Timeout waiting for workflow run")]
    BuildTimeout,

    #[error("Lookup store error: {0}")]
    Lookup(#[from] LookupError),

    #[error("Short URL not found after {attempts} attempts for key {key}")]
    RecordUnavailable { key: String, attempts: u32 },
}

impl From<VcsError> for CommitError {
    fn from(e: VcsError) -> Self {
        match e {
            VcsError::Conflict(msg) => CommitError::Conflict(msg),
            other => CommitError::Vcs(other),
        }
    }
}

#[derive(Clone)]
pub struct CommitPipeline {
    vcs: Arc<dyn VersionControl>,
    lookup: Arc<dyn ShortUrlStore>,
    settings: CommitSettings,
}

impl CommitPipeline {
    pub fn new(
        vcs: Arc<dyn VersionControl>,
        lookup: Arc<dyn ShortUrlStore>,
        settings: CommitSettings,
    ) -> Self {
        Self {
            vcs,
            lookup,
            settings,
        }
    }

    /// Runs the full commit-and-resolve flow for one request.
    pub async fn run(
        &self,
        latex_content: &str,
        commit_message: &str,
    ) -> Result<CommitOutcome, CommitError> {
        extract_timestamp(commit_message).ok_or(CommitError::MissingTimestamp)?;

        let revision = self.read_current().await?;

        let commit_sha = self
            .vcs
            .write_file(
                &self.settings.resume_path,
                latex_content,
                commit_message,
                &self.settings.branch,
                revision.as_deref(),
            )
            .await?;
        info!("Committed {} as {commit_sha}", self.settings.resume_path);

        let run = self.await_build(&commit_sha).await?;
        info!("Workflow run {} completed for {commit_sha}", run.id);

        // Cannot fail here: the message was validated above.
        let object_key =
            derive_object_key(commit_message).ok_or(CommitError::MissingTimestamp)?;
        debug!("Derived artifact key {object_key}");

        let record = self.await_record(&object_key).await?;

        Ok(CommitOutcome {
            short_url: record.short_url,
            commit_sha,
            object_key,
            run_id: run.id,
        })
    }

    /// Reading stage. A missing file is the create path, not an error; the
    /// write below then goes out without a revision SHA.
    async fn read_current(&self) -> Result<Option<String>, CommitError> {
        let revision = self
            .vcs
            .read_file(&self.settings.resume_path, &self.settings.branch)
            .await?;
        Ok(revision.map(|r| r.sha))
    }

    /// Polls the run feed until a completed run whose head SHA matches the
    /// commit appears. The feed lags a fresh push by a few seconds, so the
    /// first attempts routinely come back empty.
    async fn await_build(&self, commit_sha: &str) -> Result<BuildRun, CommitError> {
        let policy = &self.settings.build_poll;
        for attempt in 1..=policy.max_attempts {
            let runs = self
                .vcs
                .list_runs(&self.settings.branch, "push", RUN_FEED_PAGE_SIZE)
                .await?;
            if let Some(run) = runs
                .into_iter()
                .find(|r| r.head_sha == commit_sha && r.is_completed())
            {
                return Ok(run);
            }
            debug!(
                "No completed run for {commit_sha} yet (attempt {attempt}/{})",
                policy.max_attempts
            );
            tokio::time::sleep(policy.interval).await;
        }
        Err(CommitError::BuildTimeout)
    }

    /// Polls the short-URL table with doubling backoff until the shortener
    /// has written a record for `key`. The read itself is strongly
    /// consistent; the backoff covers the record not having been written
    /// yet at all.
    async fn await_record(&self, key: &str) -> Result<ShortUrlRecord, CommitError> {
        let policy = &self.settings.record_poll;
        let mut delay = policy.initial_delay;
        for attempt in 1..=policy.max_attempts {
            if let Some(record) = self.lookup.get_consistent(key).await? {
                return Ok(record);
            }
            warn!(
                "Attempt {attempt} failed to fetch short URL for {key}. Retrying in {}ms...",
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
        Err(CommitError::RecordUnavailable {
            key: key.to_string(),
            attempts: policy.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::fakes::{FakeStore, FakeVcs, WriteScript};
    use crate::github::FileRevision;
    use std::sync::atomic::Ordering;

    const LATEX: &str = "\\documentclass{article}\\begin{document}hi\\end{document}";
    const MESSAGE: &str = "Applying to ACME at 20250610T165845Z";

    fn pipeline(vcs: FakeVcs, store: FakeStore) -> (CommitPipeline, Arc<FakeVcs>, Arc<FakeStore>) {
        let vcs = Arc::new(vcs);
        let store = Arc::new(store);
        let pipeline = CommitPipeline::new(
            vcs.clone() as Arc<dyn VersionControl>,
            store.clone() as Arc<dyn ShortUrlStore>,
            CommitSettings::default(),
        );
        (pipeline, vcs, store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path_commit_to_short_url() {
        let mut vcs = FakeVcs::default();
        vcs.completed_after = Some(3);
        let (pipeline, vcs, store) = pipeline(vcs, FakeStore::available_after(1));

        let outcome = pipeline.run(LATEX, MESSAGE).await.unwrap();

        assert_eq!(outcome.short_url, "https://short.ly/xyz");
        assert_eq!(outcome.commit_sha, "abc123");
        assert_eq!(
            outcome.object_key,
            "resumes/RESUME_ACME_20250610T165845Z.pdf"
        );
        assert_eq!(vcs.run_polls.load(Ordering::SeqCst), 3);
        assert_eq!(store.gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_timestamp_fails_before_any_call() {
        let (pipeline, vcs, store) = pipeline(FakeVcs::default(), FakeStore::available_after(1));

        let err = pipeline.run(LATEX, "Applying to ACME").await.unwrap_err();

        assert!(matches!(err, CommitError::MissingTimestamp));
        assert_eq!(vcs.reads.load(Ordering::SeqCst), 0);
        assert_eq!(vcs.writes.load(Ordering::SeqCst), 0);
        assert_eq!(vcs.run_polls.load(Ordering::SeqCst), 0);
        assert_eq!(store.gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_file_commits_without_revision() {
        let mut vcs = FakeVcs::default();
        vcs.existing = None;
        let (pipeline, vcs, _store) = pipeline(vcs, FakeStore::available_after(1));

        pipeline.run(LATEX, MESSAGE).await.unwrap();

        let call = vcs.last_write.lock().unwrap().clone().unwrap();
        assert!(call.revision.is_none());
        assert_eq!(call.message, MESSAGE);
        assert_eq!(call.branch, "main");
    }

    #[tokio::test]
    async fn test_existing_file_commits_with_its_revision() {
        let mut vcs = FakeVcs::default();
        vcs.existing = Some(FileRevision {
            content: "old".to_string(),
            sha: "old-sha".to_string(),
        });
        let (pipeline, vcs, _store) = pipeline(vcs, FakeStore::available_after(1));

        pipeline.run(LATEX, MESSAGE).await.unwrap();

        let call = vcs.last_write.lock().unwrap().clone().unwrap();
        assert_eq!(call.revision.as_deref(), Some("old-sha"));
        assert_eq!(call.content, LATEX);
    }

    #[tokio::test]
    async fn test_read_failure_is_upstream_and_skips_write() {
        let mut vcs = FakeVcs::default();
        vcs.read_fails = true;
        let (pipeline, vcs, store) = pipeline(vcs, FakeStore::available_after(1));

        let err = pipeline.run(LATEX, MESSAGE).await.unwrap_err();

        assert!(matches!(err, CommitError::Vcs(_)));
        assert_eq!(vcs.writes.load(Ordering::SeqCst), 0);
        assert_eq!(store.gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_write_failure_stops_pipeline_before_polling() {
        let mut vcs = FakeVcs::default();
        vcs.write_script = WriteScript::Fail;
        let (pipeline, vcs, store) = pipeline(vcs, FakeStore::available_after(1));

        let err = pipeline.run(LATEX, MESSAGE).await.unwrap_err();

        assert!(matches!(err, CommitError::Vcs(_)));
        assert_eq!(vcs.run_polls.load(Ordering::SeqCst), 0);
        assert_eq!(store.gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_revision_surfaces_as_conflict() {
        let mut vcs = FakeVcs::default();
        vcs.write_script = WriteScript::Conflict;
        let (pipeline, _vcs, _store) = pipeline(vcs, FakeStore::available_after(1));

        let err = pipeline.run(LATEX, MESSAGE).await.unwrap_err();

        assert!(matches!(err, CommitError::Conflict(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_build_timeout_after_sixty_attempts() {
        let mut vcs = FakeVcs::default();
        vcs.completed_after = None;
        let (pipeline, vcs, store) = pipeline(vcs, FakeStore::available_after(1));

        let started = tokio::time::Instant::now();
        let err = pipeline.run(LATEX, MESSAGE).await.unwrap_err();

        assert!(matches!(err, CommitError::BuildTimeout));
        assert_eq!(err.to_string(), "Timeout waiting for workflow run");
        assert_eq!(vcs.run_polls.load(Ordering::SeqCst), 60);
        assert!(started.elapsed() >= Duration::from_secs(300));
        // No lookup queries after a build timeout.
        assert_eq!(store.gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_backoff_sums_to_7500ms_on_fifth_attempt() {
        let (pipeline, _vcs, store) = pipeline(FakeVcs::default(), FakeStore::available_after(5));

        let started = tokio::time::Instant::now();
        let outcome = pipeline.run(LATEX, MESSAGE).await.unwrap();

        assert_eq!(outcome.short_url, "https://short.ly/xyz");
        assert_eq!(store.gets.load(Ordering::SeqCst), 5);
        // 500 + 1000 + 2000 + 4000 ms elapse before the fifth, successful read.
        assert_eq!(started.elapsed(), Duration::from_millis(7500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_exhaustion_after_five_attempts() {
        let (pipeline, _vcs, store) = pipeline(FakeVcs::default(), FakeStore::never());

        let started = tokio::time::Instant::now();
        let err = pipeline.run(LATEX, MESSAGE).await.unwrap_err();

        assert!(matches!(
            err,
            CommitError::RecordUnavailable { attempts: 5, .. }
        ));
        assert_eq!(
            err.to_string(),
            "Short URL not found after 5 attempts for key resumes/RESUME_ACME_20250610T165845Z.pdf"
        );
        assert_eq!(store.gets.load(Ordering::SeqCst), 5);
        assert_eq!(started.elapsed(), Duration::from_millis(15500));
    }

    #[tokio::test]
    async fn test_accepts_freshly_minted_timestamp() {
        let token = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let message = format!("Applying to ACME at {token}");
        let (pipeline, _vcs, _store) = pipeline(FakeVcs::default(), FakeStore::available_after(1));

        let outcome = pipeline.run(LATEX, &message).await.unwrap();

        assert_eq!(outcome.object_key, format!("resumes/RESUME_ACME_{token}.pdf"));
    }
}
