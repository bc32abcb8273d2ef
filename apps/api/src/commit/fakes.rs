//! Scripted stand-ins for the version-control and lookup-store traits.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::github::{BuildRun, FileRevision, VcsError, VersionControl};
use crate::lookup::{LookupError, ShortUrlRecord, ShortUrlStore};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WriteScript {
    Succeed,
    Conflict,
    Fail,
}

/// Arguments of the most recent `write_file` call.
#[derive(Debug, Clone)]
pub struct WriteCall {
    pub path: String,
    pub content: String,
    pub message: String,
    pub branch: String,
    pub revision: Option<String>,
}

pub struct FakeVcs {
    /// What `read_file` returns; `None` models a repo without the file.
    pub existing: Option<FileRevision>,
    pub read_fails: bool,
    pub write_script: WriteScript,
    /// Commit SHA handed back by a successful write.
    pub commit_sha: String,
    /// The run feed reports a matching completed run from this poll attempt
    /// on (1-based). `None` means the run never completes.
    pub completed_after: Option<u32>,
    pub reads: AtomicU32,
    pub writes: AtomicU32,
    pub run_polls: AtomicU32,
    pub last_write: Mutex<Option<WriteCall>>,
}

impl Default for FakeVcs {
    fn default() -> Self {
        Self {
            existing: Some(FileRevision {
                content: "\\documentclass{article}".to_string(),
                sha: "old-sha".to_string(),
            }),
            read_fails: false,
            write_script: WriteScript::Succeed,
            commit_sha: "abc123".to_string(),
            completed_after: Some(1),
            reads: AtomicU32::new(0),
            writes: AtomicU32::new(0),
            run_polls: AtomicU32::new(0),
            last_write: Mutex::new(None),
        }
    }
}

#[async_trait]
impl VersionControl for FakeVcs {
    async fn read_file(
        &self,
        _path: &str,
        _git_ref: &str,
    ) -> Result<Option<FileRevision>, VcsError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.read_fails {
            return Err(VcsError::Api {
                status: 500,
                message: "read exploded".to_string(),
            });
        }
        Ok(self.existing.clone())
    }

    async fn write_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
        branch: &str,
        revision: Option<&str>,
    ) -> Result<String, VcsError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        *self.last_write.lock().unwrap() = Some(WriteCall {
            path: path.to_string(),
            content: content.to_string(),
            message: message.to_string(),
            branch: branch.to_string(),
            revision: revision.map(str::to_string),
        });
        match self.write_script {
            WriteScript::Succeed => Ok(self.commit_sha.clone()),
            WriteScript::Conflict => Err(VcsError::Conflict(
                "resume.tex does not match expected sha".to_string(),
            )),
            WriteScript::Fail => Err(VcsError::Api {
                status: 502,
                message: "bad gateway".to_string(),
            }),
        }
    }

    async fn list_runs(
        &self,
        _branch: &str,
        _event: &str,
        _per_page: u32,
    ) -> Result<Vec<BuildRun>, VcsError> {
        let attempt = self.run_polls.fetch_add(1, Ordering::SeqCst) + 1;
        // An older completed run from a previous commit is always present,
        // so matching must go by head SHA, not by status alone.
        let mut feed = vec![BuildRun {
            id: 7,
            head_sha: "previous-commit".to_string(),
            status: "completed".to_string(),
            conclusion: Some("success".to_string()),
        }];
        match self.completed_after {
            Some(n) if attempt >= n => feed.insert(
                0,
                BuildRun {
                    id: 42,
                    head_sha: self.commit_sha.clone(),
                    status: "completed".to_string(),
                    conclusion: Some("success".to_string()),
                },
            ),
            _ => feed.insert(
                0,
                BuildRun {
                    id: 42,
                    head_sha: self.commit_sha.clone(),
                    status: "in_progress".to_string(),
                    conclusion: None,
                },
            ),
        }
        Ok(feed)
    }
}

pub struct FakeStore {
    /// `get_consistent` returns a record from this call on (1-based).
    /// `None` means the shortener never writes one.
    pub available_after: Option<u32>,
    pub short_url: String,
    pub gets: AtomicU32,
    /// Rows returned by `list_records`.
    pub records: Mutex<Vec<ShortUrlRecord>>,
}

impl FakeStore {
    pub fn available_after(n: u32) -> Self {
        Self {
            available_after: Some(n),
            short_url: "https://short.ly/xyz".to_string(),
            gets: AtomicU32::new(0),
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn never() -> Self {
        Self {
            available_after: None,
            ..Self::available_after(0)
        }
    }
}

#[async_trait]
impl ShortUrlStore for FakeStore {
    async fn get_consistent(&self, key: &str) -> Result<Option<ShortUrlRecord>, LookupError> {
        let attempt = self.gets.fetch_add(1, Ordering::SeqCst) + 1;
        match self.available_after {
            Some(n) if attempt >= n => Ok(Some(ShortUrlRecord {
                s3_key: key.to_string(),
                short_url: self.short_url.clone(),
                company: "ACME".to_string(),
                timestamp: "20250610T165845Z".to_string(),
            })),
            _ => Ok(None),
        }
    }

    async fn list_records(&self) -> Result<Vec<ShortUrlRecord>, LookupError> {
        Ok(self.records.lock().unwrap().clone())
    }
}
