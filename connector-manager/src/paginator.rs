//! Drives a connector until its result set is exhausted.
//!
//! Pages come out of a lazy stream. Every vendor round-trip is wrapped in
//! the retry policy, so only transient failures are retried and exhausting
//! the attempts ends the stream with an error.

use crate::connector::Connector;
use crate::types::{FetchStyle, Page, ReportStatus, Session};
use adsync::{FetchError, ReportRequest, RetryPolicy};
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Upper bound on cursor pages for one request.
pub const DEFAULT_MAX_PAGES: usize = 10_000;

/// Report-job polling limits.
#[derive(Debug, Clone, Copy)]
pub struct ReportWait {
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl Default for ReportWait {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            max_wait: Duration::from_secs(600),
        }
    }
}

enum CursorState {
    Start,
    Next(String, usize),
    Finished,
}

/// One pass over one request. Consumed by `pages()`/`collect_records()`;
/// paginate again with a fresh paginator to start over.
pub struct Paginator<'a> {
    connector: &'a dyn Connector,
    session: &'a Session,
    request: &'a ReportRequest,
    retry: &'a RetryPolicy,
    wait: ReportWait,
    max_pages: usize,
}

impl<'a> Paginator<'a> {
    pub fn new(
        connector: &'a dyn Connector,
        session: &'a Session,
        request: &'a ReportRequest,
        retry: &'a RetryPolicy,
    ) -> Self {
        Self {
            connector,
            session,
            request,
            retry,
            wait: ReportWait::default(),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_report_wait(mut self, wait: ReportWait) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Lazy stream of pages in fetch order.
    pub fn pages(self) -> impl Stream<Item = Result<Page, FetchError>> + Send + 'a {
        match self.connector.fetch_style() {
            FetchStyle::Cursor => self.cursor_pages().left_stream(),
            FetchStyle::ReportJob => self.report_pages().right_stream(),
        }
    }

    /// All records of all pages, concatenated.
    pub async fn collect_records(self) -> Result<Vec<Value>, FetchError> {
        self.pages()
            .try_fold(Vec::new(), |mut acc, page| async move {
                acc.extend(page.records);
                Ok(acc)
            })
            .await
    }

    fn cursor_pages(self) -> impl Stream<Item = Result<Page, FetchError>> + Send + 'a {
        let Paginator {
            connector,
            session,
            request,
            retry,
            max_pages,
            ..
        } = self;

        stream::try_unfold(CursorState::Start, move |state| async move {
            let (cursor, fetched) = match state {
                CursorState::Finished => return Ok(None),
                CursorState::Start => (None, 0),
                CursorState::Next(cursor, fetched) => (Some(cursor), fetched),
            };

            if fetched >= max_pages {
                return Err(FetchError::Vendor(format!(
                    "pagination did not finish within {} pages",
                    max_pages
                )));
            }

            let page = retry
                .run("fetch page", || connector.fetch_page(session, request, cursor.as_deref()))
                .await?;
            debug!(
                connector = %connector.name(),
                account_id = %request.scope,
                page = fetched + 1,
                records = page.records.len(),
                "Fetched page"
            );

            let next = match &page.next {
                Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                    return Err(FetchError::Vendor(format!(
                        "vendor returned the same cursor '{}' twice",
                        next
                    )));
                }
                Some(next) => CursorState::Next(next.clone(), fetched + 1),
                None => CursorState::Finished,
            };
            Ok(Some((page, next)))
        })
    }

    fn report_pages(self) -> impl Stream<Item = Result<Page, FetchError>> + Send + 'a {
        stream::once(async move { self.run_report_job().await })
    }

    async fn run_report_job(self) -> Result<Page, FetchError> {
        let Paginator {
            connector,
            session,
            request,
            retry,
            wait,
            ..
        } = self;

        let prepared = retry
            .run("prepare report", || connector.prepare_report(session, request))
            .await?;
        let job = retry
            .run("submit report", || connector.submit_report(session, &prepared))
            .await?;
        info!(connector = %connector.name(), account_id = %request.scope, job_id = %job.id, "Report job submitted");

        let deadline = Instant::now() + wait.max_wait;
        let artifact = loop {
            let status = retry
                .run("poll report", || connector.poll_report(session, &job))
                .await?;
            match status {
                ReportStatus::Done { artifact } => break artifact,
                ReportStatus::Failed(reason) => return Err(FetchError::ReportFailed(reason)),
                ReportStatus::Pending => {
                    if Instant::now() + wait.poll_interval > deadline {
                        return Err(FetchError::ReportTimeout(wait.max_wait));
                    }
                    debug!(job_id = %job.id, "Report not ready yet");
                    tokio::time::sleep(wait.poll_interval).await;
                }
            }
        };

        let Some(artifact) = artifact else {
            info!(job_id = %job.id, "Report finished without an artifact");
            return Ok(Page::default());
        };

        let records = retry
            .run("download report", || connector.download_report(session, &artifact))
            .await?;
        info!(job_id = %job.id, records = records.len(), "Report downloaded");
        Ok(Page::last(records))
    }
}
