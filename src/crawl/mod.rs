//! Drive corpus enumeration
//!
//! Two crawl strategies produce one stream of candidate files:
//! - a scoped walk descending from configured root folders
//! - a full scan over everything the access token can read
//!
//! Listing is paginated and every page fetch goes through the shared retry
//! and rate-limit stack. Files are re-filtered client-side because the
//! server-side `mimeType contains` clause matches more broadly than the
//! registered extractors do.

use crate::config::DriveConfig;
use crate::drive::{ApiError, DriveClient, DriveFile};
use crate::extract::FilterTerms;
use crate::retry::RetryExecutor;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What part of the drive to enumerate
#[derive(Debug, Clone)]
pub enum CrawlScope {
    /// Recursive walk of the listed folder ids
    RootFolders(Vec<String>),
    /// Everything the token can read
    AllAccessible,
}

impl CrawlScope {
    pub fn from_config(config: &DriveConfig) -> Self {
        if config.all_accessible {
            CrawlScope::AllAccessible
        } else {
            CrawlScope::RootFolders(config.root_folder_ids.clone())
        }
    }
}

fn folder_query(folder_id: &str) -> String {
    format!("'{}' in parents and trashed=false", folder_id.replace('\'', "\\'"))
}

fn scan_query(terms: &FilterTerms) -> Option<String> {
    terms
        .to_query()
        .map(|clause| format!("trashed=false and {}", clause))
}

/// Streams matching files from the drive
pub struct Crawler {
    client: DriveClient,
    retry: RetryExecutor,
    cancel: CancellationToken,
    scope: CrawlScope,
}

impl Crawler {
    pub fn new(
        client: DriveClient,
        retry: RetryExecutor,
        cancel: CancellationToken,
        scope: CrawlScope,
    ) -> Self {
        Self {
            client,
            retry,
            cancel,
            scope,
        }
    }

    /// Spawn the crawl and return its file stream. The stream ends after the
    /// last page; a listing failure is delivered as the final item so the
    /// consumer can abort the pass.
    pub fn stream(self, terms: FilterTerms, buffer: usize) -> mpsc::Receiver<Result<DriveFile, ApiError>> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        tokio::spawn(async move {
            let result = match &self.scope {
                CrawlScope::RootFolders(roots) => self.walk_folders(roots.clone(), &terms, &tx).await,
                CrawlScope::AllAccessible => self.full_scan(&terms, &tx).await,
            };
            if let Err(err) = result {
                warn!(error = %err, "crawl aborted");
                let _ = tx.send(Err(err)).await;
            }
        });
        rx
    }

    async fn send(
        &self,
        tx: &mpsc::Sender<Result<DriveFile, ApiError>>,
        file: DriveFile,
    ) -> Result<(), ApiError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ApiError::Shutdown),
            sent = tx.send(Ok(file)) => sent.map_err(|_| ApiError::Shutdown),
        }
    }

    /// Fetch one listing page through the retry stack
    async fn fetch_page(
        &self,
        q: &str,
        page_token: Option<&str>,
    ) -> Result<crate::drive::FilePage, ApiError> {
        if self.cancel.is_cancelled() {
            return Err(ApiError::Shutdown);
        }
        self.retry
            .execute(|| self.client.list_page(q, page_token))
            .await
    }

    async fn walk_folders(
        &self,
        roots: Vec<String>,
        terms: &FilterTerms,
        tx: &mpsc::Sender<Result<DriveFile, ApiError>>,
    ) -> Result<(), ApiError> {
        let mut pending: Vec<String> = roots;
        let mut seen: HashSet<String> = pending.iter().cloned().collect();
        let mut matched: u64 = 0;

        while let Some(folder_id) = pending.pop() {
            debug!(folder = %folder_id, "listing folder");
            let q = folder_query(&folder_id);
            let mut page_token: Option<String> = None;

            loop {
                let page = self.fetch_page(&q, page_token.as_deref()).await?;
                for file in page.files {
                    if file.is_folder() {
                        if seen.insert(file.id.clone()) {
                            pending.push(file.id.clone());
                        }
                        continue;
                    }
                    // Shortcuts would alias content outside the scope.
                    if file.is_shortcut() {
                        continue;
                    }
                    if terms.matches(&file) {
                        matched += 1;
                        self.send(tx, file).await?;
                    }
                }
                match page.next_page_token {
                    Some(token) => page_token = Some(token),
                    None => break,
                }
            }
        }

        info!(folders = seen.len(), files = matched, "folder walk complete");
        Ok(())
    }

    async fn full_scan(
        &self,
        terms: &FilterTerms,
        tx: &mpsc::Sender<Result<DriveFile, ApiError>>,
    ) -> Result<(), ApiError> {
        let Some(q) = scan_query(terms) else {
            info!("no extractors enabled, nothing to scan");
            return Ok(());
        };

        let mut matched: u64 = 0;
        let mut pages: u64 = 0;
        let mut page_token: Option<String> = None;
        loop {
            let page = self.fetch_page(&q, page_token.as_deref()).await?;
            pages += 1;
            for file in page.files {
                if file.is_folder() || file.is_shortcut() {
                    continue;
                }
                if terms.matches(&file) {
                    matched += 1;
                    self.send(tx, file).await?;
                }
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        info!(pages, files = matched, "full scan complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::limiter::RateLimiter;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn crawler(base_url: &str, scope: CrawlScope) -> Crawler {
        let drive = DriveConfig {
            base_url: base_url.to_string(),
            ..DriveConfig::default()
        };
        let cancel = CancellationToken::new();
        let retry = RetryExecutor::new(
            &RetryConfig {
                max_retries: 2,
                base_delay_secs: 0.01,
                max_delay_secs: 0.05,
            },
            RateLimiter::new(1000.0, 1000.0),
            cancel.clone(),
        );
        Crawler::new(DriveClient::new(&drive).unwrap(), retry, cancel, scope)
    }

    fn text_terms() -> FilterTerms {
        FilterTerms {
            mime_types: Vec::new(),
            mime_prefixes: vec!["text/".to_string()],
            extensions: Vec::new(),
        }
    }

    async fn collect(
        mut rx: tokio::sync::mpsc::Receiver<Result<DriveFile, ApiError>>,
    ) -> (Vec<DriveFile>, Option<ApiError>) {
        let mut files = Vec::new();
        while let Some(item) = rx.recv().await {
            match item {
                Ok(file) => files.push(file),
                Err(err) => return (files, Some(err)),
            }
        }
        (files, None)
    }

    #[tokio::test]
    async fn test_walk_descends_and_skips_shortcuts() {
        let server = MockServer::start().await;

        // Root folder: one subfolder, one match, one shortcut.
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(query_param("q", "'root' in parents and trashed=false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [
                    {"id": "sub", "name": "child", "mimeType": crate::drive::FOLDER_MIME},
                    {"id": "f1", "name": "notes.txt", "mimeType": "text/plain"},
                    {"id": "sc", "name": "alias", "mimeType": crate::drive::SHORTCUT_MIME},
                ]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(query_param("q", "'sub' in parents and trashed=false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [
                    {"id": "f2", "name": "deep.txt", "mimeType": "text/plain"},
                    {"id": "img", "name": "photo.png", "mimeType": "image/png"},
                ]
            })))
            .mount(&server)
            .await;

        let crawler = crawler(
            &server.uri(),
            CrawlScope::RootFolders(vec!["root".to_string()]),
        );
        let (files, err) = collect(crawler.stream(text_terms(), 8)).await;

        assert!(err.is_none());
        let mut ids: Vec<&str> = files.iter().map(|f| f.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["f1", "f2"]);
    }

    #[tokio::test]
    async fn test_walk_follows_pagination() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(query_param("pageToken", "next"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{"id": "f2", "name": "b.txt", "mimeType": "text/plain"}]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{"id": "f1", "name": "a.txt", "mimeType": "text/plain"}],
                "nextPageToken": "next"
            })))
            .mount(&server)
            .await;

        let crawler = crawler(
            &server.uri(),
            CrawlScope::RootFolders(vec!["root".to_string()]),
        );
        let (files, err) = collect(crawler.stream(text_terms(), 8)).await;

        assert!(err.is_none());
        assert_eq!(files.len(), 2);
    }

    #[tokio::test]
    async fn test_listing_retries_through_rate_limit_responses() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{"id": "f1", "name": "a.txt", "mimeType": "text/plain"}]
            })))
            .mount(&server)
            .await;

        let crawler = crawler(
            &server.uri(),
            CrawlScope::RootFolders(vec!["root".to_string()]),
        );
        let (files, err) = collect(crawler.stream(text_terms(), 8)).await;

        assert!(err.is_none());
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_fatal_listing_error_ends_the_stream() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(403).set_body_string("insufficient scope"))
            .mount(&server)
            .await;

        let crawler = crawler(
            &server.uri(),
            CrawlScope::RootFolders(vec!["root".to_string()]),
        );
        let (files, err) = collect(crawler.stream(text_terms(), 8)).await;

        assert!(files.is_empty());
        assert!(matches!(err, Some(ApiError::Status { status: 403, .. })));
    }

    #[tokio::test]
    async fn test_full_scan_refilters_client_side() {
        let server = MockServer::start().await;

        // Server-side "contains" can return MIME types no extractor claims.
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [
                    {"id": "f1", "name": "a.txt", "mimeType": "text/plain"},
                    {"id": "f2", "name": "odd", "mimeType": "textual/other"},
                ]
            })))
            .mount(&server)
            .await;

        let crawler = crawler(&server.uri(), CrawlScope::AllAccessible);
        let (files, err) = collect(crawler.stream(text_terms(), 8)).await;

        assert!(err.is_none());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, "f1");
    }

    #[test]
    fn test_folder_query_shape() {
        assert_eq!(
            folder_query("abc123"),
            "'abc123' in parents and trashed=false"
        );
    }

    #[test]
    fn test_scan_query_combines_terms() {
        let terms = FilterTerms {
            mime_types: vec!["application/pdf".to_string()],
            mime_prefixes: vec!["text/".to_string()],
            extensions: vec!["md".to_string()],
        };
        let q = scan_query(&terms).unwrap();
        assert!(q.starts_with("trashed=false and ("));
        assert!(q.contains("mimeType='application/pdf'"));
        assert!(q.contains("mimeType contains 'text/'"));
        assert!(q.contains("fileExtension='md'"));
    }

    #[test]
    fn test_scan_query_empty_terms() {
        assert!(scan_query(&FilterTerms::default()).is_none());
    }

    #[test]
    fn test_scope_from_config() {
        let config = DriveConfig {
            all_accessible: true,
            ..DriveConfig::default()
        };
        assert!(matches!(
            CrawlScope::from_config(&config),
            CrawlScope::AllAccessible
        ));

        let config = DriveConfig {
            all_accessible: false,
            root_folder_ids: vec!["root1".to_string()],
            ..DriveConfig::default()
        };
        match CrawlScope::from_config(&config) {
            CrawlScope::RootFolders(roots) => assert_eq!(roots, vec!["root1".to_string()]),
            other => panic!("unexpected scope {:?}", other),
        }
    }
}
