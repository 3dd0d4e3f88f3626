//! Parallel multi-backend fan-out with merge, dedup and ordering.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::{BackendEndpoint, BackendRegistry, RegisteredBackend};
use crate::config::MultiBackendConfig;
use crate::error::{Error, Result};
use crate::models::NLWebResult;

/// One hit as gathered from a backend, before merge ordering.
struct Gathered {
    result: NLWebResult,
    priority: i32,
    arrival: usize,
}

/// Outcome of a single backend call.
enum CallOutcome {
    Hits(Vec<NLWebResult>),
    Unsearchable,
    Failed,
}

/// Orchestrates queries across all enabled backends.
///
/// Owns the registry for the process lifetime. Individual backend failures
/// and timeouts are absorbed: the query succeeds with whatever was gathered
/// as long as at least one backend succeeded.
pub struct BackendManager {
    registry: BackendRegistry,
    config: MultiBackendConfig,
}

impl BackendManager {
    /// Build a manager over a populated registry.
    #[must_use]
    pub fn new(registry: BackendRegistry, config: MultiBackendConfig) -> Self {
        Self { registry, config }
    }

    /// The designated ingestion sink, if any. Not used on the read path.
    #[must_use]
    pub fn write_endpoint(&self) -> Option<&BackendEndpoint> {
        self.registry.write_endpoint()
    }

    /// Access the underlying registry.
    #[must_use]
    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Query enabled backends and return the merged, ordered result set.
    ///
    /// Ordering is deterministic given identical inputs, backend outputs and
    /// completion order: score descending, then backend priority descending,
    /// then arrival order.
    #[tracing::instrument(skip(self, query, cancel))]
    pub async fn query(
        &self,
        query: &str,
        site: Option<&str>,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<NLWebResult>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let enabled = self.registry.enabled();
        if enabled.is_empty() {
            return Err(Error::NoBackends);
        }
        // With multi-backend querying off, only the highest-priority backend
        // participates.
        let targets: Vec<&RegisteredBackend> = if self.config.enabled {
            enabled
        } else {
            enabled.into_iter().take(1).collect()
        };

        let gathered = if self.config.enable_parallel_querying && targets.len() > 1 {
            self.query_parallel(&targets, query, site, max_results, cancel)
                .await?
        } else {
            self.query_serial(&targets, query, site, max_results, cancel)
                .await?
        };

        let (mut merged, successes, failures) = gathered;
        if successes == 0 && failures > 0 {
            return Err(Error::BackendUnavailable(format!(
                "all {failures} queried backend(s) failed"
            )));
        }

        if self.config.enable_result_deduplication {
            merged = deduplicate(merged);
        }
        merged.sort_by(|a, b| {
            b.result
                .score
                .total_cmp(&a.result.score)
                .then(b.priority.cmp(&a.priority))
                .then(a.arrival.cmp(&b.arrival))
        });
        merged.truncate(max_results);

        Ok(merged.into_iter().map(|g| g.result).collect())
    }

    async fn query_parallel(
        &self,
        targets: &[&RegisteredBackend],
        query: &str,
        site: Option<&str>,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Result<(Vec<Gathered>, usize, usize)> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_queries));
        let timeout = Duration::from_secs(self.config.backend_timeout_secs);

        let mut futures = FuturesUnordered::new();
        for entry in targets {
            let semaphore = Arc::clone(&semaphore);
            let backend = Arc::clone(&entry.backend);
            let id = entry.endpoint.id.clone();
            let priority = entry.endpoint.priority;
            let query = query.to_string();
            let site = site.map(str::to_string);
            let call_cancel = cancel.child_token();
            futures.push(async move {
                // Queue behind the concurrency cap; slots free as calls finish
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = run_backend_call(
                    backend.as_ref(),
                    &id,
                    &query,
                    site.as_deref(),
                    max_results,
                    timeout,
                    &call_cancel,
                )
                .await;
                (id, priority, outcome)
            });
        }

        let mut merged = Vec::new();
        let mut successes = 0usize;
        let mut failures = 0usize;
        loop {
            let next = tokio::select! {
                next = futures.next() => next,
                () = cancel.cancelled() => return Err(Error::Cancelled),
            };
            let Some((id, priority, outcome)) = next else {
                break;
            };
            record_outcome(
                &mut merged,
                &mut successes,
                &mut failures,
                &id,
                priority,
                outcome,
            );
        }

        Ok((merged, successes, failures))
    }

    async fn query_serial(
        &self,
        targets: &[&RegisteredBackend],
        query: &str,
        site: Option<&str>,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Result<(Vec<Gathered>, usize, usize)> {
        let timeout = Duration::from_secs(self.config.backend_timeout_secs);

        let mut merged = Vec::new();
        let mut successes = 0usize;
        let mut failures = 0usize;
        for entry in targets {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let call_cancel = cancel.child_token();
            let outcome = run_backend_call(
                entry.backend.as_ref(),
                &entry.endpoint.id,
                query,
                site,
                max_results,
                timeout,
                &call_cancel,
            )
            .await;
            record_outcome(
                &mut merged,
                &mut successes,
                &mut failures,
                &entry.endpoint.id,
                entry.endpoint.priority,
                outcome,
            );
        }

        Ok((merged, successes, failures))
    }
}

async fn run_backend_call(
    backend: &dyn super::DataBackend,
    id: &str,
    query: &str,
    site: Option<&str>,
    max_results: usize,
    timeout: Duration,
    cancel: &CancellationToken,
) -> CallOutcome {
    let call = backend.search(query, site, max_results, cancel);
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(results)) => {
            tracing::debug!(backend = id, hits = results.len(), "Backend returned");
            CallOutcome::Hits(results)
        }
        Ok(Err(Error::NotImplemented(_))) => {
            // Enabled but unsearchable; not a failure
            tracing::debug!(backend = id, "Backend does not implement search, skipping");
            CallOutcome::Unsearchable
        }
        Ok(Err(err)) => {
            tracing::warn!(backend = id, error = %err, "Backend query failed");
            CallOutcome::Failed
        }
        Err(_elapsed) => {
            cancel.cancel();
            tracing::warn!(
                backend = id,
                timeout_secs = timeout.as_secs(),
                "Backend query timed out, discarding partial results"
            );
            CallOutcome::Failed
        }
    }
}

fn record_outcome(
    merged: &mut Vec<Gathered>,
    successes: &mut usize,
    failures: &mut usize,
    id: &str,
    priority: i32,
    outcome: CallOutcome,
) {
    match outcome {
        CallOutcome::Hits(results) => {
            *successes += 1;
            for mut result in results {
                result.backend_source = id.to_string();
                let arrival = merged.len();
                merged.push(Gathered {
                    result,
                    priority,
                    arrival,
                });
            }
        }
        CallOutcome::Unsearchable => {}
        CallOutcome::Failed => *failures += 1,
    }
}

/// Deduplicate by normalized URL. On collision keep the higher score, then
/// the higher backend priority, then the first-seen entry.
fn deduplicate(gathered: Vec<Gathered>) -> Vec<Gathered> {
    let mut kept: Vec<Gathered> = Vec::with_capacity(gathered.len());
    let mut by_url: HashMap<String, usize> = HashMap::with_capacity(gathered.len());

    for candidate in gathered {
        let key = candidate.result.dedup_key();
        match by_url.get(&key) {
            None => {
                by_url.insert(key, kept.len());
                kept.push(candidate);
            }
            Some(&index) => {
                let existing = &kept[index];
                let replace = match candidate.result.score.total_cmp(&existing.result.score) {
                    std::cmp::Ordering::Greater => true,
                    std::cmp::Ordering::Equal => candidate.priority > existing.priority,
                    std::cmp::Ordering::Less => false,
                };
                if replace {
                    kept[index] = candidate;
                }
            }
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::DataBackend;
    use async_trait::async_trait;
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedBackend {
        results: Vec<NLWebResult>,
        calls: AtomicUsize,
        delay: Option<Duration>,
        fail: bool,
        not_implemented: bool,
    }

    impl FixedBackend {
        fn returning(results: Vec<NLWebResult>) -> Self {
            Self {
                results,
                calls: AtomicUsize::new(0),
                delay: None,
                fail: false,
                not_implemented: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::returning(Vec::new())
            }
        }

        fn unsearchable() -> Self {
            Self {
                not_implemented: true,
                ..Self::returning(Vec::new())
            }
        }

        fn slow(results: Vec<NLWebResult>, delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::returning(results)
            }
        }
    }

    #[async_trait]
    impl DataBackend for FixedBackend {
        async fn search(
            &self,
            _query: &str,
            _site: Option<&str>,
            _max_results: usize,
            _cancel: &CancellationToken,
        ) -> Result<Vec<NLWebResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.not_implemented {
                return Err(Error::NotImplemented("search".into()));
            }
            if self.fail {
                return Err(Error::Internal("boom".into()));
            }
            Ok(self.results.clone())
        }
    }

    fn endpoint(id: &str, priority: i32) -> BackendEndpoint {
        BackendEndpoint {
            id: id.to_string(),
            enabled: true,
            backend_type: "fixed".to_string(),
            priority,
            properties: StdHashMap::new(),
        }
    }

    fn hit(url: &str, score: f64) -> NLWebResult {
        NLWebResult::new(url, url, score)
    }

    fn manager(
        backends: Vec<(BackendEndpoint, Arc<dyn DataBackend>)>,
        config: MultiBackendConfig,
    ) -> BackendManager {
        let mut registry = BackendRegistry::new();
        for (endpoint, backend) in backends {
            registry.register(endpoint, backend).unwrap();
        }
        BackendManager::new(registry, config)
    }

    fn config() -> MultiBackendConfig {
        MultiBackendConfig::default()
    }

    #[tokio::test]
    async fn test_merges_and_sorts_by_score() {
        let manager = manager(
            vec![
                (
                    endpoint("a", 0),
                    Arc::new(FixedBackend::returning(vec![
                        hit("https://a/1", 0.9),
                        hit("https://a/2", 0.3),
                    ])),
                ),
                (
                    endpoint("b", 0),
                    Arc::new(FixedBackend::returning(vec![hit("https://b/1", 0.7)])),
                ),
            ],
            config(),
        );

        let results = manager
            .query("q", None, 10, &CancellationToken::new())
            .await
            .unwrap();
        let urls: Vec<&str> = results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a/1", "https://b/1", "https://a/2"]);
        assert_eq!(results[0].backend_source, "a");
        assert_eq!(results[1].backend_source, "b");
    }

    #[tokio::test]
    async fn test_truncates_to_max_results() {
        let manager = manager(
            vec![(
                endpoint("a", 0),
                Arc::new(FixedBackend::returning(vec![
                    hit("https://a/1", 0.9),
                    hit("https://a/2", 0.8),
                    hit("https://a/3", 0.7),
                ])),
            )],
            config(),
        );

        let results = manager
            .query("q", None, 2, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].url, "https://a/2");
    }

    #[tokio::test]
    async fn test_dedup_keeps_higher_score() {
        let manager = manager(
            vec![
                (
                    endpoint("a", 0),
                    Arc::new(FixedBackend::returning(vec![hit("https://x/1", 0.4)])),
                ),
                (
                    endpoint("b", 0),
                    Arc::new(FixedBackend::returning(vec![hit("HTTPS://X/1", 0.8)])),
                ),
            ],
            MultiBackendConfig {
                // serial: deterministic arrival for the assertion below
                enable_parallel_querying: false,
                ..config()
            },
        );

        let results = manager
            .query("q", None, 10, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].backend_source, "b");
        assert!((results[0].score - 0.8).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_dedup_equal_score_prefers_priority_then_first_seen() {
        let manager = manager(
            vec![
                (
                    endpoint("low", 1),
                    Arc::new(FixedBackend::returning(vec![hit("https://x/1", 0.5)])),
                ),
                (
                    endpoint("high", 9),
                    Arc::new(FixedBackend::returning(vec![hit("https://x/1", 0.5)])),
                ),
                (
                    endpoint("high2", 9),
                    Arc::new(FixedBackend::returning(vec![hit("https://x/1", 0.5)])),
                ),
            ],
            MultiBackendConfig {
                enable_parallel_querying: false,
                ..config()
            },
        );

        let results = manager
            .query("q", None, 10, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        // Serial dispatch runs priority-descending: "high" arrives first and
        // wins the full tie against "high2"; "low" never displaces it.
        assert_eq!(results[0].backend_source, "high");
    }

    #[tokio::test]
    async fn test_dedup_disabled_keeps_collisions() {
        let manager = manager(
            vec![
                (
                    endpoint("a", 0),
                    Arc::new(FixedBackend::returning(vec![hit("https://x/1", 0.4)])),
                ),
                (
                    endpoint("b", 0),
                    Arc::new(FixedBackend::returning(vec![hit("https://x/1", 0.8)])),
                ),
            ],
            MultiBackendConfig {
                enable_result_deduplication: false,
                ..config()
            },
        );

        let results = manager
            .query("q", None, 10, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_all_backends_failing_is_unavailable() {
        let manager = manager(
            vec![
                (endpoint("a", 0), Arc::new(FixedBackend::failing())),
                (endpoint("b", 0), Arc::new(FixedBackend::failing())),
            ],
            config(),
        );

        let err = manager
            .query("q", None, 10, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn test_partial_failure_returns_survivors() {
        let manager = manager(
            vec![
                (endpoint("a", 0), Arc::new(FixedBackend::failing())),
                (
                    endpoint("b", 0),
                    Arc::new(FixedBackend::returning(vec![hit("https://b/1", 0.6)])),
                ),
            ],
            config(),
        );

        let results = manager
            .query("q", None, 10, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://b/1");
    }

    #[tokio::test]
    async fn test_unsearchable_backends_skipped_silently() {
        let manager = manager(
            vec![
                (endpoint("a", 0), Arc::new(FixedBackend::unsearchable())),
                (endpoint("b", 0), Arc::new(FixedBackend::unsearchable())),
            ],
            config(),
        );

        // Not-implemented is not a failure: empty success, not 502
        let results = manager
            .query("q", None, 10, &CancellationToken::new())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_no_enabled_backends_is_an_error() {
        let mut registry = BackendRegistry::new();
        registry
            .register(
                BackendEndpoint {
                    enabled: false,
                    ..endpoint("off", 0)
                },
                Arc::new(FixedBackend::returning(Vec::new())),
            )
            .unwrap();
        let manager = BackendManager::new(registry, config());

        let err = manager
            .query("q", None, 10, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoBackends));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_backend_is_discarded() {
        let manager = manager(
            vec![
                (
                    endpoint("slow", 0),
                    Arc::new(FixedBackend::slow(
                        vec![hit("https://slow/1", 0.99)],
                        Duration::from_secs(120),
                    )),
                ),
                (
                    endpoint("fast", 0),
                    Arc::new(FixedBackend::returning(vec![hit("https://fast/1", 0.5)])),
                ),
            ],
            MultiBackendConfig {
                backend_timeout_secs: 1,
                ..config()
            },
        );

        let results = manager
            .query("q", None, 10, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://fast/1");
    }

    #[tokio::test]
    async fn test_multi_backend_disabled_queries_top_priority_only() {
        let secondary = Arc::new(FixedBackend::returning(vec![hit("https://b/1", 0.9)]));
        let secondary_handle = Arc::clone(&secondary);
        let secondary: Arc<dyn DataBackend> = secondary;
        let manager = manager(
            vec![
                (
                    endpoint("primary", 10),
                    Arc::new(FixedBackend::returning(vec![hit("https://a/1", 0.2)])),
                ),
                (endpoint("secondary", 1), secondary),
            ],
            MultiBackendConfig {
                enabled: false,
                ..config()
            },
        );

        let results = manager
            .query("q", None, 10, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://a/1");
        assert_eq!(secondary_handle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_short_circuits() {
        let backend = Arc::new(FixedBackend::returning(vec![hit("https://a/1", 0.9)]));
        let backend_handle = Arc::clone(&backend);
        let backend: Arc<dyn DataBackend> = backend;
        let manager = manager(vec![(endpoint("a", 0), backend)], config());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = manager.query("q", None, 10, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(backend_handle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_deterministic_ordering_with_equal_scores() {
        // Equal (score, priority): arrival order decides, which under serial
        // dispatch is registration priority order
        let manager = manager(
            vec![
                (
                    endpoint("first", 5),
                    Arc::new(FixedBackend::returning(vec![hit("https://1", 0.5)])),
                ),
                (
                    endpoint("second", 5),
                    Arc::new(FixedBackend::returning(vec![hit("https://2", 0.5)])),
                ),
            ],
            MultiBackendConfig {
                enable_parallel_querying: false,
                ..config()
            },
        );

        let results = manager
            .query("q", None, 10, &CancellationToken::new())
            .await
            .unwrap();
        let urls: Vec<&str> = results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://1", "https://2"]);
    }
}
