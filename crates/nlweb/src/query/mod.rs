//! The query pipeline: processor, tool selection, handlers, generation, and
//! the [`QueryService`] façade composing them.

mod generator;
mod handlers;
mod processor;
mod tool_selection;

pub use generator::{GeneratedResponse, ResultGenerator};
pub use handlers::{
    ensemble_expansions, merge_ranked, split_comparison_subjects, CompareHandler, DetailsHandler,
    EnsembleHandler, HandlerContext, HandlerRegistry, SearchHandler, ToolHandler,
};
pub use processor::{ProcessedQuery, QueryProcessor};
pub use tool_selection::{ToolSelector, ToolType};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::backends::BackendManager;
use crate::chat::ChatClient;
use crate::config::NLWebConfig;
use crate::error::{Error, Result};
use crate::models::{FrameError, NLWebRequest, NLWebResponse, StreamFrame};
use crate::tools::ToolCatalog;

/// Streaming frames buffer at most this many entries before the producer
/// awaits the consumer.
const STREAM_CHANNEL_CAPACITY: usize = 16;

/// The request pipeline façade.
///
/// Owns every pipeline stage exclusively; shared across requests behind an
/// `Arc`. Rate limiting happens at the HTTP layer, the service trusts its
/// caller here.
pub struct QueryService {
    config: Arc<NLWebConfig>,
    processor: QueryProcessor,
    selector: ToolSelector,
    handlers: HandlerRegistry,
    backends: BackendManager,
    generator: ResultGenerator,
}

impl QueryService {
    /// Compose the pipeline.
    ///
    /// Validates the configuration and the tool definitions document eagerly;
    /// a service that constructs successfully accepts requests.
    pub fn new(
        config: Arc<NLWebConfig>,
        backends: BackendManager,
        chat: Option<Arc<dyn ChatClient>>,
    ) -> Result<Self> {
        config.validate()?;
        let catalog = match &config.tool_definitions_path {
            Some(path) => ToolCatalog::from_path(path)?,
            None => ToolCatalog::load_default()?,
        };
        let handlers = HandlerRegistry::from_catalog(&catalog)?;

        Ok(Self {
            processor: QueryProcessor::new(Arc::clone(&config), chat.clone()),
            selector: ToolSelector::new(config.tool_selection_enabled),
            generator: ResultGenerator::new(Arc::clone(&config), chat),
            handlers,
            backends,
            config,
        })
    }

    /// The service configuration.
    #[must_use]
    pub fn config(&self) -> &Arc<NLWebConfig> {
        &self.config
    }

    /// The retrieval layer (write-endpoint lookup, health checks).
    #[must_use]
    pub fn backends(&self) -> &BackendManager {
        &self.backends
    }

    /// Run the unary pipeline under the per-request deadline.
    #[tracing::instrument(skip(self, request, cancel), fields(query_id))]
    pub async fn process(
        &self,
        request: &NLWebRequest,
        cancel: &CancellationToken,
    ) -> Result<NLWebResponse> {
        let deadline = Duration::from_secs(self.config.default_timeout_secs);
        let run_cancel = cancel.child_token();
        match tokio::time::timeout(deadline, self.run(request, &run_cancel)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                run_cancel.cancel();
                tracing::warn!(deadline_secs = deadline.as_secs(), "Request deadline exceeded");
                Err(Error::Cancelled)
            }
        }
    }

    async fn run(
        &self,
        request: &NLWebRequest,
        cancel: &CancellationToken,
    ) -> Result<NLWebResponse> {
        let processed = self.processor.process(request, cancel).await?;
        tracing::Span::current().record("query_id", processed.query_id.as_str());

        let output = self.execute_tool(&processed, cancel).await?;
        Ok(assemble_response(processed, output))
    }

    /// Start the streaming pipeline.
    ///
    /// Validation failures surface before any frame is produced. The returned
    /// stream is finite and non-restartable: `query_id` first, then
    /// `decontextualized_query`, `result` frames, an optional `summary`, and
    /// exactly one terminal `complete`/`error`. A cancelled stream ends
    /// without a terminal frame.
    pub fn process_stream(
        self: Arc<Self>,
        request: NLWebRequest,
        cancel: CancellationToken,
    ) -> Result<ReceiverStream<StreamFrame>> {
        request.validate(&self.config)?;

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let service = self;
        tokio::spawn(async move {
            service.stream_producer(request, cancel, tx).await;
        });
        Ok(ReceiverStream::new(rx))
    }

    async fn stream_producer(
        &self,
        mut request: NLWebRequest,
        cancel: CancellationToken,
        tx: mpsc::Sender<StreamFrame>,
    ) {
        // The first frame needs the id before the processor runs; resolve it
        // up front and the processor will preserve it.
        if request
            .query_id
            .as_deref()
            .map_or(true, |id| id.trim().is_empty())
        {
            request.query_id = Some(Uuid::new_v4().to_string());
        }
        let query_id = request.query_id.clone().unwrap_or_default();

        let deadline = Duration::from_secs(self.config.default_timeout_secs);
        let produce = async {
            if !send_frame(&tx, &cancel, StreamFrame::QueryId(query_id)).await {
                return;
            }

            let processed = match self.processor.process(&request, &cancel).await {
                Ok(processed) => processed,
                Err(err) => {
                    send_error_frame(&tx, &cancel, &err).await;
                    return;
                }
            };
            if !send_frame(
                &tx,
                &cancel,
                StreamFrame::DecontextualizedQuery(processed.decontextualized_query.clone()),
            )
            .await
            {
                return;
            }

            match self.execute_tool(&processed, &cancel).await {
                Ok(output) => {
                    for result in output.results {
                        if !send_frame(&tx, &cancel, StreamFrame::Result(result)).await {
                            return;
                        }
                    }
                    if let Some(summary) = output.summary {
                        if !send_frame(&tx, &cancel, StreamFrame::Summary(summary)).await {
                            return;
                        }
                    }
                    send_frame(&tx, &cancel, StreamFrame::Complete(())).await;
                }
                Err(err) => {
                    send_error_frame(&tx, &cancel, &err).await;
                }
            }
        };

        tokio::select! {
            () = produce => {}
            // Cancelled or out of budget: stop mid-stream, no terminal frame
            () = cancel.cancelled() => {}
            () = tokio::time::sleep(deadline) => {
                tracing::warn!(deadline_secs = deadline.as_secs(), "Streaming deadline exceeded");
                cancel.cancel();
            }
        }
    }

    /// Select and run a handler, falling back to search on handler failure.
    async fn execute_tool(
        &self,
        processed: &ProcessedQuery,
        cancel: &CancellationToken,
    ) -> Result<GeneratedResponse> {
        let search = self.handlers.search()?;
        let handler = match self.selector.select(processed) {
            Some(tool) => self
                .handlers
                .get(tool)
                .filter(|handler| handler.can_handle(processed))
                .unwrap_or_else(|| Arc::clone(&search)),
            // The default flow is plain retrieval
            None => Arc::clone(&search),
        };

        let ctx = HandlerContext {
            processed,
            backends: &self.backends,
            generator: &self.generator,
            config: &self.config,
        };
        match handler.execute(ctx, cancel).await {
            Ok(output) => Ok(output),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(err) if handler.tool_type() != ToolType::Search => {
                tracing::warn!(
                    tool = %handler.tool_type(),
                    error = %err,
                    "Tool handler failed, falling back to search"
                );
                let ctx = HandlerContext {
                    processed,
                    backends: &self.backends,
                    generator: &self.generator,
                    config: &self.config,
                };
                search.execute(ctx, cancel).await
            }
            Err(err) => Err(err),
        }
    }
}

fn assemble_response(processed: ProcessedQuery, output: GeneratedResponse) -> NLWebResponse {
    let mut warnings = processed.warnings;
    warnings.extend(output.warnings);
    NLWebResponse {
        query_id: processed.query_id,
        query: processed.query,
        decontextualized_query: processed.decontextualized_query,
        mode: output.mode,
        results: output.results,
        summary: output.summary,
        site: processed.site,
        generated_at: Utc::now(),
        warnings,
    }
}

async fn send_frame(
    tx: &mpsc::Sender<StreamFrame>,
    cancel: &CancellationToken,
    frame: StreamFrame,
) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    // A dropped receiver means the client went away; stop producing
    tx.send(frame).await.is_ok()
}

async fn send_error_frame(tx: &mpsc::Sender<StreamFrame>, cancel: &CancellationToken, err: &Error) {
    send_frame(
        tx,
        cancel,
        StreamFrame::Error(FrameError {
            message: err.to_string(),
        }),
    )
    .await;
}

