//! Core Annotator implementation

use crate::alignment::Aligner;
use crate::chunking::TextChunker;
use crate::config::{ExtractorConfig, FailureMode};
use crate::error::{ChunkingError, ExtractorError, ResolveError};
use crate::merger::merge;
use crate::metrics::AnnotatorMetrics;
use crate::prompt::SimplePromptBuilder;
use crate::resolver::Resolver;
use crate::stage::PipelineStage;
use futures::stream::{FuturesUnordered, StreamExt};
use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use textanchor_domain::{
    AlignmentStatus, AnnotatedDocument, Document, ExampleData, GroundedExtraction, ModelProvider,
    PromptBuilder, PromptContext, ResponseFormatHint, RunMetadata, RunWarning, SchemaConstraint,
    TextChunk, WarningKind,
};
use textanchor_llm::{ProviderRegistry, SharedProvider};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The Annotator turns documents into grounded, merged extractions
///
/// Each document is chunked once; every (pass, chunk) pair becomes a job that
/// builds a prompt, calls the model on the blocking pool, resolves the answer
/// and aligns the candidates. At most `max_workers` jobs run at a time.
pub struct Annotator<P, B = SimplePromptBuilder> {
    provider: Arc<P>,
    prompt_builder: B,
    config: ExtractorConfig,
    instructions: String,
    examples: Vec<ExampleData>,
    schema_constraint: Option<Box<dyn SchemaConstraint + Send + Sync>>,
    chunker: TextChunker,
    resolver: Resolver,
    aligner: Aligner,
    metrics: Mutex<AnnotatorMetrics>,
}

/// Successful output of one chunk job
struct ChunkOutput {
    extractions: Vec<GroundedExtraction>,
    candidates: usize,
    rejected: Vec<String>,
}

/// Why a chunk job contributed nothing
enum JobFailure {
    ModelCall(String),
    Resolve(ResolveError),
    Worker(String),
}

struct JobResult {
    pass_index: usize,
    chunk_index: usize,
    outcome: Result<ChunkOutput, JobFailure>,
}

/// Mutable bookkeeping for one run
struct RunState {
    chunk_count: usize,
    slots: Vec<Option<Vec<GroundedExtraction>>>,
    warnings: Vec<RunWarning>,
    failed_chunks: usize,
    fatal: Option<ExtractorError>,
}

impl<P: ModelProvider> Annotator<P, SimplePromptBuilder> {
    /// Create a new Annotator using the built-in prompt builder
    pub fn new(provider: P, config: ExtractorConfig) -> Result<Self, ExtractorError> {
        config.validate().map_err(ExtractorError::Config)?;

        Ok(Self {
            provider: Arc::new(provider),
            prompt_builder: SimplePromptBuilder::new(config.response_format(), config.fence_output),
            chunker: TextChunker::from_config(&config),
            resolver: Resolver::from_config(&config),
            aligner: Aligner::from_config(&config),
            config,
            instructions: String::new(),
            examples: Vec::new(),
            schema_constraint: None,
            metrics: Mutex::new(AnnotatorMetrics::new()),
        })
    }
}

impl Annotator<SharedProvider, SimplePromptBuilder> {
    /// Create an Annotator for `model_id` using a provider from `registry`
    pub fn from_registry(
        registry: &ProviderRegistry,
        model_id: &str,
        config: ExtractorConfig,
    ) -> Result<Self, ExtractorError> {
        let provider = registry.create(model_id)?;
        Self::new(provider, config)
    }
}

impl<P, B> Annotator<P, B> {
    /// Replace the prompt builder
    pub fn with_prompt_builder<B2: PromptBuilder>(self, prompt_builder: B2) -> Annotator<P, B2> {
        Annotator {
            provider: self.provider,
            prompt_builder,
            config: self.config,
            instructions: self.instructions,
            examples: self.examples,
            schema_constraint: self.schema_constraint,
            chunker: self.chunker,
            resolver: self.resolver,
            aligner: self.aligner,
            metrics: self.metrics,
        }
    }

    /// Set the task description handed to the prompt builder
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Set the worked examples handed to the prompt builder
    pub fn with_examples(mut self, examples: Vec<ExampleData>) -> Self {
        self.examples = examples;
        self
    }

    /// Derive a decoding constraint from the examples on every run
    pub fn with_schema_constraint(mut self, constraint: impl SchemaConstraint + Send + Sync + 'static) -> Self {
        self.schema_constraint = Some(Box::new(constraint));
        self
    }

    /// Active configuration
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Snapshot of the cumulative metrics
    pub fn metrics(&self) -> AnnotatorMetrics {
        lock(&self.metrics).clone()
    }

    /// Reset the cumulative metrics
    pub fn reset_metrics(&self) {
        lock(&self.metrics).reset();
    }
}

impl<P, B> Annotator<P, B>
where
    P: ModelProvider + Send + Sync + 'static,
    P::Error: Display,
    B: PromptBuilder,
{
    /// Annotate one document
    pub async fn annotate(&self, document: &Document) -> Result<AnnotatedDocument, ExtractorError> {
        self.run(document, None).await
    }

    /// Annotate one document, stopping early when `token` is cancelled
    pub async fn annotate_with_cancellation(
        &self,
        document: &Document,
        token: &CancellationToken,
    ) -> Result<AnnotatedDocument, ExtractorError> {
        self.run(document, Some(token)).await
    }

    /// Annotate documents one after another
    ///
    /// A failed document does not stop the ones after it.
    pub async fn annotate_documents(
        &self,
        documents: &[Document],
    ) -> Vec<Result<AnnotatedDocument, ExtractorError>> {
        let mut results = Vec::with_capacity(documents.len());
        for document in documents {
            results.push(self.annotate(document).await);
        }
        results
    }

    async fn run(
        &self,
        document: &Document,
        cancel: Option<&CancellationToken>,
    ) -> Result<AnnotatedDocument, ExtractorError> {
        let started = Instant::now();
        let result = self.run_inner(document, cancel, started).await;

        match &result {
            Ok(annotated) => lock(&self.metrics).record_document(&annotated.metadata),
            Err(e) => {
                warn!("Annotation of document '{}' failed: {}", document.id(), e);
                lock(&self.metrics).record_failed_document(elapsed_ms(started));
            }
        }
        result
    }

    async fn run_inner(
        &self,
        document: &Document,
        cancel: Option<&CancellationToken>,
        started: Instant,
    ) -> Result<AnnotatedDocument, ExtractorError> {
        let mut stage = PipelineStage::Pending;
        self.check_document(document)?;

        let chunks = self.chunker.split(document)?;
        advance(&mut stage, PipelineStage::Chunked, document.id());

        let passes = self.config.extraction_passes;
        info!(
            "Annotating document '{}': {} chars, {} chunks, {} passes",
            document.id(),
            document.text().chars().count(),
            chunks.len(),
            passes
        );

        let hint = self.response_hint();
        let mut state = RunState::new(chunks.len(), passes);
        let mut queue = (0..passes).flat_map(|pass| (0..chunks.len()).map(move |chunk| (pass, chunk)));
        let mut in_flight = FuturesUnordered::new();
        let mut cancelled = false;
        advance(&mut stage, PipelineStage::Dispatched, document.id());

        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                cancelled = true;
                break;
            }

            // Top up the pool; nothing new once a fatal failure is seen
            while state.fatal.is_none() && in_flight.len() < self.config.max_workers {
                let Some((pass_index, chunk_index)) = queue.next() else {
                    break;
                };
                in_flight.push(self.run_job(document, &chunks, pass_index, chunk_index, &hint));
            }

            let next = match cancel {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    next = in_flight.next() => next,
                },
                None => in_flight.next().await,
            };

            match next {
                Some(job) => state.record(job, &self.config, &self.metrics),
                None => break,
            }
        }
        drop(in_flight);

        let completed = state.completed_jobs();
        let total_jobs = chunks.len() * passes;
        let stopped = if cancelled {
            info!("Annotation of document '{}' cancelled", document.id());
            Some(ExtractorError::Cancelled)
        } else {
            state.fatal.take()
        };

        let partial = match stopped {
            Some(err) => {
                advance(&mut stage, PipelineStage::Failed, document.id());
                if !self.config.return_partial_results {
                    return Err(err);
                }
                warn!(
                    "Returning partial result for document '{}': {} of {} chunk jobs completed",
                    document.id(),
                    completed,
                    total_jobs
                );
                state.warnings.push(RunWarning::for_run(
                    WarningKind::Incomplete,
                    format!("{}; {} of {} chunk jobs completed", err, completed, total_jobs),
                ));
                true
            }
            None => {
                advance(&mut stage, PipelineStage::Resolving, document.id());
                advance(&mut stage, PipelineStage::Aligning, document.id());
                false
            }
        };

        let batches: Vec<Vec<GroundedExtraction>> = state.slots.into_iter().flatten().collect();
        let count = |status: AlignmentStatus| {
            batches
                .iter()
                .flatten()
                .filter(|e| e.alignment_status == status)
                .count()
        };
        let (exact_count, fuzzy_count, unaligned_count) = (
            count(AlignmentStatus::Exact),
            count(AlignmentStatus::Fuzzy),
            count(AlignmentStatus::Unaligned),
        );

        let extractions = merge(batches);
        if !partial {
            advance(&mut stage, PipelineStage::Merged, document.id());
            advance(&mut stage, PipelineStage::Done, document.id());
        }
        debug_assert!(stage.is_terminal(), "run ended in non-terminal stage {}", stage);

        let metadata = RunMetadata {
            model_id: self.provider.model_id().to_string(),
            fuzzy_threshold: self.config.fuzzy_threshold,
            fuzzy_margin_ratio: self.config.fuzzy_margin_ratio,
            max_chars: self.config.max_chars,
            extraction_passes: passes,
            chunk_count: chunks.len(),
            failed_chunks: state.failed_chunks,
            exact_count,
            fuzzy_count,
            unaligned_count,
            warnings: state.warnings,
            partial,
            processing_time_ms: elapsed_ms(started),
        };

        info!(
            "Annotation of document '{}' complete: {} extractions ({} exact, {} fuzzy, {} unaligned before merge), {} failed chunks",
            document.id(),
            extractions.len(),
            exact_count,
            fuzzy_count,
            unaligned_count,
            metadata.failed_chunks
        );

        Ok(AnnotatedDocument {
            document_id: document.id().to_string(),
            text: document.text().to_string(),
            extractions,
            metadata,
        })
    }

    fn check_document(&self, document: &Document) -> Result<(), ExtractorError> {
        if document.text().trim().is_empty() {
            return Err(ChunkingError::EmptyDocument(document.id().to_string()).into());
        }

        let length = document.text().chars().count();
        if length > self.config.max_text_length {
            return Err(ExtractorError::TextTooLong(length, self.config.max_text_length));
        }
        Ok(())
    }

    fn response_hint(&self) -> ResponseFormatHint {
        let format = self.config.response_format();
        ResponseFormatHint {
            format,
            schema: self
                .schema_constraint
                .as_ref()
                .and_then(|c| c.constraint(&self.examples, format)),
            fenced: self.config.fence_output,
        }
    }

    async fn run_job(
        &self,
        document: &Document,
        chunks: &[TextChunk<'_>],
        pass_index: usize,
        chunk_index: usize,
        hint: &ResponseFormatHint,
    ) -> JobResult {
        let chunk = chunks[chunk_index];
        let previous_text = self.previous_text(chunks, chunk_index);
        let outcome = self
            .process_chunk(document, chunk, previous_text, pass_index, hint)
            .await;

        JobResult {
            pass_index,
            chunk_index,
            outcome,
        }
    }

    async fn process_chunk(
        &self,
        document: &Document,
        chunk: TextChunk<'_>,
        previous_text: Option<&str>,
        pass_index: usize,
        hint: &ResponseFormatHint,
    ) -> Result<ChunkOutput, JobFailure> {
        let prompt = self.prompt_builder.build(&PromptContext {
            chunk: &chunk,
            instructions: &self.instructions,
            examples: &self.examples,
            additional_context: document.additional_context(),
            previous_text,
        });
        debug!(
            "Pass {}, chunk {}: dispatched, prompt length {} chars",
            pass_index,
            chunk.chunk_index,
            prompt.len()
        );

        let raw = self.call_model(prompt, hint.clone()).await?;
        debug!(
            "Pass {}, chunk {}: resolving response of {} chars",
            pass_index,
            chunk.chunk_index,
            raw.len()
        );

        let resolved = self.resolver.resolve(&raw).map_err(JobFailure::Resolve)?;
        let candidates = resolved.candidates.len();
        debug!(
            "Pass {}, chunk {}: aligning {} candidates",
            pass_index, chunk.chunk_index, candidates
        );

        let extractions = self
            .aligner
            .align_chunk(chunk, resolved.candidates)
            .into_iter()
            .map(|e| e.in_pass(pass_index))
            .collect();

        Ok(ChunkOutput {
            extractions,
            candidates,
            rejected: resolved.rejected,
        })
    }

    /// Call the model provider on the blocking pool
    async fn call_model(&self, prompt: String, hint: ResponseFormatHint) -> Result<String, JobFailure> {
        lock(&self.metrics).record_model_call();
        let provider = Arc::clone(&self.provider);

        tokio::task::spawn_blocking(move || {
            provider
                .generate(&prompt, &hint)
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| JobFailure::Worker(format!("Task join error: {}", e)))?
        .map_err(JobFailure::ModelCall)
    }

    /// Tail of the preceding chunk, when context windows are enabled
    fn previous_text<'a>(&self, chunks: &[TextChunk<'a>], chunk_index: usize) -> Option<&'a str> {
        let window = self.config.context_window_chars;
        if window == 0 || chunk_index == 0 {
            return None;
        }

        let text = chunks[chunk_index - 1].text;
        let start = text
            .char_indices()
            .rev()
            .nth(window - 1)
            .map_or(0, |(offset, _)| offset);
        Some(&text[start..])
    }
}

impl RunState {
    fn new(chunk_count: usize, passes: usize) -> Self {
        Self {
            chunk_count,
            slots: (0..chunk_count * passes).map(|_| None).collect(),
            warnings: Vec::new(),
            failed_chunks: 0,
            fatal: None,
        }
    }

    fn completed_jobs(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count() + self.failed_chunks
    }

    fn record(&mut self, job: JobResult, config: &ExtractorConfig, metrics: &Mutex<AnnotatorMetrics>) {
        let JobResult {
            pass_index,
            chunk_index,
            outcome,
        } = job;

        let failure = match outcome {
            Ok(output) => {
                for reason in &output.rejected {
                    self.warnings.push(RunWarning::for_chunk(
                        pass_index,
                        chunk_index,
                        WarningKind::RejectedRecord,
                        reason.clone(),
                    ));
                }
                lock(metrics).record_chunk(output.candidates, output.rejected.len());
                self.slots[pass_index * self.chunk_count + chunk_index] = Some(output.extractions);
                return;
            }
            Err(failure) => failure,
        };

        self.failed_chunks += 1;
        lock(metrics).record_chunk_failure();

        match failure {
            JobFailure::ModelCall(message) => match config.failure_mode {
                FailureMode::Recoverable => {
                    warn!(
                        "Pass {}, chunk {}: model call failed, skipping chunk: {}",
                        pass_index, chunk_index, message
                    );
                    self.warnings.push(RunWarning::for_chunk(
                        pass_index,
                        chunk_index,
                        WarningKind::ModelCallFailed,
                        message,
                    ));
                }
                FailureMode::Fatal => {
                    error!(
                        "Pass {}, chunk {}: model call failed, stopping dispatch: {}",
                        pass_index, chunk_index, message
                    );
                    self.fatal.get_or_insert(ExtractorError::ModelCall {
                        pass_index,
                        chunk_index,
                        message,
                    });
                }
            },
            JobFailure::Resolve(source) if config.suppress_parse_errors => {
                warn!(
                    "Pass {}, chunk {}: unparseable model output, chunk contributes nothing: {}",
                    pass_index, chunk_index, source
                );
                self.warnings.push(RunWarning::for_chunk(
                    pass_index,
                    chunk_index,
                    WarningKind::ParseFailure,
                    source.to_string(),
                ));
            }
            JobFailure::Resolve(source) => {
                error!(
                    "Pass {}, chunk {}: unparseable model output, stopping dispatch: {}",
                    pass_index, chunk_index, source
                );
                self.fatal.get_or_insert(ExtractorError::Resolve {
                    pass_index,
                    chunk_index,
                    source,
                });
            }
            JobFailure::Worker(message) => {
                error!("Pass {}, chunk {}: {}", pass_index, chunk_index, message);
                self.fatal.get_or_insert(ExtractorError::Worker(message));
            }
        }
    }
}

fn advance(stage: &mut PipelineStage, next: PipelineStage, document_id: &str) {
    debug_assert!(
        stage.can_transition_to(next),
        "illegal stage transition {} -> {}",
        stage,
        next
    );
    debug!("Document '{}': {} -> {}", document_id, stage, next);
    *stage = next;
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use textanchor_domain::CharInterval;
    use textanchor_llm::MockProvider;

    fn create_test_annotator(response: &str) -> Annotator<MockProvider> {
        Annotator::new(MockProvider::new(response), ExtractorConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_annotate_empty_response() {
        let annotator = create_test_annotator("[]");
        let doc = Document::with_id("d", "Some text");

        let result = annotator.annotate(&doc).await.unwrap();
        assert!(result.extractions.is_empty());
        assert_eq!(result.metadata.chunk_count, 1);
        assert_eq!(result.metadata.model_id, "mock");
    }

    #[tokio::test]
    async fn test_annotate_text_too_long() {
        let config = ExtractorConfig {
            max_text_length: 100,
            max_chars: 50,
            ..ExtractorConfig::default()
        };
        let provider = MockProvider::new("[]");
        let annotator = Annotator::new(provider.clone(), config).unwrap();

        let result = annotator.annotate(&Document::new("a".repeat(101))).await;
        assert!(matches!(result, Err(ExtractorError::TextTooLong(101, 100))));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_whitespace_document_fails_before_model_call() {
        let provider = MockProvider::new("[]");
        let annotator = Annotator::new(provider.clone(), ExtractorConfig::default()).unwrap();

        let result = annotator.annotate(&Document::with_id("blank", " \n\t ")).await;
        assert!(matches!(
            result,
            Err(ExtractorError::Chunking(ChunkingError::EmptyDocument(ref id))) if id == "blank"
        ));
        assert_eq!(provider.call_count(), 0);
        assert_eq!(annotator.metrics().documents_failed, 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ExtractorConfig {
            max_workers: 0,
            ..ExtractorConfig::default()
        };
        let result = Annotator::new(MockProvider::new("[]"), config);
        assert!(matches!(result, Err(ExtractorError::Config(_))));
    }

    #[tokio::test]
    async fn test_scenario_single_exact_extraction() {
        let annotator = create_test_annotator(r#"[{"extraction_class": "character", "extraction_text": "ROMEO"}]"#);
        let doc = Document::with_id("d", "ROMEO. But soft!");

        let result = annotator.annotate(&doc).await.unwrap();
        assert_eq!(result.extractions.len(), 1);
        assert_eq!(result.extractions[0].interval, Some(CharInterval::new(0, 5)));
        assert_eq!(result.extractions[0].alignment_status, AlignmentStatus::Exact);
        assert_eq!(result.metadata.exact_count, 1);
    }

    #[tokio::test]
    async fn test_previous_text_window() {
        let provider = MockProvider::new("[]");
        let config = ExtractorConfig {
            max_chars: 21,
            boundary_lookback: 10,
            context_window_chars: 6,
            ..ExtractorConfig::default()
        };
        let annotator = Annotator::new(provider.clone(), config)
            .unwrap()
            .with_prompt_builder(|ctx: &PromptContext<'_>| {
                format!("prev=[{}] text=[{}]", ctx.previous_text.unwrap_or(""), ctx.chunk.text)
            });

        let doc = Document::with_id("d", "First sentence here. Second one here.");
        annotator.annotate(&doc).await.unwrap();

        let mut prompts = provider.prompts();
        prompts.sort();
        assert_eq!(prompts[0], "prev=[] text=[First sentence here. ]");
        assert_eq!(prompts[1], "prev=[here. ] text=[Second one here.]");
    }

    #[tokio::test]
    async fn test_schema_constraint_forwarded_in_hint() {
        struct ArraySchema;
        impl SchemaConstraint for ArraySchema {
            fn constraint(&self, examples: &[ExampleData], format: textanchor_domain::ResponseFormat) -> Option<String> {
                Some(format!("{}:{}", format.as_str(), examples.len()))
            }
        }

        let provider = MockProvider::new("[]");
        let annotator = Annotator::new(provider.clone(), ExtractorConfig::default())
            .unwrap()
            .with_examples(vec![ExampleData::new("ROMEO.", Vec::new())])
            .with_schema_constraint(ArraySchema);

        annotator.annotate(&Document::new("ROMEO. But soft!")).await.unwrap();

        let hints = provider.hints();
        assert_eq!(hints[0].schema.as_deref(), Some("json:1"));
        assert!(hints[0].fenced);
    }
}
