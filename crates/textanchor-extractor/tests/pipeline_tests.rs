//! Integration tests for the public pipeline API

use textanchor_domain::{AlignmentStatus, CharInterval, Document, PromptContext, ResponseFormat};
use textanchor_extractor::{
    merge, resolve, split, Aligner, Annotator, DocumentRecord, ExtractorConfig, ResolveError,
};
use textanchor_llm::MockProvider;

const SCENE: &str = "ROMEO. But soft!\n\nJULIET. Ay me!\n\nROMEO. She speaks.";
const CAST: &str = r#"[{"character": "ROMEO"}, {"character": "JULIET"}]"#;

#[test]
fn test_stages_composed_by_hand() {
    let doc = Document::with_id("scene", SCENE);
    let chunks = split(&doc, 20).unwrap();

    let intervals: Vec<_> = chunks.iter().map(|c| c.interval).collect();
    assert_eq!(
        intervals,
        vec![
            CharInterval::new(0, 18),
            CharInterval::new(18, 34),
            CharInterval::new(34, 52),
        ]
    );

    let aligner = Aligner::new(0.75, 0.25);
    let batches: Vec<_> = chunks
        .iter()
        .map(|chunk| {
            let resolved = resolve(CAST, ResponseFormat::Json).unwrap();
            aligner.align_chunk(*chunk, resolved.candidates)
        })
        .collect();

    let merged = merge(batches);
    assert_eq!(merged.len(), 5);

    let aligned: Vec<_> = merged.iter().filter(|e| e.is_aligned()).collect();
    let starts: Vec<_> = aligned.iter().map(|e| e.interval.unwrap().start_offset).collect();
    assert_eq!(starts, vec![0, 18, 34]);
    for extraction in &aligned {
        let interval = extraction.interval.unwrap();
        assert_eq!(interval.slice(doc.text()), Some(extraction.extraction_text.as_str()));
    }

    // One unaligned entry per distinct claim
    let unaligned: Vec<_> = merged[3..].iter().map(|e| e.extraction_text.as_str()).collect();
    assert_eq!(unaligned, vec!["JULIET", "ROMEO"]);
    assert!(merged[3..]
        .iter()
        .all(|e| e.alignment_status == AlignmentStatus::Unaligned));
}

#[tokio::test]
async fn test_toml_configured_run_writes_records() {
    let config = ExtractorConfig::from_toml(
        r#"
max_chars = 20
boundary_lookback = 19
chunk_strategy = "by_paragraph"
extraction_passes = 2
"#,
    )
    .unwrap();

    let provider = MockProvider::new(CAST);
    let annotator = Annotator::new(provider.clone(), config).unwrap();
    let result = annotator.annotate(&Document::with_id("scene", SCENE)).await.unwrap();

    assert_eq!(provider.call_count(), 6);
    assert_eq!(result.extractions.len(), 5);

    let record = DocumentRecord::from(&result);
    let json = serde_json::to_value(&record).unwrap();

    assert_eq!(json["document_id"], "scene");
    assert_eq!(json["extractions"][1]["char_interval"]["start_pos"], 18);
    assert_eq!(json["extractions"][1]["char_interval"]["end_pos"], 24);
    assert_eq!(json["extractions"][3]["alignment_status"], "unaligned");
    assert!(json["extractions"][3].get("char_interval").is_none());

    let restored: DocumentRecord = serde_json::from_value(json).unwrap();
    assert_eq!(restored, record);
}

#[tokio::test]
async fn test_custom_prompt_builder_sees_context() {
    let provider = MockProvider::new("[]");
    let annotator = Annotator::new(provider.clone(), ExtractorConfig::default())
        .unwrap()
        .with_instructions("List characters.")
        .with_prompt_builder(|ctx: &PromptContext<'_>| {
            format!(
                "{} | {} | {}",
                ctx.instructions,
                ctx.additional_context.unwrap_or("-"),
                ctx.chunk.text
            )
        });

    let doc = Document::new("ROMEO. But soft!").with_additional_context("Act 2, Scene 2");
    annotator.annotate(&doc).await.unwrap();

    assert_eq!(
        provider.prompts(),
        vec!["List characters. | Act 2, Scene 2 | ROMEO. But soft!".to_string()]
    );
}

#[tokio::test]
async fn test_metrics_accumulate_across_documents() {
    let annotator = Annotator::new(MockProvider::new(CAST), ExtractorConfig::default()).unwrap();

    let documents = vec![
        Document::new("ROMEO. But soft!"),
        Document::new("JULIET. Ay me!"),
    ];
    let results = annotator.annotate_documents(&documents).await;
    assert!(results.iter().all(Result::is_ok));

    let metrics = annotator.metrics();
    assert_eq!(metrics.documents_annotated, 2);
    assert_eq!(metrics.model_calls, 2);
    assert_eq!(metrics.candidates, 4);
    assert_eq!(metrics.alignment_count(AlignmentStatus::Exact), 2);
    assert_eq!(metrics.alignment_count(AlignmentStatus::Unaligned), 2);
    assert!(metrics.summary().contains("Aligned rate: 50.0%"));

    annotator.reset_metrics();
    assert_eq!(annotator.metrics().documents_annotated, 0);
}

#[test]
fn test_unclosed_fence_is_reported() {
    let result = resolve("```json\n[{\"character\": \"ROMEO\"}]", ResponseFormat::Json);
    assert!(matches!(result, Err(ResolveError::UnterminatedFence)));
}
