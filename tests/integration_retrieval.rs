#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end retrieval over uploaded documents with an in-process embedder
// Run with: cargo test --test integration_retrieval

use docs_rag::DocsError;
use docs_rag::corpus::{Corpus, QueryOutcome};
use docs_rag::documents::DocumentStore;
use docs_rag::embeddings::{ChunkingConfig, Embedder};
use docs_rag::generation::{self, Generator};
use docs_rag::retrieval::{ContextOutcome, RetrievalConfig, RetrievalService};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

const DIMENSION: usize = 64;

/// Bag of words hashed into a fixed number of buckets
struct HashingEmbedder;

impl HashingEmbedder {
    fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; DIMENSION];
        for word in text.split_whitespace() {
            let word = word.to_lowercase();
            let bucket = word
                .bytes()
                .fold(5381_usize, |hash, byte| hash.wrapping_mul(33) ^ usize::from(byte));
            vector[bucket % DIMENSION] += 1.0;
        }
        vector
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, texts: &[String]) -> docs_rag::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| Self::vector(text)).collect())
    }
}

struct ContextEchoGenerator;

impl Generator for ContextEchoGenerator {
    fn generate(&self, prompt: &str) -> docs_rag::Result<String> {
        let context = prompt
            .split("CONTEXT:\n")
            .nth(1)
            .and_then(|rest| rest.split("\n\nUSER QUESTION:").next())
            .unwrap_or_default();
        Ok(format!("Based on: {}", context))
    }
}

fn setup(chunk_size: usize, overlap: usize) -> (DocumentStore, RetrievalService, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = DocumentStore::new(temp_dir.path().join("uploads"));
    let corpus = Corpus::new(
        Arc::new(HashingEmbedder),
        ChunkingConfig {
            chunk_size,
            overlap,
        },
    );
    let service = RetrievalService::new(Arc::new(corpus), RetrievalConfig::default());
    (store, service, temp_dir)
}

#[test]
fn upload_train_and_retrieve() {
    let (store, service, _temp_dir) = setup(4, 1);

    store
        .save_upload("a.txt", b"one two three four five six seven eight")
        .expect("upload should succeed");
    store
        .save_upload("scan.pdf", b"%PDF-1.4 binary")
        .expect("upload should succeed");

    let documents = store.load_documents().expect("load should succeed");
    let report = service.train(documents).expect("training should succeed");

    assert_eq!(report.indexed_chunk_count, 3);
    assert_eq!(report.document_count, 1);
    assert_eq!(report.dimension, Some(DIMENSION));

    let ContextOutcome::Context(context) = service
        .answer_context("seven eight", None)
        .expect("retrieval should succeed")
    else {
        panic!("corpus should not be empty");
    };
    assert_eq!(context.joined(), "seven eight");
    assert_eq!(context.chunks[0].source, "a.txt");
    assert_eq!(context.chunks[0].distance, 0.0);
}

#[test]
fn answers_from_best_chunk() {
    let (store, service, _temp_dir) = setup(8, 2);

    store
        .save_upload(
            "pinout.md",
            b"Header J4 pin 1 is VCC at 3.3 volts. Pin 2 is ground. Pin 3 carries the I2C clock line.",
        )
        .expect("upload should succeed");
    store
        .save_upload(
            "uart.txt",
            b"The console UART defaults to 115200 baud with eight data bits and no parity.",
        )
        .expect("upload should succeed");

    let generator = ContextEchoGenerator;

    let before = generation::answer(&service, &generator, "What baud rate?")
        .expect("answer should succeed");
    assert!(!before.success);

    service
        .train(store.load_documents().expect("load should succeed"))
        .expect("training should succeed");

    let answer = generation::answer(
        &service,
        &generator,
        "The console UART defaults to 115200 baud with",
    )
    .expect("answer should succeed");

    assert!(answer.success);
    assert_eq!(
        answer.response,
        "Based on: The console UART defaults to 115200 baud with"
    );
}

#[test]
fn retraining_replaces_previous_documents() {
    let (store, service, _temp_dir) = setup(16, 4);

    store
        .save_upload("old.txt", b"legacy board revision A uses a 12 MHz crystal")
        .expect("upload should succeed");
    service
        .train(store.load_documents().expect("load should succeed"))
        .expect("training should succeed");

    store
        .save_upload("old.txt", b"revision B uses a 25 MHz oscillator")
        .expect("upload should succeed");
    service
        .train(store.load_documents().expect("load should succeed"))
        .expect("training should succeed");

    let QueryOutcome::Matches(results) = service
        .search("crystal", 10)
        .expect("search should succeed")
    else {
        panic!("corpus should not be empty");
    };
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].text, "revision B uses a 25 MHz oscillator");
}

#[test]
fn invalid_chunking_keeps_service_usable() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = DocumentStore::new(temp_dir.path());
    store
        .save_upload("a.txt", b"alpha beta gamma")
        .expect("upload should succeed");

    let corpus = Corpus::new(
        Arc::new(HashingEmbedder),
        ChunkingConfig {
            chunk_size: 2,
            overlap: 5,
        },
    );
    let service = RetrievalService::new(Arc::new(corpus), RetrievalConfig::default());

    let err = service
        .train(store.load_documents().expect("load should succeed"))
        .expect_err("training should fail");
    assert!(matches!(
        err.root_cause(),
        DocsError::InvalidConfiguration {
            chunk_size: 2,
            overlap: 5
        }
    ));

    assert_eq!(
        service
            .answer_context("alpha", None)
            .expect("retrieval should succeed"),
        ContextOutcome::EmptyCorpus
    );
}

#[test]
fn queries_run_alongside_training() {
    let (store, service, _temp_dir) = setup(32, 8);
    let service = Arc::new(service);

    for i in 0..20 {
        let text = (0..200)
            .map(|w| format!("doc{}word{}", i, w % 37))
            .collect::<Vec<_>>()
            .join(" ");
        store
            .save_upload(&format!("doc{:02}.txt", i), text.as_bytes())
            .expect("upload should succeed");
    }
    let documents = store.load_documents().expect("load should succeed");
    service
        .train(documents.clone())
        .expect("training should succeed");
    let expected_chunks = service.status().chunk_count;

    let trainer = {
        let service = Arc::clone(&service);
        thread::spawn(move || {
            for _ in 0..10 {
                service
                    .train(documents.clone())
                    .expect("training should succeed");
            }
        })
    };

    let readers = (0..4)
        .map(|_| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                for _ in 0..50 {
                    let QueryOutcome::Matches(results) = service
                        .search("doc3word5 doc3word6", 3)
                        .expect("search should succeed")
                    else {
                        panic!("corpus never becomes empty in this test");
                    };
                    assert_eq!(results.len(), 3);
                    assert_eq!(service.status().chunk_count, expected_chunks);
                }
            })
        })
        .collect::<Vec<_>>();

    trainer.join().expect("trainer should not panic");
    for reader in readers {
        reader.join().expect("reader should not panic");
    }
}
