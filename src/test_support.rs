//! Deterministic stand-ins for the model services and sample documents

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

use crate::embeddings::Embedder;
use crate::pipeline::Generator;
use crate::{RagError, Result};

const DIMENSION: usize = 64;

/// Bag-of-words embedder: each lowercase word bumps one hashed dimension
pub struct HashEmbedder {
    model: String,
    calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            let bucket = word
                .bytes()
                .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
                % DIMENSION;
            vector[bucket] += 1.0;
        }
        vector
    }
}

impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Embedder whose service is always down
pub struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn model_id(&self) -> &str {
        "failing-embedder"
    }

    fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(RagError::EmbeddingService(
            "connection refused".to_string(),
        ))
    }
}

/// Generator that records every prompt and answers with a canned reply
pub struct RecordingGenerator {
    prompts: Mutex<Vec<String>>,
    reply: Option<String>,
}

impl RecordingGenerator {
    pub fn answering(reply: &str) -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            reply: Some(reply.to_string()),
        }
    }

    /// A generator whose every call fails
    pub fn failing() -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            reply: None,
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt log poisoned").clone()
    }
}

impl Generator for RecordingGenerator {
    fn model_id(&self) -> &str {
        "recording-generator"
    }

    fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .expect("prompt log poisoned")
            .push(prompt.to_string());
        self.reply
            .clone()
            .ok_or_else(|| RagError::Generation("model unavailable".to_string()))
    }
}

/// A minimal PDF with one text line per page
pub fn sample_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let stream = Stream::new(
            dictionary! {},
            content.encode().expect("content should encode"),
        );
        let content_id = doc.add_object(stream);
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("pdf should serialize");
    bytes
}
