//! Retrieval-augmented answering
//!
//! A [`QueryPipeline`] binds one index to an embedder, a generator and a
//! prompt template. It holds no state of its own, so a new one is composed
//! whenever the index is replaced.


use std::sync::Arc;

use tracing::debug;

use crate::embeddings::Embedder;
use crate::index::VectorIndex;
use crate::{RagError, Result};

pub const CONTEXT_PLACEHOLDER: &str = "{context}";
pub const QUESTION_PLACEHOLDER: &str = "{question}";

pub const DEFAULT_PROMPT_TEMPLATE: &str = "Answer the question based only on the context below.

Context:
{context}

Question:
{question}";

/// Separator between retrieved chunks in the rendered context
const CONTEXT_SEPARATOR: &str = "\n\n";

/// Produces a completion for a prompt
pub trait Generator: Send + Sync {
    fn model_id(&self) -> &str;

    fn generate(&self, prompt: &str) -> Result<String>;
}

/// A prompt with `{context}` and `{question}` slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    #[inline]
    fn default() -> Self {
        Self {
            template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    #[inline]
    pub fn new(template: &str) -> Result<Self> {
        for placeholder in [CONTEXT_PLACEHOLDER, QUESTION_PLACEHOLDER] {
            if !template.contains(placeholder) {
                return Err(RagError::Config(format!(
                    "Prompt template is missing {}",
                    placeholder
                )));
            }
        }
        Ok(Self {
            template: template.to_string(),
        })
    }

    /// Fill both slots in one pass, so placeholder-like text inside the
    /// context or question is left alone
    #[inline]
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut rendered =
            String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();

        loop {
            let next = [
                (rest.find(CONTEXT_PLACEHOLDER), CONTEXT_PLACEHOLDER, context),
                (rest.find(QUESTION_PLACEHOLDER), QUESTION_PLACEHOLDER, question),
            ]
            .into_iter()
            .filter_map(|(at, placeholder, value)| at.map(|at| (at, placeholder, value)))
            .min_by_key(|(at, _, _)| *at);

            let Some((at, placeholder, value)) = next else {
                rendered.push_str(rest);
                return rendered;
            };

            rendered.push_str(&rest[..at]);
            rendered.push_str(value);
            rest = &rest[at + placeholder.len()..];
        }
    }
}

/// The question as seen by retrieval and the model: prior turns, then the
/// current question
#[inline]
pub fn compose_question(history: &str, question: &str) -> String {
    format!(
        "Previous conversation:\n{}\n\nCurrent question:\n{}",
        history, question
    )
}

/// Answers questions against one index
pub struct QueryPipeline {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    template: PromptTemplate,
    top_k: usize,
}

impl QueryPipeline {
    #[inline]
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        template: PromptTemplate,
        top_k: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            generator,
            template,
            top_k: top_k.max(1),
        }
    }

    #[inline]
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// The prompt the model would receive for `question` after `history`
    #[inline]
    pub fn build_prompt(&self, question: &str, history: &str) -> Result<String> {
        let composed = compose_question(history, question);

        let retrieved = self
            .index
            .retrieve(&composed, self.top_k, self.embedder.as_ref())?;
        debug!(
            "Retrieved {} chunks (best score {:?})",
            retrieved.len(),
            retrieved.first().map(|r| r.score)
        );

        let context = retrieved
            .iter()
            .map(|r| r.chunk.content.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);

        Ok(self.template.render(&context, &composed))
    }

    /// Retrieve context for `question`, ask the model, and return its answer.
    ///
    /// This blocks on the model services.
    #[inline]
    pub fn answer(&self, question: &str, history: &str) -> Result<String> {
        let prompt = self.build_prompt(question, history)?;

        debug!(
            "Invoking {} with a {} char prompt",
            self.generator.model_id(),
            prompt.len()
        );

        let answer = self.generator.generate(&prompt).map_err(|e| match e {
            RagError::Generation(_) => e,
            other => RagError::Generation(other.to_string()),
        })?;

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(RagError::Generation("Model returned no output".to_string()));
        }

        Ok(answer.to_string())
    }
}
