//! Vision-model backends: the builtin engines behind the registry.
//!
//! Each builtin backend drives a heavyweight vision-language engine through
//! the `edgequake-llm` provider abstraction — an OpenAI-compatible serving
//! stack (vLLM, Ollama) or a hosted vision API, chosen once at construction
//! from the environment. The engines differ only in prompt, token budget,
//! output envelope, and invocation shape, so one struct parameterised by
//! [`ModelSpec`] covers all of them.
//!
//! Engine failures are classified here, close to the engine, so the
//! orchestrator's retry policy stays a pure function of "is this resource
//! exhaustion" and never inspects messages itself.

use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

use super::OcrBackend;
use crate::document::PageImage;
use crate::error::OcrError;
use crate::pipeline::{encode, postprocess};

/// How a backend maps pages onto engine calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationShape {
    /// One engine call per page; one returned string per page.
    PerPage,
    /// One engine call carrying every page image; one returned string for
    /// the whole document.
    WholeDocument,
}

/// How the engine's answer is unwrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputParse {
    /// The answer is the text.
    Plain,
    /// The engine answers with a JSON envelope `{"natural_text": …}`;
    /// fall back to the raw answer when it is not valid JSON.
    NaturalText,
}

/// Static description of one builtin engine.
#[derive(Debug, Clone, Copy)]
pub struct ModelSpec {
    pub name: &'static str,
    pub prompt: &'static str,
    pub parse: OutputParse,
    pub shape: InvocationShape,
    pub max_tokens: usize,
    /// Environment variable overriding the served model id.
    pub model_env: &'static str,
    pub default_model: &'static str,
}

/// A constructed engine handle: provider plus spec. Expensive to build
/// (provider construction validates credentials), cheap to invoke
/// concurrently — serialization, where required, is the registry's job.
pub struct VisionBackend {
    spec: ModelSpec,
    provider: Arc<dyn LLMProvider>,
}

impl VisionBackend {
    /// Construct the engine handle for `spec`.
    ///
    /// Provider resolution follows a two-level chain: an explicit
    /// `EDGEQUAKE_LLM_PROVIDER` wins; otherwise the factory auto-detects
    /// from whichever API-key variables are present. Any failure is
    /// [`OcrError::BackendInitFailed`] — never cached by the registry, so a
    /// later request retries once the environment is fixed.
    pub fn create(spec: ModelSpec) -> Result<Arc<dyn OcrBackend>, OcrError> {
        let model =
            std::env::var(spec.model_env).unwrap_or_else(|_| spec.default_model.to_string());
        let provider = resolve_provider(spec.name, &model)?;
        debug!(backend = spec.name, model = %model, "vision backend constructed");
        Ok(Arc::new(VisionBackend { spec, provider }))
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, OcrError> {
        let options = CompletionOptions {
            // Low temperature keeps the model faithful to what is on the
            // page, which is the whole job here.
            temperature: Some(0.1),
            max_tokens: Some(self.spec.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| classify_engine_error(self.spec.name, &e.to_string()))?;

        debug!(
            backend = self.spec.name,
            input_tokens = response.prompt_tokens,
            output_tokens = response.completion_tokens,
            "engine call complete"
        );

        let content = match self.spec.parse {
            OutputParse::Plain => response.content,
            OutputParse::NaturalText => unwrap_natural_text(response.content),
        };
        Ok(postprocess::clean_extracted(&content))
    }
}

#[async_trait]
impl OcrBackend for VisionBackend {
    fn name(&self) -> &str {
        self.spec.name
    }

    async fn process(&self, pages: &[PageImage]) -> Result<Vec<String>, OcrError> {
        match self.spec.shape {
            InvocationShape::WholeDocument => {
                let images = pages.iter().map(encode::encode_page).collect::<Result<
                    Vec<_>,
                    _,
                >>()?;
                let messages = vec![
                    ChatMessage::system(self.spec.prompt),
                    ChatMessage::user_with_images("", images),
                ];
                Ok(vec![self.chat(messages).await?])
            }
            InvocationShape::PerPage => {
                let mut texts = Vec::with_capacity(pages.len());
                for page in pages {
                    let messages = vec![
                        ChatMessage::system(self.spec.prompt),
                        ChatMessage::user_with_images("", vec![encode::encode_page(page)?]),
                    ];
                    texts.push(self.chat(messages).await?);
                }
                Ok(texts)
            }
        }
    }
}

fn resolve_provider(
    backend: &'static str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, OcrError> {
    let init_failed = |detail: String| OcrError::BackendInitFailed {
        name: backend.to_string(),
        detail,
    };

    if let Ok(provider_name) = std::env::var("EDGEQUAKE_LLM_PROVIDER") {
        if !provider_name.is_empty() {
            return ProviderFactory::create_llm_provider(&provider_name, model)
                .map_err(|e| init_failed(format!("provider '{provider_name}': {e}")));
        }
    }

    let (provider, _embeddings) = ProviderFactory::from_env().map_err(|e| {
        init_failed(format!(
            "no inference provider configured; set EDGEQUAKE_LLM_PROVIDER or an API key: {e}"
        ))
    })?;
    Ok(provider)
}

/// Sort an engine failure into the two invocation outcomes the orchestrator
/// distinguishes: accelerator memory exhaustion (retryable once) and
/// everything else.
fn classify_engine_error(backend: &str, message: &str) -> OcrError {
    if is_memory_exhaustion(message) {
        OcrError::ResourceExhausted {
            name: backend.to_string(),
            retried: false,
        }
    } else {
        OcrError::BackendProcessingError {
            name: backend.to_string(),
            detail: message.to_string(),
        }
    }
}

/// Serving stacks report accelerator exhaustion as message text, not as a
/// structured code; these substrings cover torch, vLLM, and the hosted APIs.
fn is_memory_exhaustion(message: &str) -> bool {
    let m = message.to_ascii_lowercase();
    m.contains("out of memory")
        || m.contains("insufficient memory")
        || (m.contains("cuda") && m.contains("memory"))
        || m.contains("kv cache")
}

/// olmOCR-style engines answer `{"natural_text": "..."}`; anything else is
/// passed through untouched.
fn unwrap_natural_text(content: String) -> String {
    match serde_json::from_str::<serde_json::Value>(&content) {
        Ok(value) => value
            .get("natural_text")
            .and_then(|t| t.as_str())
            .map(|t| t.to_string())
            .unwrap_or(content),
        Err(_) => content,
    }
}
