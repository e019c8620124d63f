//! Language model call instrumentation (GenAI semantic conventions).

use tracing::{field, span, Level, Span};

/// Create a span around one model request.
///
/// # Arguments
///
/// * `provider` - Provider name (`openai`, `anthropic`, `gemini`, ...)
/// * `model` - Model identifier
pub fn llm_span(provider: &str, model: &str) -> Span {
    span!(
        Level::INFO,
        "llm",
        otel.name = %format!("chat {}", model),
        otel.kind = "client",
        gen_ai.system = provider,
        gen_ai.request.model = model,
        gen_ai.response.chars = field::Empty,
    )
}

/// Record the size of the raw model response in the current span.
pub fn record_llm_response(chars: usize) {
    Span::current().record("gen_ai.response.chars", chars);
}
