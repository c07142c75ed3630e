//! The core provider trait every LLM adapter (and the mock) implements
//!.

use arena_domain::provider::{BoxStream, ChatRequest, ChatResponse, StreamChunk};
use arena_domain::Result;

/// Trait that every LLM adapter must implement.
///
/// Implementations translate between the internal request/response types
/// and the wire format of a specific vendor (or, for [`crate::MockProvider`],
/// a deterministic recorded fixture).
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// A unique identifier for this provider instance (matches its
    /// `ProviderConfig::id`).
    fn id(&self) -> &str;

    /// Send a chat completion request and wait for the full response.
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse>;

    /// Send a chat completion request and return a stream of chunks.
    async fn chat_stream(&self, req: &ChatRequest) -> Result<BoxStream<'static, Result<StreamChunk>>>;

    /// Whether this adapter can stream. Adapters that can't should make
    /// `chat_stream` return a single-chunk stream built from `chat`.
    fn supports_streaming(&self) -> bool;

    /// Convert a token count into currency using this provider's pricing
    /// table. The adapter is the single source of truth for this
    /// conversion so callers never need their own pricing data.
    fn calculate_cost(&self, input_tokens: u32, output_tokens: u32, cached_tokens: u32) -> f64;

    /// Release any held resources (connections, rotators). Default is a
    /// no-op; adapters with nothing to tear down don't need to override it.
    async fn close(&self) {}
}
