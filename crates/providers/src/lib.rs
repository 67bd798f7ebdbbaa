//! Model gateway: provider adapters plus the request surface the engine
//! consumes (`text_request`, `structured_request`, streaming, cancellation,
//! usage normalization, cost accounting).

pub mod anthropic;
pub mod gateway;
pub mod google;
pub mod jsonx;
pub mod metrics;
pub mod openai;
pub mod pricing;
mod sse;
pub mod traits;
pub mod usage;

pub use gateway::{ModelGateway, RequestOptions, Structured, TextResponse};
pub use metrics::{CallMetrics, MetricsLog, MetricsSink, NullMetrics};
pub use traits::{
    BoxStream, Completion, CompletionRequest, ProviderClient, StreamEvent, StreamSink, Usage,
};
