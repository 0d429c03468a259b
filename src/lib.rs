//! bulkchan - buffered, high-throughput document ingestion into Elasticsearch.
//!
//! A two-stage channel batches documents by size or time, exports batches
//! concurrently against the bulk API with per-item retry classification, and
//! drains cleanly on shutdown. A bootstrap sequencer idempotently provisions
//! the templates/aliases/ILM policy the channel writes into, and a routing
//! strategy decides per document which index it lands in and which bulk verb
//! to emit.

pub mod alias;
pub mod bootstrap;
pub mod buffer;
pub mod bulk_request;
pub mod channel;
pub mod config;
pub mod document;
pub mod error;
pub mod orchestrator;
pub mod response;
pub mod routing;
pub mod serializer;
pub mod transport;

pub use channel::{open, Channel, ChannelOptions, ChannelOptionsBuilder, ExportOutcome, FullMode};
pub use document::RoutingAccessor;
pub use error::ChannelError;
pub use routing::RoutingStrategy;
pub use serializer::{DocumentSerializer, ReflectiveSerializer};
pub use transport::{ElasticsearchTransport, Method, Transport, TransportResponse};
