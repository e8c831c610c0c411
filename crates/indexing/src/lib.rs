//! Turn-level indexing pipeline
//!
//! Consumes turn-finalized events from the stream, batches them by size or
//! time, embeds each batch with multiple vector kinds, and upserts the
//! resulting points into the turn collection.

pub mod batch;
pub mod consumer;
pub mod turns;

pub use batch::{BatchConfig, BatchQueue};
pub use consumer::{enqueue_event, ConsumerConfig, NatsStatusPublisher, TurnFinalizedConsumer};
pub use turns::{parse_turn_finalized, TurnsIndexer, TurnsIndexerConfig};
