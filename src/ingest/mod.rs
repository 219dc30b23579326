//! Message ingestion
//!
//! Handles the queue side of the pipeline:
//! - Envelope decoding into `ScanRecord`s
//! - The at-least-once source abstraction and an in-process queue
//! - The dispatcher that settles each message by its write outcome

pub mod decoder;
pub mod dispatcher;
pub mod queue;

pub use decoder::{PayloadDecoder, ScanEnvelope, ScanPayload, V1Payload, V2Payload};
pub use dispatcher::{Disposition, MessageDispatcher, MessageHandler};
pub use queue::{MemoryQueue, Message, MessageSource};
