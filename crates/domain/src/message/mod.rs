mod envelope;
mod record;
mod transport;
mod validation;

pub use envelope::{DeadLetterEntry, QueueEnvelope, QueueNaming};
pub use record::{FieldValue, StorageRecord};
pub use transport::{MessageType, TagReading, TransportMessage};
pub use validation::{decode_envelope, validate_message};
