// SOAP envelope handling: decode requests, dispatch by operation name, encode responses

pub mod dispatch;
pub mod encode;
pub mod envelope;

pub use dispatch::{OperationHandler, OperationRegistry};
pub use encode::{EnvelopeEncoder, ResponseEnvelope};
pub use envelope::{decode, Argument, Envelope, Namespace, OperationRef};
