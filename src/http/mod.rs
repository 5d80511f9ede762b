//! Request descriptors, the transport seam, buffered responses and body decoding.

pub mod decode;
pub mod orderedheaders;
pub mod request;
pub mod response;
pub mod transport;

// Re-exports for convenience
pub use decode::DecodeError;
pub use orderedheaders::OrderedHeaderMap;
pub use request::{RequestBuilder, RequestDescriptor, RequestTimeouts};
pub use response::HttpResponse;
pub use transport::{Exchange, ExchangeContext, HttpTransport, Transport};
