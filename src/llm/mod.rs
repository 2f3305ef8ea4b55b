//! Model providers, response streaming and reasoning separation.

pub mod accumulator;
pub mod decode;
pub mod event;
pub mod provider;
pub mod split;
pub mod transport;

pub use accumulator::{
    Accumulator, DecodeMode, NoProgress, NormalizedResult, Phase, ProgressSink, accumulate,
};
pub use decode::{decode_line, decode_stream};
pub use event::{StreamEvent, Usage};
pub use provider::{Backend, ChatRequest, Provider, ProviderConfig};
pub use split::{REASONING_MARKERS, Split, split_reasoning};
pub use transport::{ChatTransport, CurlTransport, LineStream};
