pub mod buffer;
pub mod config;
pub mod decode;
pub mod engine;
pub mod error;
pub mod policy;
pub mod reader;
pub mod staging;
pub mod store;

pub use buffer::{BufferingCallback, StreamingBuffer};
pub use config::{StreamConfig, LOW_WATER_MARK_BYTES};
pub use engine::{Handle, PlaybackEngine, VirtualEngine};
pub use error::StreamError;
pub use pcmstream_format::{PcmFormat, SampleEncoding};
pub use policy::{BufferingEvent, BufferingPolicy};
pub use reader::StreamReader;
