pub mod error;
pub mod io;
pub mod pcm;

pub use error::FormatError;
pub use io::reader::SampleReader;
pub use io::writer::{encode_samples, SampleWriter};
pub use pcm::{PcmFormat, SampleEncoding};
