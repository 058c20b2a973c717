pub mod assembler;
pub mod buffer;
pub mod command;
pub mod constants;
pub mod device;
pub mod error;
pub mod header;
pub mod reply;
pub mod spectrum;
pub mod writer;

pub use assembler::{AssemblerEvent, ProtocolState, SpectrumAssembler};
pub use command::Command;
pub use device::{DeviceConfig, Pds100g, StreamTransport, Transport};
pub use error::PdsError;
pub use header::SpectrumHeader;
pub use spectrum::SpectrumRecord;
pub use writer::SpectrumFileWriter;
