pub mod backend;
pub mod cpal_host;
pub mod device;
pub mod file;
pub mod mock;
pub mod naming;
pub mod queue;
pub mod wav;

pub use backend::{AudioHost, CaptureParams, DeviceRef, FrameBlock, FrameSource, BITS_PER_SAMPLE};
pub use cpal_host::CpalHost;
pub use device::select_input_device;
pub use file::AudioFile;
pub use mock::{MockEnding, MockEvent, MockHost};
pub use naming::{derive_path, prepare_output_dir};
pub use queue::{capture_queue, QueueFeed, QueuedSource};
pub use wav::{FlushPolicy, WavFileWriter, MAX_DATA_BYTES};
