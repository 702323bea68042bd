//! In-memory, size/time-triggered upload queues with an on-disk buffer for
//! outage survival (§4.6).

pub mod buffer;
pub mod buffer_file;
pub mod queue;
pub mod types;

pub use buffer::DataPointBatch;
pub use buffer_file::BufferFile;
pub use queue::{QueueUploadResult, UploadQueue, UploadQueueConfig};
pub use types::{data_point_buffer_file, event_buffer_file, raw_buffer_file, EventUploadQueue, RawUploadQueue, TimeSeriesUploadQueue};
