//! Concrete upload queues for each entity kind. Each is a thin alias over
//! [`UploadQueue`] paired with the buffer-file codec it should persist with
//! during an outage.

use crate::buffer::{decode_data_point_batch, decode_json_frame, encode_data_point_batch, encode_json_frame};
use crate::buffer_file::BufferFile;
use crate::queue::UploadQueue;
use ingest_core::model::{Event, RawRow};
use std::path::PathBuf;

pub type TimeSeriesUploadQueue = UploadQueue<crate::buffer::DataPointBatch>;
pub type EventUploadQueue = UploadQueue<Event>;
pub type RawUploadQueue<T> = UploadQueue<RawRow<T>>;

/// Builds the binary-framed buffer file used by [`TimeSeriesUploadQueue`].
pub fn data_point_buffer_file(path: impl Into<PathBuf>) -> BufferFile<crate::buffer::DataPointBatch> {
    BufferFile::new(path, encode_data_point_batch, |buf, cursor| {
        decode_data_point_batch(buf, cursor)
    })
}

/// Builds the JSON-framed buffer file used by [`EventUploadQueue`].
pub fn event_buffer_file(path: impl Into<PathBuf>) -> BufferFile<Event> {
    BufferFile::new(
        path,
        |item: &Event, out: &mut Vec<u8>| encode_json_frame(item, out).expect("Event always serializes"),
        |buf, cursor| decode_json_frame(buf, cursor),
    )
}

/// Builds the JSON-framed buffer file used by a [`RawUploadQueue<T>`].
pub fn raw_buffer_file<T>(path: impl Into<PathBuf>) -> BufferFile<RawRow<T>>
where
    T: serde::Serialize + serde::de::DeserializeOwned + Send + Sync + 'static,
{
    BufferFile::new(
        path,
        |item: &RawRow<T>, out: &mut Vec<u8>| {
            encode_json_frame(item, out).expect("row serialization should not fail")
        },
        |buf, cursor| decode_json_frame(buf, cursor),
    )
}
