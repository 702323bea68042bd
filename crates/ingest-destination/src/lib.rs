//! Transport trait boundary (§6) and write façade (§4.6) for the cloud
//! ingestion API.

pub mod engine;
pub mod facade;
pub mod transport;

pub use engine::WriteOptions;
pub use facade::Destination;
pub use transport::{
    AssetsApi, DataPointsApi, EventsApi, LoginApi, LoginStatus, RawApi, RunStatus, RunsApi, TimeSeriesApi,
    TransportError, TransportResult,
};
