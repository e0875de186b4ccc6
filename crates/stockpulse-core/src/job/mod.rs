//! Retraining jobs
//!
//! A job is started by uploading a CSV dataset to the forecast service. The
//! reply body stays open and streams `data: {json}` lines, one per progress
//! step, ending with a `complete` or `error` event.

mod frame;
mod reader;

pub use frame::{LineDecoder, ProgressEvent, DATA_PREFIX};
pub use reader::{
    AbortHandle, ByteStream, JobConfig, JobOutcome, JobStatus, JobStream, JobStreamReader,
    RetrainRequest,
};
