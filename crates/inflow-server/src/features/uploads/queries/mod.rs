pub mod status;

pub use status::{UploadStatusError, UploadStatusQuery, UploadStatusResponse};
