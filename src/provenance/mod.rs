//! Provenance recording for workbench operations (uploads, copies).

pub mod recorder;

pub use recorder::{record_copy, record_upload, FileTransfer, COPY_LABEL, UPLOAD_LABEL, WORKBENCH_AGENT};
