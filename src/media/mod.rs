mod services;

pub use services::{discard, spool_to_disk, LocalFile, MediaUploader, UploadedMedia};
