pub mod download_coordinator;
pub mod extractor;
pub mod unpacker;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use download_coordinator::DownloadEvent;
