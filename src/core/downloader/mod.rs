pub mod client;

pub use client::{DownloadRecord, DownloadReport, Downloader};
