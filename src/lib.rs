//! Client-side federation of DICOMweb servers.
//!
//! Searches (QIDO-RS) and metadata retrievals (WADO-RS) are sent to every configured
//! source concurrently and the answers are merged into one result, with the earliest
//! registered source winning on duplicates. Static sources that cannot evaluate queries
//! are filtered on the client. Retrieved datasets are normalized so that numbers are
//! numbers and bulk data references are absolute URLs.

pub mod api;
pub mod backend;
pub mod config;
pub mod dataset;
pub mod federation;
pub mod registry;
pub mod types;
pub mod utils;
