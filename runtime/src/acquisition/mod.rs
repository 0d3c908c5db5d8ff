//! Detail acquisition: the JSON HTTP client and the two detail sources built on
//! it and on the interception controller.

pub mod detail;
pub mod http_client;

pub use detail::{ApiDetailSource, BrowserDetailSource, DetailSource};
pub use http_client::{ApiAuth, HttpClient};
