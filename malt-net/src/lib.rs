// malt-net/src/lib.rs
pub mod http;
pub mod validation;

pub use http::{build_http_client, fetch_and_verify, RetryPolicy};
pub use validation::{validate_url, verify_checksum};
