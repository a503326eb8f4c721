//! girder-testhttp: a canned-response HTTP server for test doubles
//!
//! Maps exact URL strings (path plus query, as received) to fixed
//! (status, body) responses. Anything unmapped answers 404 with an empty
//! body, so a test only describes the endpoints it cares about.

mod error;
mod server;

pub use error::{MockServerError, Result};
pub use server::{MockResponse, MockServer};
