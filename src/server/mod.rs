//! Harness HTTP server
//!
//! Exposes the push protocol to development tools on the local network:
//! - `GET /assetmanifest`, `POST /deletefiles`
//! - `PUT /putfile`, `POST /zippush`
//! - `POST /deleteapp`, `POST /launch`, `GET /info`
//!
//! A known path hit with the wrong method answers `405 Method Not Allowed`.

mod error;
mod routes;
mod server;

pub use error::{status_code, ServerError};
pub use routes::{is_truthy, parse_expect_bytes, DeleteFilesBody};
pub use server::{HarnessServer, RunningServer, ServerState};
