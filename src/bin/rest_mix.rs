//! REST CRUD Mix Load Test
//!
//! Drives the weighted query/create/update/delete mix against the `/api/...`
//! REST endpoints of the target.
//!
//! Usage:
//!   cargo run --release --bin load-rest-mix -- --base-url http://localhost:8000 --vus 50 --duration 30s
//!
//! Exit status is 0 when every threshold holds, 99 when one fails and 2 on a
//! configuration error.

use crud_load::Protocol;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    crud_load::main_for(Protocol::Rest).await
}
