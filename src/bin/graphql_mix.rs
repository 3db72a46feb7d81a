//! GraphQL CRUD Mix Load Test
//!
//! Same mix as the REST variant, expressed as queries and mutations posted
//! to a single GraphQL endpoint (`--graphql-path`, default `/graphql`).
//!
//! Usage:
//!   cargo run --release --bin load-graphql-mix -- --base-url http://localhost:8000 --threshold 'response_time_combined:p(95)<1500'

use crud_load::Protocol;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    crud_load::main_for(Protocol::Graphql).await
}
