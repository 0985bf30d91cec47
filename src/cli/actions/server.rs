use crate::api;
use anyhow::Result;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub frontend_url: String,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the server fails to bind or serve.
pub async fn execute(args: Args) -> Result<()> {
    debug!("Starting server with frontend origin {}", args.frontend_url);
    api::new(args.port, &args.frontend_url).await
}
