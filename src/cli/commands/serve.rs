use anyhow::Result;
use tokio::io::BufReader;
use tracing::info;

use crate::backend::service;

/// Answer native backend requests on stdin/stdout until stdin closes.
pub async fn execute() -> Result<()> {
    info!("Native service listening on stdio");
    service::serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}
