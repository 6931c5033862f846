use message_queue_cli::{run_cli, CliError};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run_cli().await {
        let exit_code = e.exit_code();

        if matches!(e, CliError::NoMessages { .. }) {
            info!("{}", e);
        } else {
            // Alternate formatting prints the whole source chain
            error!("{:#}", anyhow::Error::from(e));
        }
        std::process::exit(exit_code);
    }
}
