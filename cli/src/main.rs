use clap::Parser;
use exec_agent_cli::Cli;
use exec_agent_cli::run_main;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_tracing();
    let exit_code = run_main(Cli::parse()).await?;
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

// Events go to stdout, so diagnostics must stay on stderr.
fn setup_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
