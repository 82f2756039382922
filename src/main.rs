use kxctl::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::from_env();
    if let Err(e) = cli.run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
