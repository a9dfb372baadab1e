use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "food-lovers-server")]
#[command(about = "Recipe and review sharing backend", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "food-lovers.yaml")]
    config: String,
    #[arg(short, long)]
    debug: bool,
    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let default_filter = if args.debug {
        "food_lovers=debug,tower_http=debug"
    } else {
        "food_lovers=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with((!args.json_logs).then(tracing_subscriber::fmt::layer))
        .with(args.json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .init();

    if let Err(e) = food_lovers::run(&args.config, args.debug).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
