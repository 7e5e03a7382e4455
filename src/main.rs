#[tokio::main]
async fn main() {
    let root = std::env::args().nth(1);
    if let Err(error) = focus_planner::run(root).await {
        tracing::error!(%error, "focus planner exited with error");
        eprintln!("focus-planner: {error}");
        std::process::exit(1);
    }
}
