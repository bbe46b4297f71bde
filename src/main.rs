use neuroflow::config::Settings;
use neuroflow::server;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // A panic anywhere in the runtime is unrecoverable for in-flight runs.
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_hook(info);
        std::process::exit(2);
    }));

    let settings = Settings::from_env();
    if let Err(e) = server::serve(settings).await {
        tracing::error!(error = %e, "Startup failed");
        std::process::exit(1);
    }
}
