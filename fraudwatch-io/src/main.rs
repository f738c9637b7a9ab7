use fraudwatch::builder::Builder;

#[tokio::main]
async fn main() {
    // Build a platform and enable all features...
    let platform = Builder::new().enable_all().build().await;

    // Perform the initial load and start refreshing the watchlist...
    if let Err(error) = fraudwatch::watchlist::install(&platform).await {
        log::error!("{:#}", error);
        platform.terminate();
        std::process::exit(1);
    }

    if let Err(error) = fraudwatch::api::event_loop(platform.clone()).await {
        log::error!("{:#}", error);
        platform.terminate();
        std::process::exit(2);
    }
}
