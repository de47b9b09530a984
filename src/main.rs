use tracing_subscriber::fmt::format::FmtSpan;

use jobboard_banners::config::Config;
use jobboard_banners::error::Error;

#[actix_web::main]
async fn main() -> Result<(), Error> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level())
        .with_span_events(FmtSpan::NEW)
        .compact()
        .init();

    jobboard_banners::run(config).await
}
