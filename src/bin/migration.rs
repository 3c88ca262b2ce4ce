use courseware_api::{config, migrator};
use std::env;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // DATABASE_URL wins over the layered config so one-off runs stay easy
    let database_url = match env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => config::load_config()?.database_url,
    };

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        None | Some("up") => migrator::run_migration(&database_url).await?,
        Some("down") => {
            let steps = args.next().map(|s| s.parse()).transpose()?.unwrap_or(1);
            migrator::rollback_migration(&database_url, steps).await?;
        }
        Some(other) => {
            error!(command = other, "Unknown migration command; expected `up` or `down [steps]`");
            std::process::exit(2);
        }
    }

    info!("Migration completed successfully");
    Ok(())
}
