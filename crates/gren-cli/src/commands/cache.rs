//! Cache command implementation.

use miette::Result;

use gren_core::config::GlobalConfig;
use gren_util::fs::format_size;

use crate::cli::CacheAction;

pub async fn exec(action: CacheAction) -> Result<()> {
    let config = GlobalConfig::load()?;
    match action {
        CacheAction::Add { dir } => {
            gren_ops::ops_cache::add(&config, &dir).await?;
        }
        CacheAction::Clean => {
            gren_ops::ops_cache::clean(&config).await?;
        }
        CacheAction::Stats => {
            let stats = gren_ops::ops_cache::stats(&config);
            println!("Package cache: {}", stats.root.display());
            println!("  Packages: {}", stats.packages);
            println!("  Size:     {}", format_size(stats.size));
        }
    }
    Ok(())
}
