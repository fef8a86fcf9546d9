//! Static site build command.

use std::path::PathBuf;

use anyhow::Result;
use folio_content::LocaleIndex;
use folio_static::StaticBuilder;

use super::config::FolioConfig;

/// Run the build command.
pub async fn run(config: &FolioConfig, output: Option<PathBuf>, minify: Option<bool>) -> Result<()> {
    tracing::info!("Building static site...");

    let mut build_config = config.build();
    if let Some(output) = output {
        build_config.output_dir = output;
    }
    if let Some(minify) = minify {
        build_config.minify = minify;
    }

    let locales = LocaleIndex::new(config.site.default_locale.clone());
    let result = StaticBuilder::new(build_config)
        .with_localization(&locales)
        .build()
        .await?;

    for skipped in &result.skipped {
        tracing::warn!("Skipped {}", skipped);
    }

    tracing::info!(
        "Built {} pages and {} assets in {}ms",
        result.pages,
        result.assets,
        result.duration_ms
    );

    let languages = locales.locales();
    if languages.len() > 1 {
        tracing::info!("Locales: {}", languages.join(", "));
    }

    tracing::info!("Output: {}", result.output_dir.display());

    Ok(())
}
