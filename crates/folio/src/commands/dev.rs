//! Development server command.

use anyhow::Result;
use folio_server::{DevServer, Mode, MODE_ENV};

use super::config::FolioConfig;

/// Command-line overrides for the dev server.
#[derive(Debug, Default)]
pub struct DevFlags {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub open: bool,
    pub production: bool,
}

/// Run the dev server.
pub async fn run(config: &FolioConfig, flags: DevFlags) -> Result<()> {
    let mut server_config = config.dev_server();

    if let Some(port) = flags.port {
        server_config.port = port;
    }
    if let Some(host) = flags.host {
        server_config.host = host;
    }
    server_config.open |= flags.open;
    let env_mode = std::env::var(MODE_ENV).ok();
    server_config.mode = resolve_mode(flags.production, env_mode.as_deref(), server_config.mode);

    tracing::info!(
        "Starting {} server on port {}",
        server_config.mode,
        server_config.port
    );

    DevServer::new(server_config).run().await?;

    Ok(())
}

/// `--production` wins, then `FOLIO_ENV`, then the config file.
///
/// An unrecognised `FOLIO_ENV` value is ignored.
fn resolve_mode(production_flag: bool, env: Option<&str>, configured: Mode) -> Mode {
    if production_flag {
        return Mode::Production;
    }
    env.and_then(|value| value.parse().ok()).unwrap_or(configured)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_forces_production() {
        assert_eq!(
            resolve_mode(true, Some("development"), Mode::Development),
            Mode::Production
        );
    }

    #[test]
    fn env_overrides_config_file() {
        assert_eq!(
            resolve_mode(false, Some("prod"), Mode::Development),
            Mode::Production
        );
        assert_eq!(
            resolve_mode(false, Some("development"), Mode::Production),
            Mode::Development
        );
    }

    #[test]
    fn config_file_is_the_fallback() {
        assert_eq!(resolve_mode(false, None, Mode::Production), Mode::Production);
        assert_eq!(resolve_mode(false, None, Mode::Development), Mode::Development);
        assert_eq!(
            resolve_mode(false, Some("staging"), Mode::Production),
            Mode::Production
        );
    }
}
