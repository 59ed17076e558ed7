//! Variable lookup, parsing and validation.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::debug;

use crate::defaults;
use crate::error::{ConfigError, ConfigResult};
use crate::model::{
    AppConfig, AppMode, FcmConfig, FerryConfig, GDriveSettings, LinksConfig, MegaSettings,
    QueueConfig, StagingConfig, TorrentSettings,
};

/// Prefix shared by every ferry variable.
pub const ENV_PREFIX: &str = "FERRY_";

/// Reads prefixed variables through an injectable lookup.
struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn name(key: &str) -> String {
        format!("{ENV_PREFIX}{key}")
    }

    /// Trimmed, non-empty value of `FERRY_<key>`.
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(&Self::name(key))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn required_name(&self, section: &'static str, key: &str, default: &str) -> ConfigResult<String> {
        let value = self.string(key, default);
        if value.trim_matches('/').is_empty() {
            return Err(ConfigError::invalid(
                section,
                &Self::name(key),
                Some(&value),
                "must not be empty",
            ));
        }
        Ok(value)
    }

    fn parsed<T: FromStr>(&self, section: &'static str, key: &str) -> ConfigResult<Option<T>> {
        self.get(key)
            .map(|raw| {
                raw.parse().map_err(|_| {
                    ConfigError::invalid(section, &Self::name(key), Some(&raw), "unparseable value")
                })
            })
            .transpose()
    }

    fn positive(&self, section: &'static str, key: &str, default: u64) -> ConfigResult<u64> {
        let value = self.parsed::<u64>(section, key)?.unwrap_or(default);
        if value == 0 {
            return Err(ConfigError::invalid(
                section,
                &Self::name(key),
                Some("0"),
                "must be positive",
            ));
        }
        Ok(value)
    }
}

impl FerryConfig {
    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error when a variable is present but invalid.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    ///
    /// Returns an error when a variable is present but invalid.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").filter(|value| !value.trim().is_empty());
        let vars = Vars { lookup };

        let config = Self {
            database_url,
            app: app_section(&vars)?,
            staging: staging_section(&vars),
            links: links_section(&vars)?,
            gdrive: GDriveSettings {
                client_id: vars.string("GDRIVE_CLIENT_ID", ""),
                client_secret: vars.string("GDRIVE_CLIENT_SECRET", ""),
                folder_name: vars.required_name("gdrive", "GDRIVE_FOLDER", defaults::FOLDER_NAME)?,
                api_base: vars.string("GDRIVE_API_BASE", defaults::DRIVE_API_BASE),
                upload_base: vars.string("GDRIVE_UPLOAD_BASE", defaults::DRIVE_UPLOAD_BASE),
                token_url: vars.string("GDRIVE_TOKEN_URL", defaults::DRIVE_TOKEN_URL),
            },
            mega: MegaSettings {
                get_bin: vars.required_name("mega", "MEGA_GET_BIN", defaults::MEGA_GET_BIN)?,
                put_bin: vars.required_name("mega", "MEGA_PUT_BIN", defaults::MEGA_PUT_BIN)?,
                export_bin: vars.required_name(
                    "mega",
                    "MEGA_EXPORT_BIN",
                    defaults::MEGA_EXPORT_BIN,
                )?,
                folder_name: vars.required_name("mega", "MEGA_FOLDER", defaults::FOLDER_NAME)?,
                quota_exit_code: vars
                    .parsed("mega", "MEGA_QUOTA_EXIT_CODE")?
                    .unwrap_or(defaults::MEGA_QUOTA_EXIT_CODE),
            },
            torrent: TorrentSettings {
                rpc_url: vars.string("TRANSMISSION_URL", defaults::TRANSMISSION_URL),
                username: vars.get("TRANSMISSION_USER"),
                password: vars.get("TRANSMISSION_PASSWORD"),
                sample_interval: Duration::from_secs(vars.positive(
                    "torrent",
                    "TORRENT_SAMPLE_SECS",
                    defaults::TORRENT_SAMPLE_SECS,
                )?),
            },
            fcm: FcmConfig {
                project_id: vars.get("FCM_PROJECT_ID"),
                access_token: vars.get("FCM_ACCESS_TOKEN"),
                endpoint: vars.string("FCM_ENDPOINT", defaults::FCM_ENDPOINT),
            },
            queue: QueueConfig {
                lease: Duration::from_secs(vars.positive(
                    "queue",
                    "QUEUE_LEASE_SECS",
                    defaults::QUEUE_LEASE_SECS,
                )?),
                poll_interval: Duration::from_millis(vars.positive(
                    "queue",
                    "QUEUE_POLL_MS",
                    defaults::QUEUE_POLL_MILLIS,
                )?),
            },
        };
        debug!(mode = %config.app.mode, listen = %config.app.listen, "configuration loaded");
        Ok(config)
    }
}

fn app_section<F>(vars: &Vars<F>) -> ConfigResult<AppConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mode = match vars.get("MODE") {
        Some(raw) => raw.parse::<AppMode>()?,
        None => AppMode::All,
    };
    let bind: IpAddr = vars
        .parsed("app", "BIND_ADDR")?
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    let port: u16 = vars.parsed("app", "HTTP_PORT")?.unwrap_or(defaults::HTTP_PORT);
    if port == 0 {
        return Err(ConfigError::invalid(
            "app",
            "FERRY_HTTP_PORT",
            Some("0"),
            "must be between 1 and 65535",
        ));
    }
    Ok(AppConfig {
        mode,
        listen: SocketAddr::new(bind, port),
        log_level: vars.string("LOG_LEVEL", defaults::LOG_LEVEL),
        log_format: vars.get("LOG_FORMAT"),
    })
}

fn staging_section<F>(vars: &Vars<F>) -> StagingConfig
where
    F: Fn(&str) -> Option<String>,
{
    let root = vars
        .get("STAGING_ROOT")
        .map_or_else(|| std::env::temp_dir().join(defaults::STAGING_DIR), PathBuf::from);
    let served_root = vars.get("SERVED_ROOT").map_or_else(
        || {
            root.parent()
                .map_or_else(std::env::temp_dir, PathBuf::from)
                .join(defaults::SERVED_DIR)
        },
        PathBuf::from,
    );
    StagingConfig { root, served_root }
}

fn links_section<F>(vars: &Vars<F>) -> ConfigResult<LinksConfig>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(LinksConfig {
        default_host: vars.required_name("links", "DEFAULT_HOST", defaults::DEFAULT_HOST)?,
        public_ip: vars.parsed("links", "PUBLIC_IP")?,
        ip_lookup_url: vars.string("IP_LOOKUP_URL", defaults::IP_LOOKUP_URL),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> ConfigResult<FerryConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        FerryConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() -> anyhow::Result<()> {
        let config = load(&[])?;
        assert_eq!(config.database_url, None);
        assert_eq!(config.app.mode, AppMode::All);
        assert_eq!(config.app.listen.port(), 8080);
        assert_eq!(config.mega.quota_exit_code, 239);
        assert_eq!(config.mega.folder_name, "Ferry");
        assert_eq!(config.torrent.sample_interval, Duration::from_secs(5));
        assert_eq!(config.queue.lease, Duration::from_secs(1800));
        assert!(config.staging.root.ends_with("ferry-staging"));
        assert!(config.staging.served_root.ends_with("ferry-served"));
        assert!(!config.fcm.is_enabled());
        Ok(())
    }

    #[test]
    fn blank_values_fall_back_to_defaults() -> anyhow::Result<()> {
        let config = load(&[("FERRY_GDRIVE_FOLDER", "   "), ("DATABASE_URL", "")])?;
        assert_eq!(config.gdrive.folder_name, "Ferry");
        assert_eq!(config.database_url, None);
        Ok(())
    }

    #[test]
    fn invalid_fields_name_the_variable() {
        let err = load(&[("FERRY_HTTP_PORT", "0")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidField { field, reason: "must be between 1 and 65535", .. }
                if field == "FERRY_HTTP_PORT"
        ));

        let err = load(&[("FERRY_QUEUE_POLL_MS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { reason: "must be positive", .. }));

        let err = load(&[("FERRY_PUBLIC_IP", "not-an-ip")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidField { value: Some(value), .. } if value == "not-an-ip"
        ));

        let err = load(&[("FERRY_MEGA_FOLDER", "/")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { section: "mega", .. }));
    }
}
