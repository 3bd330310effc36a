//! Contains the settings applied to tables.
//!
//! Settings are usually loaded from a YAML file and handed to the
//! [Registry](crate::registry::Registry), which applies them to each table it creates. Settings
//! can be re-applied at runtime via [Registry::reconfigure](crate::registry::Registry::reconfigure).
//!
//! # Configuration
//! The settings are expected within an object named **tables**, which specifies the settings for
//! each table by its name:
//!
//! ```yaml
//! tables:
//!     sessions:
//!         # Specifies the lifespan used by Table::put. Supports common suffixes like: ms, s, m,
//!         # h, d. Zero, "eternal" or an absent value mark entries as non-expiring.
//!         default_lifespan: 15m
//!         # Reports all table events (additions, deletions, sweeps) to the log facade, unless
//!         # an explicit logger has been installed for the table.
//!         log_events: true
//! ```
//!
//! # Examples
//! ```
//! # use cachetable::config::Settings;
//! # use std::time::Duration;
//! let settings = Settings::from_yaml_str("
//! tables:
//!     sessions:
//!         default_lifespan: 15m
//! ").unwrap();
//!
//! assert_eq!(settings.table("sessions").default_lifespan, Duration::from_secs(15 * 60));
//!
//! // Unknown tables use the defaults...
//! assert_eq!(settings.table("unknown").default_lifespan, Duration::ZERO);
//! ```
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use yaml_rust::{Yaml, YamlLoader};

use crate::fmt::parse_duration;

/// Contains the settings of a single table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSettings {
    /// The lifespan used by [Table::put](crate::table::Table::put). Zero marks entries as
    /// eternal.
    pub default_lifespan: Duration,

    /// Determines if table events are reported to the **log** facade when no explicit logger is
    /// installed for the table.
    pub log_events: bool,
}

/// Contains the settings of all tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    tables: HashMap<String, TableSettings>,
}

impl Settings {
    /// Creates empty settings, which apply the defaults to all tables.
    pub fn new() -> Self {
        Settings::default()
    }

    /// Specifies the settings for the given table.
    pub fn with_table(mut self, name: impl Into<String>, settings: TableSettings) -> Self {
        let _ = self.tables.insert(name.into(), settings);
        self
    }

    /// Returns the settings for the given table or the defaults if none are present.
    pub fn table(&self, name: &str) -> TableSettings {
        self.tables.get(name).cloned().unwrap_or_default()
    }

    /// Iterates over all tables for which settings are present.
    pub fn tables(&self) -> impl Iterator<Item = (&str, &TableSettings)> {
        self.tables
            .iter()
            .map(|(name, settings)| (name.as_str(), settings))
    }

    /// Reads the settings from the given YAML file.
    ///
    /// # Errors
    /// Fails if the file cannot be read or doesn't contain valid YAML.
    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Settings> {
        let path = path.as_ref();
        log::info!("Loading table settings from {}...", path.display());

        let data = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Cannot load settings file {}", path.display()))?;

        Settings::from_yaml_str(&data)
            .with_context(|| format!("Cannot parse settings file {}", path.display()))
    }

    /// Parses the settings from the given YAML data.
    ///
    /// Note that an invalid table definition is skipped (and reported as error in the log) so
    /// that a single typo doesn't prevent all other tables from being configured.
    ///
    /// # Errors
    /// Fails if the given data isn't valid YAML.
    pub fn from_yaml_str(data: &str) -> anyhow::Result<Settings> {
        let docs = YamlLoader::load_from_str(data)
            .map_err(|error| anyhow::anyhow!("Cannot parse settings: {}", error))?;

        let mut settings = Settings::new();
        let tables = match docs.first().map(|doc| &doc["tables"]) {
            Some(Yaml::Hash(tables)) => tables,
            _ => {
                log::info!("Settings do not contain a 'tables' object. Using defaults.");
                return Ok(settings);
            }
        };

        for (name, config) in tables {
            let name = match name.as_str() {
                Some(name) => name,
                None => {
                    log::error!("Skipping table settings with a non-string name: {:?}", name);
                    continue;
                }
            };

            match parse_table(config) {
                Ok(table) => {
                    let _ = settings.tables.insert(name.to_owned(), table);
                }
                Err(error) => log::error!("Not going to configure table {}: {}", name, error),
            }
        }

        Ok(settings)
    }
}

/// Parses the settings of a single table.
fn parse_table(config: &Yaml) -> anyhow::Result<TableSettings> {
    let default_lifespan = match &config["default_lifespan"] {
        Yaml::BadValue | Yaml::Null => Duration::ZERO,
        Yaml::Integer(millis) if *millis >= 0 => Duration::from_millis(*millis as u64),
        Yaml::String(lifespan) => parse_duration(lifespan)
            .context("Failed to parse 'default_lifespan'")?,
        other => {
            return Err(anyhow::anyhow!(
                "Failed to parse 'default_lifespan': unexpected value {:?}",
                other
            ))
        }
    };

    let log_events = match &config["log_events"] {
        Yaml::BadValue | Yaml::Null => false,
        Yaml::Boolean(flag) => *flag,
        other => {
            return Err(anyhow::anyhow!(
                "Failed to parse 'log_events': expected a boolean but got {:?}",
                other
            ))
        }
    };

    Ok(TableSettings {
        default_lifespan,
        log_events,
    })
}

#[cfg(test)]
mod tests {
    use crate::config::{Settings, TableSettings};
    use std::time::Duration;

    #[test]
    fn tables_are_parsed() {
        let settings = Settings::from_yaml_str(
            "
tables:
    sessions:
        default_lifespan: 15m
        log_events: true
    eternal:
        default_lifespan: eternal
    plain:
        default_lifespan: 250
",
        )
        .unwrap();

        assert_eq!(
            settings.table("sessions"),
            TableSettings {
                default_lifespan: Duration::from_secs(15 * 60),
                log_events: true
            }
        );
        assert_eq!(settings.table("eternal").default_lifespan, Duration::ZERO);
        assert_eq!(
            settings.table("plain").default_lifespan,
            Duration::from_millis(250)
        );
        assert_eq!(settings.tables().count(), 3);
    }

    #[test]
    fn invalid_tables_are_skipped() {
        let settings = Settings::from_yaml_str(
            "
tables:
    broken:
        default_lifespan: 3 years
    flaky:
        log_events: sometimes
    huge:
        default_lifespan: 300000000000000d
    valid:
        default_lifespan: 1h
",
        )
        .unwrap();

        assert_eq!(settings.tables().count(), 1);
        assert_eq!(
            settings.table("valid").default_lifespan,
            Duration::from_secs(60 * 60)
        );
    }

    #[test]
    fn missing_tables_yield_defaults() {
        let settings = Settings::from_yaml_str("server: 42").unwrap();
        assert_eq!(settings, Settings::new());
        assert!(Settings::from_yaml_str("tables: 'broken").is_err());
    }

    #[tokio::test]
    async fn settings_can_be_loaded_from_disk() {
        let path = std::env::temp_dir().join(format!("cachetable-{}.yml", std::process::id()));
        tokio::fs::write(&path, "tables:\n    users:\n        default_lifespan: 2s\n")
            .await
            .unwrap();

        let settings = Settings::load(&path).await.unwrap();
        assert_eq!(
            settings.table("users").default_lifespan,
            Duration::from_secs(2)
        );

        tokio::fs::remove_file(&path).await.unwrap();
        assert!(Settings::load(&path).await.is_err());
    }
}
