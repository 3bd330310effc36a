//! Provides a builder which can be used to set up a [Registry].
//!
//! # Example
//! Setting up a registry which fires its sweeps using the current tokio runtime:
//! ```no_run
//! # use cachetable::builder::Builder;
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = Builder::new()
//!         .enable_logging()
//!         .settings_file("settings.yml")
//!         .build()
//!         .await?;
//!
//!     let sessions = registry.table::<String, u64>("sessions")?;
//!     sessions.put("alice".to_owned(), 42);
//!
//!     Ok(())
//! }
//! ```
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Settings;
use crate::registry::Registry;
use crate::scheduler::{Scheduler, TimerScheduler};
use crate::{init_logging, CACHETABLE_VERSION};

/// Creates a [Registry] along with its scheduler and settings.
#[derive(Default)]
pub struct Builder {
    setup_logging: bool,
    scheduler: Option<Arc<dyn Scheduler>>,
    settings: Option<Settings>,
    settings_file: Option<PathBuf>,
}

impl Builder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Builder::default()
    }

    /// Enables the automatic setup of the logging system.
    ///
    /// See [init_logging](crate::init_logging) for details.
    pub fn enable_logging(mut self) -> Self {
        self.setup_logging = true;
        self
    }

    /// Disables the automatic setup of the logging system.
    pub fn disable_logging(mut self) -> Self {
        self.setup_logging = false;
        self
    }

    /// Specifies the scheduler used to arm the sweeps of all tables.
    ///
    /// If no scheduler is given, a [TimerScheduler] for the current tokio runtime is used.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Specifies the settings to apply to the tables.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Specifies a YAML file to load the settings from.
    ///
    /// If present, this takes precedence over [settings](Builder::settings).
    pub fn settings_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_file = Some(path.into());
        self
    }

    /// Builds the [Registry].
    ///
    /// # Errors
    /// Fails if the settings file cannot be loaded or if no scheduler was given and this isn't
    /// invoked within a tokio runtime.
    pub async fn build(self) -> anyhow::Result<Arc<Registry>> {
        if self.setup_logging {
            init_logging();
        }

        log::info!("||. CACHETABLE (v {})", CACHETABLE_VERSION);

        let settings = match self.settings_file {
            Some(path) => Settings::load(path).await?,
            None => self.settings.unwrap_or_default(),
        };

        let scheduler: Arc<dyn Scheduler> = match self.scheduler {
            Some(scheduler) => scheduler,
            None => Arc::new(TimerScheduler::current()?),
        };

        Ok(Registry::with_settings(scheduler, settings))
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::Builder;
    use crate::config::{Settings, TableSettings};
    use crate::scheduler::ManualScheduler;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn defaults_use_the_tokio_runtime() {
        let registry = Builder::new().build().await.unwrap();
        assert_eq!(registry.is_empty(), true);
        assert_eq!(registry.settings().tables().count(), 0);
    }

    #[tokio::test]
    async fn given_settings_are_used() {
        let registry = Builder::new()
            .scheduler(Arc::new(ManualScheduler::new()))
            .settings(Settings::new().with_table(
                "sessions",
                TableSettings {
                    default_lifespan: Duration::from_secs(30),
                    log_events: false,
                },
            ))
            .build()
            .await
            .unwrap();

        let table = registry.table::<u32, u32>("sessions").unwrap();
        assert_eq!(table.settings().default_lifespan, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn a_missing_settings_file_is_reported() {
        let result = Builder::new()
            .scheduler(Arc::new(ManualScheduler::new()))
            .settings_file("/this/path/does/not/exist.yml")
            .build()
            .await;
        assert_eq!(result.is_err(), true);
    }
}
