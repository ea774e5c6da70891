//! CLI argument definitions for the `kiln` binary.

use std::path::PathBuf;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use url::Url;

use kiln_config::{Config, LogFormat, StopPolicy};

/// Command-line interface for the Kiln local runtime.
#[derive(Parser, Debug)]
#[command(name = "kiln", version, about = "Manage the local Kiln runtime")]
pub(crate) struct Cli {
    /// Configuration file to load instead of the default location.
    #[arg(long, global = true, value_name = "PATH")]
    pub(crate) config: Option<PathBuf>,
    /// Base URL of the local runtime API.
    #[arg(long, global = true, value_name = "URL")]
    pub(crate) base_url: Option<Url>,
    /// Installer binary to drive instead of the configured one.
    #[arg(long, global = true, value_name = "PATH")]
    pub(crate) installer_bin: Option<Utf8PathBuf>,
    /// What a stop does with running workloads.
    #[arg(long, global = true, value_enum, value_name = "POLICY")]
    pub(crate) stop_policy: Option<StopPolicy>,
    /// Tracing filter, for example `info` or `kiln_core=debug`.
    #[arg(long, global = true, value_name = "FILTER")]
    pub(crate) log_filter: Option<String>,
    /// Log output format.
    #[arg(long, global = true, value_enum, value_name = "FORMAT")]
    pub(crate) log_format: Option<LogFormat>,
    #[command(subcommand)]
    pub(crate) command: Command,
}

impl Cli {
    /// Applies command-line overrides on top of the loaded configuration.
    pub(crate) fn apply_to(&self, config: &mut Config) {
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(installer_bin) = &self.installer_bin {
            config.installer_bin = Some(installer_bin.clone());
        }
        if let Some(stop_policy) = self.stop_policy {
            config.stop_policy = stop_policy;
        }
        if let Some(log_filter) = &self.log_filter {
            config.log_filter = log_filter.clone();
        }
        if let Some(log_format) = self.log_format {
            config.log_format = log_format;
        }
    }
}

/// Subcommands of the `kiln` binary.
#[derive(Subcommand, Debug, Clone)]
pub(crate) enum Command {
    /// Reports the installation status of the runtime.
    Status {
        /// Query the installer even when a cached status exists.
        #[arg(long)]
        refresh: bool,
        /// Emit a JSON document instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Downloads the runtime images and starts the runtime.
    Install,
    /// Starts the installed runtime.
    Start,
    /// Stops the runtime.
    Stop {
        /// Also stop workload containers, without asking.
        #[arg(long, conflicts_with = "runtime_only")]
        all: bool,
        /// Stop only the runtime containers, without asking.
        #[arg(long)]
        runtime_only: bool,
    },
    /// Stops the runtime if needed and removes its images.
    Uninstall {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    /// Lists the workloads hosted by the local runtime.
    Apps,
}

/// Stop policy for this invocation: explicit scope flags beat configuration.
pub(crate) fn effective_stop_policy(
    all: bool,
    runtime_only: bool,
    configured: StopPolicy,
) -> StopPolicy {
    if all {
        StopPolicy::Always
    } else if runtime_only {
        StopPolicy::Never
    } else {
        configured
    }
}
