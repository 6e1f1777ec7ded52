use std::time::Duration;

use anyhow::{Context, anyhow};
use citycast_core::{Aggregator, CityRegistry, Config, TemperatureUnit, provider_from_config};
use clap::{Parser, Subcommand};
use inquire::Password;

use crate::{render, session};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "citycast", version, about = "Weather for a handful of cities")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the OpenWeather API key.
    Configure,

    /// Fetch and print the weather for the default cities once.
    Show {
        /// Display temperatures in Fahrenheit.
        #[arg(long)]
        fahrenheit: bool,
    },

    /// Search for a city by name or postal code.
    Search {
        /// City name, or digits for a postal code.
        query: String,
    },

    /// Keep the dashboard refreshing in the background and manage cities interactively.
    Run {
        /// Display temperatures in Fahrenheit.
        #[arg(long)]
        fahrenheit: bool,

        /// Seconds between refresh cycles; overrides the config file.
        #[arg(long)]
        interval: Option<u64>,
    },
}

fn unit_for(fahrenheit: bool) -> TemperatureUnit {
    if fahrenheit {
        TemperatureUnit::Fahrenheit
    } else {
        TemperatureUnit::Celsius
    }
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Show { fahrenheit } => show(unit_for(fahrenheit)).await,
            Command::Search { query } => search(&query).await,
            Command::Run {
                fahrenheit,
                interval,
            } => {
                let config = Config::load()?;
                let interval = interval
                    .filter(|&s| s > 0)
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| config.refresh_interval());
                session::run(&config, unit_for(fahrenheit), interval).await
            }
        }
    }
}

fn configure() -> anyhow::Result<()> {
    let mut config = Config::load()?;

    let api_key = Password::new("OpenWeather API key:")
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    if api_key.trim().is_empty() {
        return Err(anyhow!("API key must not be empty"));
    }

    config.set_api_key(api_key);
    let path = config.save()?;
    println!("Saved configuration to {}", path.display());

    Ok(())
}

async fn show(unit: TemperatureUnit) -> anyhow::Result<()> {
    let config = Config::load()?;
    let aggregator = Aggregator::new(provider_from_config(&config)?);
    let registry = CityRegistry::default();

    let outcome = aggregator.refresh(registry.cities()).await;
    if outcome.all_failed() {
        return Err(anyhow!(render::FETCH_FAILED_BANNER));
    }

    print!("{}", render::dashboard(registry.cities(), &outcome, unit));
    Ok(())
}

async fn search(query: &str) -> anyhow::Result<()> {
    let config = Config::load()?;
    let provider = provider_from_config(&config)?;

    let results = provider.search(query).await?;
    if results.is_empty() {
        println!("No matches for '{}'", query.trim());
        return Ok(());
    }

    for candidate in results {
        println!(
            "{}  ({:.4}, {:.4})",
            candidate.display_name(),
            candidate.lat,
            candidate.lon
        );
    }

    Ok(())
}
