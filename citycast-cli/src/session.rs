//! Interactive dashboard: background refresh plus a city-management menu.

use std::{fmt, sync::Arc, time::Duration};

use anyhow::Context;
use citycast_core::{
    Aggregator, CityRegistry, Config, GeocodingCandidate, Location, RefreshCycle,
    RefreshScheduler, TemperatureUnit, WeatherProvider, provider_from_config,
};
use inquire::{InquireError, MultiSelect, Select, Text};

use crate::render;

const REFRESH_WAIT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuAction {
    ShowWeather,
    RefreshNow,
    ReplaceCity,
    AddCity,
    RemoveCity,
    ChooseCities,
    ResetCities,
    ToggleUnit,
    Quit,
}

impl MenuAction {
    const ALL: [MenuAction; 9] = [
        MenuAction::ShowWeather,
        MenuAction::RefreshNow,
        MenuAction::ReplaceCity,
        MenuAction::AddCity,
        MenuAction::RemoveCity,
        MenuAction::ChooseCities,
        MenuAction::ResetCities,
        MenuAction::ToggleUnit,
        MenuAction::Quit,
    ];
}

impl fmt::Display for MenuAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MenuAction::ShowWeather => "Show weather",
            MenuAction::RefreshNow => "Refresh now",
            MenuAction::ReplaceCity => "Replace a city",
            MenuAction::AddCity => "Add a city",
            MenuAction::RemoveCity => "Remove a city",
            MenuAction::ChooseCities => "Choose cities to keep",
            MenuAction::ResetCities => "Reset to default cities",
            MenuAction::ToggleUnit => "Toggle °C/°F",
            MenuAction::Quit => "Quit",
        };
        f.write_str(label)
    }
}

/// Run a blocking inquire prompt off the async runtime. A cancelled prompt
/// (Esc / Ctrl-C) yields `None`.
async fn prompt<T, F>(f: F) -> anyhow::Result<Option<T>>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, InquireError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await.context("Prompt task failed")? {
        Ok(value) => Ok(Some(value)),
        Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

struct Session {
    scheduler: RefreshScheduler,
    provider: Arc<dyn WeatherProvider>,
    unit: TemperatureUnit,
}

pub async fn run(
    config: &Config,
    unit: TemperatureUnit,
    interval: Duration,
) -> anyhow::Result<()> {
    let provider = provider_from_config(config)?;
    let registry = CityRegistry::default().into_shared();
    let cycle = RefreshCycle::new(Aggregator::new(Arc::clone(&provider)), registry);

    let mut session = Session {
        scheduler: RefreshScheduler::start(cycle, interval),
        provider,
        unit,
    };

    println!("Refreshing every {} s. Loading weather…", interval.as_secs());
    session.wait_for_refresh(false).await;
    session.print_weather().await;

    loop {
        let Some(action) =
            prompt(|| Select::new("What next?", MenuAction::ALL.to_vec()).prompt()).await?
        else {
            break;
        };

        match action {
            MenuAction::ShowWeather => session.print_weather().await,
            MenuAction::RefreshNow => {
                session.wait_for_refresh(true).await;
                session.print_weather().await;
            }
            MenuAction::ReplaceCity => session.replace_city().await?,
            MenuAction::AddCity => session.add_city().await?,
            MenuAction::RemoveCity => session.remove_city().await?,
            MenuAction::ChooseCities => session.choose_cities().await?,
            MenuAction::ResetCities => {
                session.scheduler.cycle().registry().write().await.reset();
                tracing::info!("Restored default cities");
                println!("Restored the default cities.");
                session.scheduler.refresh_now();
            }
            MenuAction::ToggleUnit => {
                session.unit = session.unit.toggle();
                println!("Showing temperatures in {}", session.unit.symbol());
            }
            MenuAction::Quit => break,
        }
    }

    session.scheduler.stop();
    Ok(())
}

impl Session {
    async fn cities(&self) -> Vec<Location> {
        self.scheduler.cycle().registry().read().await.cities().to_vec()
    }

    /// Wait for the next published outcome, optionally triggering a cycle first.
    async fn wait_for_refresh(&self, trigger: bool) {
        let mut rx = self.scheduler.subscribe();

        let waited = if trigger {
            drop(rx.borrow_and_update());
            tracing::debug!("Refresh requested from the menu");
            self.scheduler.refresh_now();
            tokio::time::timeout(REFRESH_WAIT, rx.changed())
                .await
                .map(|_| ())
        } else {
            tokio::time::timeout(REFRESH_WAIT, rx.wait_for(|o| o.is_some()))
                .await
                .map(|_| ())
        };

        if waited.is_err() {
            tracing::warn!(wait_secs = REFRESH_WAIT.as_secs(), "No refresh outcome in time");
            println!("Still waiting for the provider; showing the last known data.");
        }
    }

    async fn print_weather(&self) {
        let cities = self.cities().await;
        match self.scheduler.cycle().latest() {
            Some(outcome) => print!("{}", render::dashboard(&cities, &outcome, self.unit)),
            None => println!("No weather data yet."),
        }
    }

    async fn pick_city(&self, message: &'static str) -> anyhow::Result<Option<Location>> {
        let cities = self.cities().await;
        prompt(move || Select::new(message, cities).prompt()).await
    }

    async fn search_candidate(&self) -> anyhow::Result<Option<GeocodingCandidate>> {
        let Some(query) =
            prompt(|| Text::new("Search city by name or zip code:").prompt()).await?
        else {
            return Ok(None);
        };

        let results = match self.provider.search(&query).await {
            Ok(results) => results,
            Err(e) => {
                println!("Search failed: {e}");
                return Ok(None);
            }
        };

        if results.is_empty() {
            println!("No matches for '{}'", query.trim());
            return Ok(None);
        }

        prompt(move || Select::new("Pick a match:", results).prompt()).await
    }

    async fn replace_city(&self) -> anyhow::Result<()> {
        let Some(target) = self.pick_city("Replace which city?").await? else {
            return Ok(());
        };
        let Some(candidate) = self.search_candidate().await? else {
            return Ok(());
        };

        let result = self
            .scheduler
            .cycle()
            .registry()
            .write()
            .await
            .replace(target.id, candidate.into_location(target.id))
            .map(|city| city.to_string());

        match result {
            Ok(city) => {
                tracing::info!(city_id = target.id, from = %target, to = %city, "Replaced city");
                println!("Replaced {target} with {city}");
                self.scheduler.refresh_now();
            }
            Err(e) => println!("{e}"),
        }
        Ok(())
    }

    async fn add_city(&self) -> anyhow::Result<()> {
        let Some(candidate) = self.search_candidate().await? else {
            return Ok(());
        };

        let mut registry = self.scheduler.cycle().registry().write().await;
        let added = registry.next_id().and_then(|id| {
            let city = candidate.into_location(id);
            let label = city.to_string();
            registry.add(city).map(|()| (id, label))
        });
        drop(registry);

        match added {
            Ok((id, label)) => {
                tracing::info!(city_id = id, name = %label, "Added city");
                println!("Added {label}");
                self.scheduler.refresh_now();
            }
            Err(e) => println!("{e}"),
        }
        Ok(())
    }

    async fn remove_city(&self) -> anyhow::Result<()> {
        if self.cities().await.len() <= 1 {
            println!("{}", citycast_core::RegistryError::EmptyCityList);
            return Ok(());
        }
        let Some(target) = self.pick_city("Remove which city?").await? else {
            return Ok(());
        };

        match self.scheduler.cycle().registry().write().await.remove(target.id) {
            Ok(removed) => {
                tracing::info!(city_id = removed.id, name = %removed, "Removed city");
                println!("Removed {removed}");
            }
            Err(e) => println!("{e}"),
        }
        Ok(())
    }

    async fn choose_cities(&self) -> anyhow::Result<()> {
        let cities = self.cities().await;
        let Some(keep) = prompt(move || {
            let all: Vec<usize> = (0..cities.len()).collect();
            MultiSelect::new("Cities to keep:", cities)
                .with_default(&all)
                .prompt()
        })
        .await?
        else {
            return Ok(());
        };

        let count = keep.len();
        match self.scheduler.cycle().registry().write().await.set_all(keep) {
            Ok(()) => {
                tracing::info!(count, "Replaced city list");
                println!("Keeping {count} cities");
                self.scheduler.refresh_now();
            }
            Err(e) => println!("{e}"),
        }
        Ok(())
    }
}
