//! The ordered list of monitored cities.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    error::RegistryError,
    model::{Location, LocationId},
};

/// Registry shared between the refresh scheduler and the city manager.
pub type SharedRegistry = Arc<RwLock<CityRegistry>>;

const DEFAULT_CITIES: &[(LocationId, &str, &str, f64, f64)] = &[
    (1, "Algiers", "DZ", 36.7538, 3.0588),
    (2, "London", "GB", 51.5074, -0.1278),
    (3, "Tokyo", "JP", 35.6762, 139.6503),
    (4, "Sydney", "AU", -33.8688, 151.2093),
    (5, "Dubai", "AE", 25.2048, 55.2708),
    (6, "Paris", "FR", 48.8566, 2.3522),
];

pub fn default_cities() -> Vec<Location> {
    DEFAULT_CITIES
        .iter()
        .map(|&(id, name, country, lat, lon)| Location::new(id, name, country, lat, lon))
        .collect()
}

/// Ordered set of locations, unique by id.
#[derive(Debug, Clone, PartialEq)]
pub struct CityRegistry {
    cities: Vec<Location>,
}

impl Default for CityRegistry {
    fn default() -> Self {
        Self {
            cities: default_cities(),
        }
    }
}

impl CityRegistry {
    pub fn new(cities: Vec<Location>) -> Result<Self, RegistryError> {
        let mut registry = Self::default();
        registry.set_all(cities)?;
        Ok(registry)
    }

    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    pub fn cities(&self) -> &[Location] {
        &self.cities
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }

    pub fn get(&self, id: LocationId) -> Option<&Location> {
        self.cities.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: LocationId) -> bool {
        self.get(id).is_some()
    }

    /// Smallest id strictly above every registered id.
    pub fn next_id(&self) -> Result<LocationId, RegistryError> {
        match self.cities.iter().map(|c| c.id).max() {
            None => Ok(1),
            Some(max) => max.checked_add(1).ok_or(RegistryError::IdsExhausted),
        }
    }

    /// Swap the city at `target` for `replacement`, keeping `target` as its id
    /// and its position in the list.
    pub fn replace(
        &mut self,
        target: LocationId,
        replacement: Location,
    ) -> Result<&Location, RegistryError> {
        check_coordinates(&replacement)?;

        let slot = self
            .cities
            .iter_mut()
            .find(|c| c.id == target)
            .ok_or(RegistryError::UnknownCity(target))?;

        *slot = Location {
            id: target,
            ..replacement
        };

        tracing::debug!(city_id = target, name = %slot.name, "Replaced city");
        Ok(&*slot)
    }

    /// Replace the whole list. Rejects an empty list and duplicate ids.
    pub fn set_all(&mut self, cities: Vec<Location>) -> Result<(), RegistryError> {
        if cities.is_empty() {
            return Err(RegistryError::EmptyCityList);
        }

        for (idx, city) in cities.iter().enumerate() {
            check_coordinates(city)?;
            if cities[..idx].iter().any(|c| c.id == city.id) {
                return Err(RegistryError::DuplicateId(city.id));
            }
        }

        tracing::debug!(count = cities.len(), "Replaced city list");
        self.cities = cities;
        Ok(())
    }

    pub fn add(&mut self, city: Location) -> Result<(), RegistryError> {
        check_coordinates(&city)?;
        if self.contains(city.id) {
            return Err(RegistryError::DuplicateId(city.id));
        }

        tracing::debug!(city_id = city.id, name = %city.name, "Added city");
        self.cities.push(city);
        Ok(())
    }

    pub fn remove(&mut self, id: LocationId) -> Result<Location, RegistryError> {
        let idx = self
            .cities
            .iter()
            .position(|c| c.id == id)
            .ok_or(RegistryError::UnknownCity(id))?;

        let removed = self.cities.remove(idx);
        tracing::debug!(city_id = id, name = %removed.name, "Removed city");
        Ok(removed)
    }

    pub fn reset(&mut self) {
        self.cities = default_cities();
    }
}

fn check_coordinates(city: &Location) -> Result<(), RegistryError> {
    if city.coordinates.is_valid() {
        Ok(())
    } else {
        Err(RegistryError::InvalidCoordinates {
            lat: city.coordinates.lat,
            lon: city.coordinates.lon,
        })
    }
}
