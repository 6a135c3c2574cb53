//! Generates environment sensor events for the sensor-event table.

use rand::seq::IndexedRandom;
use rand::Rng;
use serde_json::json;
use uuid::Uuid;

use crate::schema::{DEVICE_ID, EPOCH_S, EVENT_ID, EXPIRY, GEO_LOCATION, USER_ID};

use super::batch::{Item, SeedBatch};

const LOCATIONS: [(&str, &[&str]); 3] = [
    ("TX", &["Austin", "San Antonio"]),
    ("CA", &["Berkely", "Las Angeles", "San Diego"]),
    ("VT", &["Burlington", "St. Albans"]),
];

/// Shape of a generated data set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorSeedConfig {
    pub users: usize,
    pub devices_per_user: usize,
    pub events_per_device: usize,
}

impl Default for SensorSeedConfig {
    fn default() -> Self {
        Self {
            users: 4,
            devices_per_user: 2,
            events_per_device: 10,
        }
    }
}

fn random_uuid<R: Rng + ?Sized>(rng: &mut R) -> String {
    uuid::Builder::from_random_bytes(rng.random())
        .into_uuid()
        .to_string()
}

fn random_location<R: Rng + ?Sized>(rng: &mut R) -> String {
    let (state, cities) = LOCATIONS[rng.random_range(0..LOCATIONS.len())];
    let city = cities.choose(rng).copied().unwrap_or_default();
    format!("Earth-US-{state}-{city}")
}

fn sensor_event<R: Rng + ?Sized>(
    rng: &mut R,
    user_id: &str,
    device_id: &str,
    geo_location: &str,
    now_epoch: i64,
) -> Item {
    let epoch_s = now_epoch - rng.random_range(100..10_000);
    // Three events out of four never expire.
    let expiry = if rng.random_range(0..4) == 0 {
        epoch_s + rng.random_range(60..600)
    } else {
        0
    };
    let temp_c = (rng.random::<f64>() * 120.0 * 100.0).round() / 100.0;

    Item::from([
        (USER_ID.to_string(), json!(user_id)),
        (DEVICE_ID.to_string(), json!(device_id)),
        (EVENT_ID.to_string(), json!(random_uuid(rng))),
        (GEO_LOCATION.to_string(), json!(geo_location)),
        (EPOCH_S.to_string(), json!(epoch_s)),
        (EXPIRY.to_string(), json!(expiry)),
        ("tempC".to_string(), json!(temp_c)),
        ("humidityPct".to_string(), json!(rng.random_range(0..=100))),
        ("pressurePa".to_string(), json!(rng.random_range(100_000..=105_000))),
    ])
}

/// Generates `users × devices_per_user × events_per_device` sensor events.
/// Every device has a fixed location; event times fall before `now_epoch`.
pub fn generate_sensor_events<R: Rng + ?Sized>(
    rng: &mut R,
    config: &SensorSeedConfig,
    now_epoch: i64,
) -> SeedBatch {
    let mut items = Vec::with_capacity(config.users * config.devices_per_user * config.events_per_device);
    for _ in 0..config.users {
        let user_id = random_uuid(rng);
        for _ in 0..config.devices_per_user {
            let device_id = random_uuid(rng);
            let geo_location = random_location(rng);
            for _ in 0..config.events_per_device {
                items.push(sensor_event(rng, &user_id, &device_id, &geo_location, now_epoch));
            }
        }
    }
    SeedBatch::new(items)
}

/// Parses a generated event id back into a uuid.
pub fn event_id(item: &Item) -> Option<Uuid> {
    item.get(EVENT_ID)?.as_str()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::sensor_events_table;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeSet;

    const NOW: i64 = 1_760_000_000;

    fn generate(config: &SensorSeedConfig) -> SeedBatch {
        let mut rng = StdRng::seed_from_u64(7);
        generate_sensor_events(&mut rng, config, NOW)
    }

    #[test]
    fn test_default_shape() {
        let batch = generate(&SensorSeedConfig::default());

        assert_eq!(batch.len(), 80);
        let distinct = |attribute: &str| -> BTreeSet<String> {
            batch
                .items()
                .iter()
                .filter_map(|i| i[attribute].as_str().map(str::to_string))
                .collect()
        };
        let users = distinct(USER_ID);
        let devices = distinct(DEVICE_ID);
        assert_eq!(users.len(), 4);
        assert_eq!(devices.len(), 8);
    }

    #[test]
    fn test_events_carry_the_table_key() {
        let batch = generate(&SensorSeedConfig::default());
        assert!(batch.check_keys(&sensor_events_table().primary_key).is_ok());
        assert!(batch.items().iter().all(|item| event_id(item).is_some()));
    }

    #[test]
    fn test_values_stay_in_range() {
        let batch = generate(&SensorSeedConfig::default());

        for item in batch.items() {
            let epoch = item[EPOCH_S].as_i64().unwrap();
            assert!((NOW - 10_000..=NOW - 100).contains(&epoch));

            let expiry = item[EXPIRY].as_i64().unwrap();
            assert!(expiry == 0 || (epoch + 60..epoch + 600).contains(&expiry));

            let temp = item["tempC"].as_f64().unwrap();
            assert!((0.0..=120.0).contains(&temp));
            assert!(item["humidityPct"].as_i64().unwrap() <= 100);
            let pressure = item["pressurePa"].as_i64().unwrap();
            assert!((100_000..=105_000).contains(&pressure));

            let location = item[GEO_LOCATION].as_str().unwrap();
            assert!(location.starts_with("Earth-US-"));
        }
    }

    #[test]
    fn test_same_seed_same_events() {
        let config = SensorSeedConfig {
            users: 1,
            devices_per_user: 1,
            events_per_device: 3,
        };
        assert_eq!(generate(&config), generate(&config));
    }
}
