//! Seed data written into a table after it is created.

mod batch;
mod sensor;

pub use batch::{Item, SeedBatch, SeedError, SEED_CHUNK_SIZE};
pub use sensor::{event_id, generate_sensor_events, SensorSeedConfig};
