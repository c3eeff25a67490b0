//! Synthetic geospatial dataset written before a benchmark's timed region.

use std::time::{SystemTime, UNIX_EPOCH};

use indicatif::ProgressBar;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{HarnessError, Result};
use crate::resp::Command;
use crate::service::Service;

pub const DEFAULT_POINTS: usize = 200_000;
pub const DEFAULT_RECORD_KEY: &str = "mykey";
pub const FIELD_NAME: &str = "foo";

/// One generated record. `value` is in [0,1), `lat` in [-90,90) and `lon`
/// in [-180,180).
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadPoint {
    pub label: String,
    pub value: f64,
    pub lat: f64,
    pub lon: f64,
}

impl WorkloadPoint {
    /// `SET <key> <label> FIELD foo <value> POINT <lat> <lon>`
    pub fn to_command(&self, key: &str) -> Command {
        Command::new("SET")
            .arg(key)
            .arg(&self.label)
            .arg("FIELD")
            .arg(FIELD_NAME)
            .arg(self.value)
            .arg("POINT")
            .arg(self.lat)
            .arg(self.lon)
    }
}

/// Seed derived from the wall clock.
pub fn time_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

pub struct WorkloadGenerator<R: Rng = ChaCha8Rng> {
    rng: R,
    record_key: String,
}

impl WorkloadGenerator<ChaCha8Rng> {
    pub fn from_seed(seed: u64) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl<R: Rng> WorkloadGenerator<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            record_key: DEFAULT_RECORD_KEY.to_string(),
        }
    }

    pub fn with_record_key(mut self, key: impl Into<String>) -> Self {
        self.record_key = key.into();
        self
    }

    pub fn record_key(&self) -> &str {
        &self.record_key
    }

    /// Draws value, latitude and longitude, in that order.
    pub fn next_point(&mut self, index: usize) -> WorkloadPoint {
        let value: f64 = self.rng.gen();
        let lat = self.rng.gen::<f64>() * 180.0 - 90.0;
        let lon = self.rng.gen::<f64>() * 360.0 - 180.0;
        WorkloadPoint {
            label: format!("val:{}", index),
            value,
            lat,
            lon,
        }
    }

    pub fn points(&mut self, count: usize) -> impl Iterator<Item = WorkloadPoint> + '_ {
        (0..count).map(move |i| self.next_point(i))
    }

    /// Write `count` points, checking every acknowledgement. Stops at the
    /// first write that fails or replies with anything but `OK`.
    pub fn load(&mut self, service: &mut dyn Service, count: usize, progress: &ProgressBar) -> Result<usize> {
        tracing::debug!("Loading {} points into {}", count, self.record_key);
        for index in 0..count {
            let command = self.next_point(index).to_command(&self.record_key);
            let reply = service.execute(&command).map_err(|e| HarnessError::Workload {
                index,
                source: Box::new(e),
            })?;
            if !reply.is_ok() {
                return Err(HarnessError::Workload {
                    index,
                    source: Box::new(HarnessError::Unexpected {
                        command: command.to_string(),
                        expected: "OK".to_string(),
                        actual: reply.to_string(),
                    }),
                });
            }
            progress.inc(1);
        }
        progress.finish_and_clear();
        Ok(count)
    }
}
