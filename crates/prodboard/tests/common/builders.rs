//! Builder patterns for test configuration and production data.
//!
//! These builders allow tests to set up engines and seed the reporting
//! tables programmatically without hand-writing SQL in every test.

#![allow(dead_code)]

use std::path::Path;

use rusqlite::{named_params, Connection};
use serde_json::{json, Value};

use prodboard::config::{ArtifactsConfig, DatabaseConfig, RetryConfig, StatusConfig, WorkerConfig};
use prodboard::Config;

/// Builder for creating an engine `Config` rooted in a test directory.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Database and artifacts both live under `root`.
    pub fn new(root: &Path) -> Self {
        Self {
            config: Config {
                version: "1.0".to_string(),
                database: DatabaseConfig {
                    path: root.join("data").join("prodboard.db"),
                    reporting_path: None,
                    pool_size: 4,
                    acquire_timeout_ms: 1000,
                    busy_timeout_ms: 5000,
                },
                artifacts: ArtifactsConfig {
                    directory: root.join("artifacts"),
                },
                worker: WorkerConfig {
                    count: 0,
                    poll_interval_ms: 25,
                    max_error_length: 1000,
                    stale_after_ms: 3_600_000,
                },
                retry: RetryConfig {
                    ceiling: 3,
                    base_delay_ms: 0,
                    max_delay_ms: 0,
                },
                status: StatusConfig::default(),
            },
        }
    }

    pub fn workers(mut self, count: usize) -> Self {
        self.config.worker.count = count;
        self
    }

    pub fn retry(mut self, ceiling: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.config.retry = RetryConfig {
            ceiling,
            base_delay_ms,
            max_delay_ms,
        };
        self
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.config.database.pool_size = size;
        self
    }

    pub fn acquire_timeout_ms(mut self, ms: u64) -> Self {
        self.config.database.acquire_timeout_ms = ms;
        self
    }

    pub fn stale_after_ms(mut self, ms: u64) -> Self {
        self.config.worker.stale_after_ms = ms;
        self
    }

    pub fn status_limits(mut self, default_limit: usize, max_limit: usize) -> Self {
        self.config.status.default_limit = default_limit;
        self.config.status.max_limit = max_limit;
        self
    }

    pub fn max_error_length(mut self, max: usize) -> Self {
        self.config.worker.max_error_length = max;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// Builder for report criteria JSON.
pub struct CriteriaBuilder {
    value: serde_json::Map<String, Value>,
}

impl CriteriaBuilder {
    pub fn range(from: &str, to: &str) -> Self {
        let mut value = serde_json::Map::new();
        value.insert("fromDate".to_string(), json!(from));
        value.insert("toDate".to_string(), json!(to));
        Self { value }
    }

    /// The whole of January 2024.
    pub fn january() -> Self {
        Self::range("2024-01-01", "2024-01-31")
    }

    pub fn shift(mut self, shift: &str) -> Self {
        self.value.insert("shift".to_string(), json!(shift));
        self
    }

    pub fn material(mut self, material: &str) -> Self {
        self.value.insert("material".to_string(), json!(material));
        self
    }

    pub fn operator(mut self, operator_id: i64) -> Self {
        self.value.insert("operatorId".to_string(), json!(operator_id));
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.value)
    }
}

/// A single stockpile movement.
#[derive(Debug, Clone)]
pub struct MovementBuilder {
    date: String,
    shift: &'static str,
    material: String,
    from_stockpile: String,
    to_stockpile: String,
    tonnes: f64,
    is_rehandle: bool,
}

impl MovementBuilder {
    pub fn rehandle(date: &str) -> Self {
        Self {
            date: date.to_string(),
            shift: "day",
            material: "ore".to_string(),
            from_stockpile: "ROM-1".to_string(),
            to_stockpile: "ROM-2".to_string(),
            tonnes: 120.0,
            is_rehandle: true,
        }
    }

    pub fn direct(date: &str) -> Self {
        Self {
            is_rehandle: false,
            to_stockpile: "CRUSHER".to_string(),
            ..Self::rehandle(date)
        }
    }

    pub fn night(mut self) -> Self {
        self.shift = "night";
        self
    }

    pub fn material(mut self, material: &str) -> Self {
        self.material = material.to_string();
        self
    }

    pub fn tonnes(mut self, tonnes: f64) -> Self {
        self.tonnes = tonnes;
        self
    }

    pub fn insert(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO material_movements
             (movement_date, shift, material, from_stockpile, to_stockpile, tonnes, is_rehandle)
             VALUES (:date, :shift, :material, :from, :to, :tonnes, :rehandle)",
            named_params! {
                ":date": self.date,
                ":shift": self.shift,
                ":material": self.material,
                ":from": self.from_stockpile,
                ":to": self.to_stockpile,
                ":tonnes": self.tonnes,
                ":rehandle": self.is_rehandle,
            },
        )?;
        Ok(())
    }
}

/// A single truck haul cycle.
#[derive(Debug, Clone)]
pub struct HaulCycleBuilder {
    date: String,
    shift: &'static str,
    truck_id: String,
    operator_id: Option<i64>,
    material: String,
    source: String,
    dump: String,
    payload_tonnes: f64,
    distance_km: f64,
    cycle_minutes: f64,
}

impl HaulCycleBuilder {
    pub fn new(date: &str) -> Self {
        Self {
            date: date.to_string(),
            shift: "day",
            truck_id: "HT-01".to_string(),
            operator_id: None,
            material: "ore".to_string(),
            source: "PIT-A".to_string(),
            dump: "ROM-1".to_string(),
            payload_tonnes: 220.0,
            distance_km: 3.5,
            cycle_minutes: 30.0,
        }
    }

    pub fn night(mut self) -> Self {
        self.shift = "night";
        self
    }

    pub fn operator(mut self, id: i64) -> Self {
        self.operator_id = Some(id);
        self
    }

    pub fn route(mut self, source: &str, dump: &str) -> Self {
        self.source = source.to_string();
        self.dump = dump.to_string();
        self
    }

    pub fn payload(mut self, tonnes: f64) -> Self {
        self.payload_tonnes = tonnes;
        self
    }

    pub fn insert(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO haul_cycles
             (cycle_date, shift, truck_id, loader_id, operator_id, material,
              source_location, dump_location, payload_tonnes, distance_km, cycle_minutes)
             VALUES (:date, :shift, :truck, 'LD-01', :operator, :material,
                     :source, :dump, :payload, :distance, :minutes)",
            named_params! {
                ":date": self.date,
                ":shift": self.shift,
                ":truck": self.truck_id,
                ":operator": self.operator_id,
                ":material": self.material,
                ":source": self.source,
                ":dump": self.dump,
                ":payload": self.payload_tonnes,
                ":distance": self.distance_km,
                ":minutes": self.cycle_minutes,
            },
        )?;
        Ok(())
    }
}

/// Twelve rehandles on distinct January days plus rows the rehandling
/// report must ignore: direct feeds and a movement outside the month.
pub fn january_movements() -> Vec<MovementBuilder> {
    let mut rows: Vec<MovementBuilder> = (1..=12)
        .map(|day| MovementBuilder::rehandle(&format!("2024-01-{:02}", day * 2)))
        .collect();
    rows.push(MovementBuilder::direct("2024-01-03"));
    rows.push(MovementBuilder::direct("2024-01-15").night());
    rows.push(MovementBuilder::rehandle("2024-02-01"));
    rows
}
