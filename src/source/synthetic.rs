//! Synthetic in-memory data source for the demo binary and tests.
//!
//! Serves a fixed set of generated records, sorted by the requested key,
//! after an artificial delay that stands in for a remote round trip.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DemoConfig;
use crate::pager::gateway::{DataSource, FetchRequest};

/// A generated record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoRecord {
    pub id: u64,
    pub name: String,
    pub created_at: u64,
    pub metadata: DemoMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoMetadata {
    pub owner: String,
    pub phase: String,
}

const OWNERS: [&str; 4] = ["alice", "bob", "carol", "dave"];
const PHASES: [&str; 3] = ["QUEUED", "RUNNING", "SUCCEEDED"];

/// Base timestamp for generated records (2024-01-01T00:00:00Z).
const EPOCH: u64 = 1_704_067_200;

pub struct SyntheticSource {
    records: Vec<DemoRecord>,
    latency: Duration,
}

impl SyntheticSource {
    pub fn new(total_records: usize, latency: Duration) -> Self {
        let records = (0..total_records as u64)
            .map(|id| DemoRecord {
                id,
                name: format!("execution-{id:05}"),
                // Not monotonic in id, so sorting is observable.
                created_at: EPOCH + (id * 7919) % (total_records as u64).max(1) * 60,
                metadata: DemoMetadata {
                    owner: OWNERS[id as usize % OWNERS.len()].to_string(),
                    phase: PHASES[id as usize % PHASES.len()].to_string(),
                },
            })
            .collect();
        Self { records, latency }
    }

    pub fn from_config(config: &DemoConfig) -> Self {
        Self::new(config.total_records, Duration::from_millis(config.fetch_latency_ms))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn sorted(&self, key: &str, ascending: bool) -> anyhow::Result<Vec<&DemoRecord>> {
        let mut records: Vec<&DemoRecord> = self.records.iter().collect();
        match key {
            "id" => records.sort_by_key(|r| r.id),
            "name" => records.sort_by(|a, b| a.name.cmp(&b.name)),
            "created_at" => records.sort_by_key(|r| (r.created_at, r.id)),
            other => anyhow::bail!("unsupported sort key: {other}"),
        }
        if !ascending {
            records.reverse();
        }
        Ok(records)
    }
}

#[async_trait]
impl DataSource<DemoRecord> for SyntheticSource {
    async fn fetch(&self, request: FetchRequest) -> anyhow::Result<Vec<DemoRecord>> {
        if request.page == 0 {
            anyhow::bail!("page numbers are 1-based");
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let sorted = self.sorted(&request.sort_key, request.ascending)?;
        let records: Vec<DemoRecord> = sorted
            .into_iter()
            .skip((request.page - 1) * request.limit)
            .take(request.limit)
            .cloned()
            .collect();

        debug!(page = request.page, limit = request.limit, returned = records.len(), "Synthetic fetch");
        Ok(records)
    }
}
