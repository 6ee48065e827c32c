//! Status service - register summary

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::EntityKind;
use crate::ports::Repository;

/// Status service for register summaries
pub struct StatusService {
    repository: Arc<DuckDbRepository>,
}

impl StatusService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Entity counts for every kind in the register
    pub fn get_status(&self) -> Result<StatusSummary> {
        let mut kinds = Vec::with_capacity(EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            kinds.push(KindCount {
                kind,
                name: kind.to_string(),
                count: self.repository.count(kind)?,
            });
        }

        Ok(StatusSummary {
            total_entities: kinds.iter().map(|k| k.count).sum(),
            database: self
                .repository
                .db_path()
                .map(|p| p.display().to_string()),
            kinds,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub total_entities: i64,
    pub database: Option<String>,
    pub kinds: Vec<KindCount>,
}

#[derive(Debug, Serialize)]
pub struct KindCount {
    pub kind: EntityKind,
    pub name: String,
    pub count: i64,
}
