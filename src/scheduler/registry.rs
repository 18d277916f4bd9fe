use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{CoordinatorError, Result};
use crate::scheduler::job::{Entity, EntityKind, Job, RunState};
use crate::scheduler::report::Report;
use crate::time::Time;

/// Outcome of replacing a registry's contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    pub loaded: usize,
    pub skipped: usize,
}

/// Entities of one kind keyed by id, remembering insertion order.
#[derive(Debug)]
pub struct EntityRegistry<T> {
    entities: HashMap<String, T>,
    order: Vec<String>,
}

impl<T: Entity> Default for EntityRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> EntityRegistry<T> {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Add an entity. Fails if its id is already registered.
    pub fn add(&mut self, entity: T) -> Result<()> {
        let id = entity.id().to_string();
        if self.entities.contains_key(&id) {
            return Err(CoordinatorError::DuplicateId { kind: T::KIND, id });
        }
        self.order.push(id.clone());
        self.entities.insert(id, entity);
        Ok(())
    }

    /// Remove an entity by id. Absent ids are ignored.
    pub fn remove(&mut self, id: &str) -> Option<T> {
        let removed = self.entities.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }

    pub fn find(&self, id: &str) -> Option<&T> {
        self.entities.get(id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut T> {
        self.entities.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    /// Ids in insertion order
    pub fn list(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Entities in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.order.iter().filter_map(|id| self.entities.get(id))
    }

    pub fn count(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.order.clear();
    }

    pub fn reset_all(&mut self) {
        for entity in self.entities.values_mut() {
            entity.run_mut().reset();
        }
    }

    /// Drop everything and admit `entities` in order, skipping duplicate ids.
    pub fn replace_all(&mut self, entities: Vec<T>) -> ReloadSummary {
        self.clear();
        let mut summary = ReloadSummary::default();
        for entity in entities {
            match self.add(entity) {
                Ok(()) => summary.loaded += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping definition");
                    summary.skipped += 1;
                }
            }
        }
        summary
    }
}

/// Registry shared by connection handlers and run supervisors.
pub type SharedRegistry = Arc<RwLock<Registry>>;

/// All jobs and reports known to the coordinator.
#[derive(Debug, Default)]
pub struct Registry {
    pub jobs: EntityRegistry<Job>,
    pub reports: EntityRegistry<Report>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        match kind {
            EntityKind::Job => self.jobs.contains(id),
            EntityKind::Report => self.reports.contains(id),
        }
    }

    pub fn run_state(&self, kind: EntityKind, id: &str) -> Option<&RunState> {
        match kind {
            EntityKind::Job => self.jobs.find(id).map(|j| &j.run),
            EntityKind::Report => self.reports.find(id).map(|r| &r.run),
        }
    }

    pub fn run_state_mut(&mut self, kind: EntityKind, id: &str) -> Option<&mut RunState> {
        match kind {
            EntityKind::Job => self.jobs.find_mut(id).map(|j| &mut j.run),
            EntityKind::Report => self.reports.find_mut(id).map(|r| &mut r.run),
        }
    }

    pub fn definition(&self, kind: EntityKind, id: &str) -> Option<&str> {
        match kind {
            EntityKind::Job => self.jobs.find(id).map(|j| j.definition()),
            EntityKind::Report => self.reports.find(id).map(|r| r.definition()),
        }
    }

    pub fn list(&self, kind: EntityKind) -> Vec<String> {
        match kind {
            EntityKind::Job => self.jobs.list(),
            EntityKind::Report => self.reports.list(),
        }
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Job => self.jobs.count(),
            EntityKind::Report => self.reports.count(),
        }
    }

    /// Remove an entity. Returns false if it did not exist.
    pub fn remove(&mut self, kind: EntityKind, id: &str) -> bool {
        match kind {
            EntityKind::Job => self.jobs.remove(id).is_some(),
            EntityKind::Report => self.reports.remove(id).is_some(),
        }
    }

    /// Reset one entity. Returns false if it did not exist.
    pub fn reset(&mut self, kind: EntityKind, id: &str) -> bool {
        match self.run_state_mut(kind, id) {
            Some(run) => {
                run.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&mut self, kind: EntityKind) {
        match kind {
            EntityKind::Job => self.jobs.reset_all(),
            EntityKind::Report => self.reports.reset_all(),
        }
    }

    /// Jobs sharing the smallest strictly positive distance from `now` to
    /// their scheduled start. Empty when every scheduled time has passed.
    pub fn next_jobs(&self, now: &Time) -> Vec<String> {
        let mut best = i64::MAX;
        let mut next = Vec::new();
        for job in self.jobs.iter() {
            let delta = now.millis_until(&job.run.scheduled_start_time);
            if delta <= 0 {
                continue;
            }
            if delta < best {
                best = delta;
                next.clear();
                next.push(job.id.clone());
            } else if delta == best {
                next.push(job.id.clone());
            }
        }
        next
    }

    /// Ids of the reports in `group`, in insertion order.
    pub fn group_reports(&self, group: i64) -> Vec<String> {
        self.reports
            .iter()
            .filter(|r| r.group == Some(group))
            .map(|r| r.id.clone())
            .collect()
    }

    /// `(kind, entity id, dependency id)` for every dependency naming no
    /// registered job.
    pub fn unresolved_dependencies(&self) -> Vec<(EntityKind, String, String)> {
        let jobs = self
            .jobs
            .iter()
            .map(|j| (EntityKind::Job, j.id.as_str(), &j.run));
        let reports = self
            .reports
            .iter()
            .map(|r| (EntityKind::Report, r.id.as_str(), &r.run));
        jobs.chain(reports)
            .flat_map(|(kind, id, run)| {
                run.dependent_job_ids
                    .iter()
                    .filter(|dep| !self.jobs.contains(dep))
                    .map(move |dep| (kind, id.to_string(), dep.clone()))
            })
            .collect()
    }
}
