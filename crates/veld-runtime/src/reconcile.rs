//! Three-way reconciliation between the artifact repository, the catalog
//! store, and the OLAP engine.
//!
//! One pass runs a fixed pipeline: scan the repository, diff against the
//! catalog, plan an apply order over the dependency graph, apply entry by
//! entry, then assemble the result. Entry-level failures (parse errors,
//! rejected DDL, missing dependencies) are recorded and the pass continues
//! with independent branches; only an unreachable catalog store or a closed
//! connection pool aborts the whole pass.
//!
//! Mutations are engine-first, catalog-second: the catalog is only updated
//! after the engine change succeeded, so a crash mid-pass leaves the
//! catalog consistent with whatever the engine actually holds.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use ulid::Ulid;

use veld_catalog::{CatalogEntry, CatalogObject, CatalogStore};
use veld_core::{classify_path, Error, RepoStore, Result, Schema};
use veld_olap::{OlapHandle, Statement, Table};

use crate::artifacts;
use crate::graph::DependencyGraph;
use crate::materialize;
use crate::sql_deps;

/// Options for one reconciliation pass.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Restrict the pass to these repository paths (changed and deleted
    /// paths from a watcher change set). `None` reconciles everything.
    pub changed_paths: Option<Vec<String>>,
    /// Paths to re-apply even when their content fingerprint is unchanged.
    pub forced_paths: Vec<String>,
    /// Plan without touching the engine or the catalog.
    pub dry_run: bool,
    /// Pool priority for engine statements issued by this pass.
    pub priority: i32,
    /// Deadline for each pool acquisition; `None` waits indefinitely.
    pub acquire_timeout: Option<Duration>,
    /// A deleted artifact whose content reappears under a new path within
    /// this window of its modification time is treated as a rename.
    pub rename_window: Duration,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            changed_paths: None,
            forced_paths: Vec::new(),
            dry_run: false,
            priority: 0,
            acquire_timeout: None,
            rename_window: Duration::from_secs(5),
        }
    }
}

/// An entry-scoped failure recorded during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileError {
    /// Object name, when known.
    pub name: String,
    /// Repository path the failure is attributed to.
    pub path: String,
    /// Failure detail.
    pub message: String,
}

/// Immutable outcome of one reconciliation pass.
///
/// Name sequences are in apply order. Built once and returned atomically;
/// callers never observe a partially filled result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResult {
    /// Names of newly created objects.
    pub added_objects: Vec<String>,
    /// Names of updated objects.
    pub updated_objects: Vec<String>,
    /// Names of dropped objects.
    pub dropped_objects: Vec<String>,
    /// Entry-scoped failures; non-fatal to the pass.
    pub errors: Vec<ReconcileError>,
    /// Repository paths touched by this pass, deduplicated, for cache and
    /// UI invalidation.
    pub affected_paths: Vec<String>,
}

impl ReconcileResult {
    /// Returns true if any entry failed during the pass.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// The planned mutation for one artifact.
#[derive(Debug, Clone)]
enum Action {
    Add,
    Update { previous: CatalogEntry },
    /// Type changed under the same name: drop the old object, create anew.
    Recreate { previous: CatalogEntry },
    /// Same content under a new path within the rename window.
    Rename { previous: CatalogEntry },
}

#[derive(Debug, Clone)]
struct Candidate {
    entry: CatalogEntry,
    action: Action,
}

/// Names an object reads from, as declared in its definition.
fn declared_dependencies(object: &CatalogObject) -> Vec<String> {
    match object {
        CatalogObject::Table | CatalogObject::Source(_) => Vec::new(),
        CatalogObject::Model(model) => sql_deps::extract_references(&model.sql),
        CatalogObject::MetricsView(view) => vec![view.model.clone()],
    }
}

/// Reconciles one instance's repository, catalog, and engine state.
///
/// At most one pass runs per service at a time; concurrent callers
/// serialize on an internal lock. Passes for different instances are
/// independent and share only the connection pool.
pub struct ReconcileService {
    instance_id: String,
    repo: Arc<dyn RepoStore>,
    catalog: Arc<dyn CatalogStore>,
    olap: Arc<OlapHandle>,
    pass_lock: Mutex<()>,
}

impl ReconcileService {
    /// Creates a service for one instance.
    #[must_use]
    pub fn new(
        instance_id: impl Into<String>,
        repo: Arc<dyn RepoStore>,
        catalog: Arc<dyn CatalogStore>,
        olap: Arc<OlapHandle>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            repo,
            catalog,
            olap,
            pass_lock: Mutex::new(()),
        }
    }

    /// Runs one reconciliation pass.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fatal`] when the repository or catalog store is
    /// unreachable, when a catalog write fails mid-pass, or when the
    /// connection pool closes mid-pass. All other failures are recorded in
    /// the result's `errors` and the pass continues.
    pub async fn reconcile(&self, options: &ReconcileOptions) -> Result<ReconcileResult> {
        let _pass = self.pass_lock.lock().await;
        let pass_id = Ulid::new();
        info!(
            pass_id = %pass_id,
            instance_id = %self.instance_id,
            dry_run = options.dry_run,
            targeted = options.changed_paths.is_some(),
            "starting reconciliation pass"
        );

        let repo_paths = self
            .repo
            .list(&self.instance_id)
            .await
            .map_err(|e| fatal_unless("artifact repository unavailable", e))?;
        let existing = self
            .catalog
            .list_entries(&self.instance_id)
            .await
            .map_err(|e| fatal_unless("catalog store unavailable", e))?;

        let repo_set: HashSet<&str> = repo_paths.iter().map(String::as_str).collect();
        let forced: HashSet<&str> = options.forced_paths.iter().map(String::as_str).collect();
        let scope: Option<HashSet<&str>> = options
            .changed_paths
            .as_ref()
            .map(|paths| paths.iter().map(String::as_str).collect());
        let in_scope = |path: &str| -> bool {
            forced.contains(path) || scope.as_ref().map_or(true, |s| s.contains(path))
        };

        let by_name: HashMap<String, &CatalogEntry> = existing
            .iter()
            .map(|entry| (entry.lower_name(), entry))
            .collect();

        let mut errors: Vec<ReconcileError> = Vec::new();
        let mut affected: Vec<String> = Vec::new();

        // Diff: decode every in-scope artifact and classify the mutation.
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut claimed: HashMap<String, String> = HashMap::new();
        // Old lowercased name of each rename donor, mapped to the lowercased
        // name of the candidate that claims it.
        let mut renamed_from: HashMap<String, String> = HashMap::new();

        for path in &repo_paths {
            let Some((_, name)) = classify_path(path) else {
                continue;
            };
            if !in_scope(path) {
                continue;
            }
            let entry = match artifacts::read_entry(self.repo.as_ref(), &self.instance_id, path)
                .await
            {
                Ok(entry) => entry,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(path, error = %e, "artifact failed to decode");
                    errors.push(ReconcileError {
                        name,
                        path: path.clone(),
                        message: e.to_string(),
                    });
                    affected.push(path.clone());
                    continue;
                }
            };

            let lower = entry.lower_name();
            if let Some(other_path) = claimed.get(&lower) {
                errors.push(ReconcileError {
                    name: entry.name.clone(),
                    path: path.clone(),
                    message: format!("name '{}' is already defined by {other_path}", entry.name),
                });
                affected.push(path.clone());
                continue;
            }

            let action = match by_name.get(&lower) {
                None => match self.rename_donor(&entry, &existing, &repo_set, &renamed_from, options).await {
                    Some(previous) => {
                        renamed_from.insert(previous.lower_name(), lower.clone());
                        Action::Rename { previous }
                    }
                    None => Action::Add,
                },
                Some(previous) if previous.object_type() != entry.object_type() => {
                    Action::Recreate {
                        previous: (*previous).clone(),
                    }
                }
                Some(previous) if previous.path != *path && repo_set.contains(previous.path.as_str()) => {
                    errors.push(ReconcileError {
                        name: entry.name.clone(),
                        path: path.clone(),
                        message: format!(
                            "name '{}' is already defined by {}",
                            entry.name, previous.path
                        ),
                    });
                    affected.push(path.clone());
                    continue;
                }
                Some(previous)
                    if previous.fingerprint != entry.fingerprint
                        || previous.path != *path
                        || forced.contains(path.as_str()) =>
                {
                    Action::Update {
                        previous: (*previous).clone(),
                    }
                }
                Some(_) => continue, // unchanged
            };

            claimed.insert(lower, path.clone());
            candidates.push(Candidate { entry, action });
        }

        // Drops: catalog entries whose artifact is gone and whose content
        // did not reappear elsewhere as a rename.
        let candidate_names: HashSet<String> =
            candidates.iter().map(|c| c.entry.lower_name()).collect();
        let mut drops: Vec<CatalogEntry> = existing
            .iter()
            .filter(|entry| {
                !entry.path.is_empty()
                    && !repo_set.contains(entry.path.as_str())
                    && in_scope(&entry.path)
                    && !renamed_from.contains_key(&entry.lower_name())
                    && !candidate_names.contains(&entry.lower_name())
            })
            .cloned()
            .collect();
        let drop_names: HashSet<String> = drops.iter().map(CatalogEntry::lower_name).collect();

        // The resolution set: names that will exist after this pass.
        let mut resolution: HashSet<String> = candidate_names.clone();
        for entry in &existing {
            let lower = entry.lower_name();
            if !drop_names.contains(&lower) && !renamed_from.contains_key(&lower) {
                resolution.insert(lower);
            }
        }

        // Plan: dependency edges among candidates, missing dependencies
        // attributed to the dependent, cycles excluded entirely.
        let mut failed: HashSet<String> = HashSet::new();
        let mut graph = DependencyGraph::new();
        for candidate in &candidates {
            graph.add_node(&candidate.entry.name);
        }
        for candidate in &candidates {
            let lower = candidate.entry.lower_name();
            let mut missing = None;
            for dep in declared_dependencies(&candidate.entry.object) {
                let dep_lower = dep.to_lowercase();
                if dep_lower == lower {
                    continue;
                }
                if resolution.contains(&dep_lower) {
                    graph.add_dependency(&candidate.entry.name, &dep);
                } else {
                    missing = Some(dep);
                    break;
                }
            }
            if let Some(dep) = missing {
                errors.push(ReconcileError {
                    name: candidate.entry.name.clone(),
                    path: candidate.entry.path.clone(),
                    message: format!("dependency '{dep}' not found"),
                });
                affected.push(candidate.entry.path.clone());
                failed.insert(lower);
            }
        }

        let outcome = graph.toposort();
        let mut candidate_map: HashMap<String, Candidate> = candidates
            .into_iter()
            .map(|c| (c.entry.lower_name(), c))
            .collect();
        for name in outcome.cycle_members.iter().chain(&outcome.cycle_dependents) {
            let lower = name.to_lowercase();
            if let Some(candidate) = candidate_map.get(&lower) {
                let message = if outcome.cycle_members.contains(name) {
                    format!("cyclic dependency involving '{name}'")
                } else {
                    format!("'{name}' depends on a cyclic definition")
                };
                errors.push(ReconcileError {
                    name: candidate.entry.name.clone(),
                    path: candidate.entry.path.clone(),
                    message,
                });
                affected.push(candidate.entry.path.clone());
                failed.insert(lower);
            }
        }

        // Apply, dependency-first, skipping dependents of failed entries.
        let mut added: Vec<String> = Vec::new();
        let mut updated: Vec<String> = Vec::new();
        let mut dropped: Vec<String> = Vec::new();

        for name in &outcome.ordered {
            let lower = name.to_lowercase();
            let Some(candidate) = candidate_map.remove(&lower) else {
                continue;
            };
            if failed.contains(&lower) {
                continue;
            }
            let failed_dep = declared_dependencies(&candidate.entry.object)
                .into_iter()
                .find(|dep| failed.contains(&dep.to_lowercase()));
            if let Some(dep) = failed_dep {
                errors.push(ReconcileError {
                    name: candidate.entry.name.clone(),
                    path: candidate.entry.path.clone(),
                    message: format!("skipped: dependency '{dep}' failed"),
                });
                affected.push(candidate.entry.path.clone());
                failed.insert(lower);
                continue;
            }

            affected.push(candidate.entry.path.clone());
            if let Action::Rename { previous } = &candidate.action {
                affected.push(previous.path.clone());
            }

            if options.dry_run {
                record_planned(&candidate.action, &candidate.entry.name, &mut added, &mut updated, &mut dropped);
                continue;
            }

            match self.apply_candidate(&candidate, options).await {
                Ok(schema) => {
                    self.commit_candidate(candidate, schema, &mut added, &mut updated, &mut dropped)
                        .await?;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(name = %candidate.entry.name, error = %e, "apply failed");
                    errors.push(ReconcileError {
                        name: candidate.entry.name.clone(),
                        path: candidate.entry.path.clone(),
                        message: e.to_string(),
                    });
                    failed.insert(lower);
                }
            }
        }

        // Drop safety: never drop an object a surviving definition still
        // reads. This runs after apply because a failed candidate leaves its
        // previous catalog entry (and engine object) in place, so that old
        // definition counts as a survivor. Successful candidates were
        // resolved against the post-pass name set and cannot reference a
        // drop.
        let mut unsafe_drops: HashSet<String> = HashSet::new();
        for entry in &existing {
            let lower = entry.lower_name();
            if drop_names.contains(&lower) {
                continue;
            }
            let replaced = match renamed_from.get(&lower) {
                Some(new_lower) => !failed.contains(new_lower),
                None => candidate_names.contains(&lower) && !failed.contains(&lower),
            };
            if replaced {
                continue;
            }
            for dep in declared_dependencies(&entry.object) {
                let dep_lower = dep.to_lowercase();
                if drop_names.contains(&dep_lower) && unsafe_drops.insert(dep_lower.clone()) {
                    errors.push(ReconcileError {
                        name: dep.clone(),
                        path: String::new(),
                        message: format!("cannot drop '{dep}': still referenced by '{}'", entry.name),
                    });
                }
            }
        }
        drops.retain(|entry| !unsafe_drops.contains(&entry.lower_name()));

        // Drops run dependents-first so nothing ever references a dropped
        // object, engine mutation before catalog bookkeeping.
        for entry in order_drops(drops) {
            affected.push(entry.path.clone());
            if options.dry_run {
                dropped.push(entry.name);
                continue;
            }
            match self.apply_drop(&entry, options).await {
                Ok(()) => dropped.push(entry.name),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(name = %entry.name, error = %e, "drop failed");
                    errors.push(ReconcileError {
                        name: entry.name.clone(),
                        path: entry.path.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let mut seen = HashSet::new();
        affected.retain(|path| !path.is_empty() && seen.insert(path.clone()));

        info!(
            pass_id = %pass_id,
            instance_id = %self.instance_id,
            added = added.len(),
            updated = updated.len(),
            dropped = dropped.len(),
            errors = errors.len(),
            "reconciliation pass finished"
        );
        Ok(ReconcileResult {
            added_objects: added,
            updated_objects: updated,
            dropped_objects: dropped,
            errors,
            affected_paths: affected,
        })
    }

    /// Lists engine tables with no catalog entry: objects created directly
    /// in the engine outside the managed artifact flow.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fatal`] when the catalog store is unreachable, or
    /// the engine's own error if the information-schema listing fails.
    pub async fn untracked_tables(&self) -> Result<Vec<Table>> {
        let entries = self
            .catalog
            .list_entries(&self.instance_id)
            .await
            .map_err(|e| fatal_unless("catalog store unavailable", e))?;
        let known: HashSet<String> = entries.iter().map(CatalogEntry::lower_name).collect();
        let mut tables = self.olap.meta().all_tables().await?;
        tables.retain(|table| !known.contains(&table.name.to_lowercase()));
        Ok(tables)
    }

    /// Finds a catalog entry this new artifact is a rename of: identical
    /// fingerprint and type, old path gone from the repository, and the new
    /// file modified within the rename window.
    async fn rename_donor(
        &self,
        entry: &CatalogEntry,
        existing: &[CatalogEntry],
        repo_set: &HashSet<&str>,
        already_renamed: &HashMap<String, String>,
        options: &ReconcileOptions,
    ) -> Option<CatalogEntry> {
        let donor = existing.iter().find(|old| {
            !old.path.is_empty()
                && !old.fingerprint.is_empty()
                && old.fingerprint == entry.fingerprint
                && old.object_type() == entry.object_type()
                && !repo_set.contains(old.path.as_str())
                && !already_renamed.contains_key(&old.lower_name())
        })?;
        let meta = self.repo.stat(&self.instance_id, &entry.path).await.ok()?;
        let window =
            chrono::Duration::from_std(options.rename_window).unwrap_or(chrono::Duration::MAX);
        if Utc::now().signed_duration_since(meta.updated_on) <= window {
            debug!(from = %donor.path, to = %entry.path, "rename detected");
            Some(donor.clone())
        } else {
            None
        }
    }

    /// Performs the engine-side mutation for one candidate. Returns the
    /// discovered schema for objects that materialize, `None` otherwise.
    async fn apply_candidate(
        &self,
        candidate: &Candidate,
        options: &ReconcileOptions,
    ) -> Result<Option<Schema>> {
        let name = &candidate.entry.name;

        if let Action::Rename { previous } = &candidate.action {
            if let Some(sql) =
                materialize::rename_sql(candidate.entry.object_type(), &previous.name, name)
            {
                self.execute_pooled(sql, options).await?;
                let table = self.olap.meta().lookup_table(name).await?;
                return Ok(Some(table.schema));
            }
            return Ok(previous.schema.clone());
        }

        if let Action::Recreate { previous } = &candidate.action {
            if let Some(sql) = materialize::drop_sql(previous.object_type(), &previous.name) {
                self.execute_pooled(sql, options).await?;
            }
        }

        match &candidate.entry.object {
            CatalogObject::Source(source) => {
                let ddl = materialize::source_ingest_sql(name, source)?;
                self.execute_pooled(ddl, options).await?;
                let table = self.olap.meta().lookup_table(name).await?;
                Ok(Some(table.schema))
            }
            CatalogObject::Model(model) => {
                // Validate the SELECT on the metadata session before
                // touching engine state.
                let probe = Statement::new(model.sql.clone())
                    .as_dry_run()
                    .with_priority(options.priority);
                self.olap.meta().execute(&probe).await?;
                self.execute_pooled(materialize::model_view_sql(name, &model.sql), options)
                    .await?;
                let table = self.olap.meta().lookup_table(name).await?;
                Ok(Some(table.schema))
            }
            CatalogObject::MetricsView(view) => {
                self.validate_metrics_view(name, view, options).await?;
                Ok(None)
            }
            CatalogObject::Table => Ok(None),
        }
    }

    /// Writes the catalog record for a successfully applied candidate.
    ///
    /// Catalog failures here are fatal: the engine mutation already
    /// happened, so continuing would let bookkeeping drift.
    async fn commit_candidate(
        &self,
        candidate: Candidate,
        schema: Option<Schema>,
        added: &mut Vec<String>,
        updated: &mut Vec<String>,
        dropped: &mut Vec<String>,
    ) -> Result<()> {
        let mut entry = candidate.entry;
        entry.schema = schema;
        entry.updated_on = Utc::now();
        entry.refreshed_on = Some(entry.updated_on);

        let result = match candidate.action {
            Action::Add => {
                let name = entry.name.clone();
                let r = self.catalog.create_entry(&self.instance_id, &entry).await;
                if r.is_ok() {
                    added.push(name);
                }
                r
            }
            Action::Update { previous } => {
                entry.created_on = previous.created_on;
                let name = entry.name.clone();
                let r = self.catalog.update_entry(&self.instance_id, &entry).await;
                if r.is_ok() {
                    updated.push(name);
                }
                r
            }
            Action::Recreate { previous } => {
                let name = entry.name.clone();
                let r = async {
                    self.catalog
                        .delete_entry(&self.instance_id, &previous.name)
                        .await?;
                    self.catalog.create_entry(&self.instance_id, &entry).await
                }
                .await;
                if r.is_ok() {
                    dropped.push(name.clone());
                    added.push(name);
                }
                r
            }
            Action::Rename { previous } => {
                entry.created_on = previous.created_on;
                if entry.schema.is_none() {
                    entry.schema = previous.schema.clone();
                }
                let name = entry.name.clone();
                let r = async {
                    self.catalog
                        .delete_entry(&self.instance_id, &previous.name)
                        .await?;
                    self.catalog.create_entry(&self.instance_id, &entry).await
                }
                .await;
                if r.is_ok() {
                    updated.push(name);
                }
                r
            }
        };
        result.map_err(|e| fatal_unless("catalog write failed mid-pass", e))
    }

    /// Drops one object: engine first, catalog second. An engine failure
    /// leaves the catalog entry intact for the next pass to retry.
    async fn apply_drop(&self, entry: &CatalogEntry, options: &ReconcileOptions) -> Result<()> {
        if let Some(sql) = materialize::drop_sql(entry.object_type(), &entry.name) {
            self.execute_pooled(sql, options).await?;
        }
        match self.catalog.delete_entry(&self.instance_id, &entry.name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(fatal_unless("catalog write failed mid-pass", e)),
        }
    }

    /// Validates a metrics view against the engine's information schema
    /// without materializing anything. Metadata-session only.
    async fn validate_metrics_view(
        &self,
        name: &str,
        view: &veld_catalog::MetricsView,
        options: &ReconcileOptions,
    ) -> Result<()> {
        let table = self.olap.meta().lookup_table(&view.model).await.map_err(|e| {
            if e.is_not_found() {
                Error::validation(format!(
                    "metrics view '{name}' references unknown model '{}'",
                    view.model
                ))
            } else {
                e
            }
        })?;
        if let Some(time_dim) = &view.time_dimension {
            if !table.schema.has_field(time_dim) {
                return Err(Error::validation(format!(
                    "time dimension '{time_dim}' not found in model '{}'",
                    view.model
                )));
            }
        }
        for dimension in &view.dimensions {
            if !table.schema.has_field(dimension.column()) {
                return Err(Error::validation(format!(
                    "dimension column '{}' not found in model '{}'",
                    dimension.column(),
                    view.model
                )));
            }
        }
        if !view.measures.is_empty() {
            let selects: Vec<String> = view
                .measures
                .iter()
                .map(|m| format!("{} AS {}", m.expression, materialize::safe_name(&m.name)))
                .collect();
            let probe = Statement::new(format!(
                "SELECT {} FROM {}",
                selects.join(", "),
                materialize::safe_name(&view.model)
            ))
            .as_dry_run()
            .with_priority(options.priority);
            self.olap.meta().execute(&probe).await?;
        }
        Ok(())
    }

    /// Runs one statement on a pooled session at the pass priority.
    async fn execute_pooled(&self, query: String, options: &ReconcileOptions) -> Result<()> {
        let guard = self
            .olap
            .acquire(options.priority, options.acquire_timeout)
            .await
            .map_err(|e| fatal_unless("connection pool closed mid-pass", e))?;
        let stmt = Statement::new(query).with_priority(options.priority);
        let result = guard.execute(&stmt).await;
        guard.release();
        result.map(|_| ())
    }
}

/// Escalates already-fatal errors with pass context; leaves entry-scoped
/// errors untouched only when they are not fatal classifications.
fn fatal_unless(context: &str, e: Error) -> Error {
    match e {
        Error::ResourceExhausted { .. } | Error::Validation { .. } | Error::Engine { .. } => e,
        other => Error::fatal_from(context, other),
    }
}

fn record_planned(
    action: &Action,
    name: &str,
    added: &mut Vec<String>,
    updated: &mut Vec<String>,
    dropped: &mut Vec<String>,
) {
    match action {
        Action::Add => added.push(name.to_string()),
        Action::Update { .. } | Action::Rename { .. } => updated.push(name.to_string()),
        Action::Recreate { .. } => {
            dropped.push(name.to_string());
            added.push(name.to_string());
        }
    }
}

/// Orders drops dependents-first. Cycle participants are appended at the
/// end; among themselves their order is irrelevant since all are going.
fn order_drops(drops: Vec<CatalogEntry>) -> Vec<CatalogEntry> {
    if drops.len() <= 1 {
        return drops;
    }
    let mut graph = DependencyGraph::new();
    for entry in &drops {
        graph.add_node(&entry.name);
    }
    for entry in &drops {
        for dep in declared_dependencies(&entry.object) {
            graph.add_dependency(&entry.name, &dep);
        }
    }
    let outcome = graph.toposort();
    let mut order: Vec<String> = outcome.ordered;
    order.reverse();
    order.extend(outcome.cycle_dependents);
    order.extend(outcome.cycle_members);

    let mut by_name: HashMap<String, CatalogEntry> = drops
        .into_iter()
        .map(|entry| (entry.lower_name(), entry))
        .collect();
    order
        .iter()
        .filter_map(|name| by_name.remove(&name.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use veld_catalog::{Model, Source};

    fn model_entry(name: &str, sql: &str) -> CatalogEntry {
        CatalogEntry::new(
            name,
            format!("models/{name}.sql"),
            CatalogObject::Model(Model {
                sql: sql.into(),
                dialect: "duckdb".into(),
            }),
        )
    }

    #[test]
    fn dependencies_follow_object_kind() {
        let source = CatalogObject::Source(Source::default());
        assert!(declared_dependencies(&source).is_empty());

        let model = model_entry("revenue", "select * from orders join customers c on true");
        assert_eq!(
            declared_dependencies(&model.object),
            vec!["orders", "customers"]
        );

        let view = CatalogObject::MetricsView(veld_catalog::MetricsView {
            model: "revenue".into(),
            time_dimension: None,
            dimensions: vec![],
            measures: vec![],
        });
        assert_eq!(declared_dependencies(&view), vec!["revenue"]);
    }

    #[test]
    fn drops_are_ordered_dependents_first() {
        let drops = vec![
            model_entry("base", "select 1"),
            model_entry("mid", "select * from base"),
            model_entry("top", "select * from mid"),
        ];
        let ordered: Vec<String> = order_drops(drops).into_iter().map(|e| e.name).collect();
        assert_eq!(ordered, vec!["top", "mid", "base"]);
    }

    #[test]
    fn cyclic_drops_are_still_all_dropped() {
        let drops = vec![
            model_entry("a", "select * from b"),
            model_entry("b", "select * from a"),
        ];
        let ordered: Vec<String> = order_drops(drops).into_iter().map(|e| e.name).collect();
        assert_eq!(ordered.len(), 2);
    }

    #[test]
    fn default_options_reconcile_everything() {
        let options = ReconcileOptions::default();
        assert!(options.changed_paths.is_none());
        assert!(!options.dry_run);
        assert_eq!(options.rename_window, Duration::from_secs(5));
    }
}
