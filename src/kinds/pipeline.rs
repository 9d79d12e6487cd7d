//! Pipeline kind
//!
//! Deploy registers the parent pipeline on first sight, then a child revision
//! named after the artifact version. Rollback deletes that revision and, under
//! a narrow condition, the parent's implicit default revision.

use std::collections::HashMap;

use baits_model::{Artifact, PipelineSpec};
use tracing::{debug, info, warn};

use super::KindError;
use crate::remote::{Page, PipelineRef, PipelineService, RevisionRef};

/// Parent pipelines known to exist, by name.
#[derive(Debug, Clone, Default)]
pub struct PipelineCatalog {
    by_name: HashMap<String, String>,
}

impl PipelineCatalog {
    /// List every parent pipeline.
    pub fn fetch(service: &dyn PipelineService, limit: usize) -> Result<Self, KindError> {
        let page = service
            .list_pipelines(None, limit)
            .map_err(|e| KindError::remote("list pipelines", e))?;
        check_limit("pipeline", &page, limit)?;

        let by_name = page.items.into_iter().map(|p| (p.name, p.id)).collect();
        Ok(Self { by_name })
    }

    pub fn id_of(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(String::as_str)
    }

    fn record(&mut self, pipeline: PipelineRef) {
        self.by_name.insert(pipeline.name, pipeline.id);
    }
}

/// A listing whose server-side total does not fit the page is never
/// processed partially.
fn check_limit<T>(listing: &str, page: &Page<T>, limit: usize) -> Result<(), KindError> {
    if page.is_truncated() || page.total_size > limit {
        return Err(KindError::ListingLimitExceeded {
            listing: listing.to_string(),
            total: page.total_size,
            limit,
        });
    }
    Ok(())
}

/// Render the compiled pipeline spec as the uploaded package.
pub fn render_package(spec: &PipelineSpec) -> Result<String, KindError> {
    let definition = spec.definition.as_ref().ok_or(KindError::MissingDefinition)?;
    serde_yaml::to_string(definition).map_err(|e| KindError::Render(e.to_string()))
}

/// Find a parent by exact name.
fn find_parent(
    service: &dyn PipelineService,
    name: &str,
    limit: usize,
) -> Result<Option<PipelineRef>, KindError> {
    let page = service
        .list_pipelines(Some(name), limit)
        .map_err(|e| KindError::remote("list pipelines", e))?;
    check_limit("pipeline", &page, limit)?;
    Ok(page.items.into_iter().find(|p| p.name == name))
}

pub(super) fn deploy(
    service: &dyn PipelineService,
    catalog: &mut PipelineCatalog,
    limit: usize,
    artifact: &Artifact,
    spec: &PipelineSpec,
) -> Result<(), KindError> {
    let package = render_package(spec)?;
    let name = artifact.name().as_str();
    let version = artifact.version().to_string();
    let description = spec.description.as_deref();

    let parent_id = match catalog.id_of(name) {
        Some(id) => id.to_string(),
        None => {
            info!(pipeline = name, "Registering new pipeline");
            let parent = match service.upload(&package, name, description) {
                Ok(parent) => parent,
                Err(e) if e.is_already_exists() => {
                    debug!(pipeline = name, "Pipeline already registered");
                    find_parent(service, name, limit)?.ok_or_else(|| {
                        KindError::remote("look up existing pipeline", e)
                    })?
                }
                Err(e) => return Err(KindError::remote("upload pipeline", e)),
            };
            let id = parent.id.clone();
            catalog.record(parent);
            id
        }
    };

    info!(pipeline = name, %version, "Uploading pipeline version");
    match service.upload_version(&package, &parent_id, &version, description) {
        Ok(revision) => {
            debug!(pipeline = name, revision_id = %revision.id, "Pipeline version uploaded");
            Ok(())
        }
        Err(e) if e.is_already_exists() => {
            warn!(pipeline = name, %version, "Pipeline version already uploaded");
            Ok(())
        }
        Err(e) => Err(KindError::remote("upload pipeline version", e)),
    }
}

/// Revisions to delete when rolling back `version` of `parent`.
///
/// The revision named `version` goes. Independently, when exactly two
/// revisions are left and the first one (in listing order) carries the
/// parent's own name, that implicit default revision goes too.
// NOTE: the second rule is narrowly conditioned and pending product
// confirmation; do not extend it to other revision shapes.
pub fn collapse_plan<'r>(
    parent: &str,
    version: &str,
    revisions: &'r [RevisionRef],
) -> Result<Vec<&'r RevisionRef>, KindError> {
    let matching: Vec<&RevisionRef> = revisions.iter().filter(|r| r.name == version).collect();
    // Several revisions sharing the version name cannot be told apart; the
    // artifact fails instead of skipping the delete, so its row is kept.
    if matching.len() > 1 {
        return Err(KindError::AmbiguousRevision {
            pipeline: parent.to_string(),
            version: version.to_string(),
            count: matching.len(),
        });
    }

    let remaining: Vec<&RevisionRef> = revisions.iter().filter(|r| r.name != version).collect();
    let mut plan = matching;
    if remaining.len() == 2 && remaining[0].name == parent {
        plan.push(remaining[0]);
    }
    Ok(plan)
}

pub(super) fn rollback(
    service: &dyn PipelineService,
    limit: usize,
    artifact: &Artifact,
) -> Result<(), KindError> {
    let name = artifact.name().as_str();
    let version = artifact.version().to_string();

    let Some(parent) = find_parent(service, name, limit)? else {
        info!(pipeline = name, "Pipeline not registered; nothing to roll back");
        return Ok(());
    };

    let page = service
        .list_versions(&parent.id, limit)
        .map_err(|e| KindError::remote("list pipeline versions", e))?;
    check_limit("pipeline version", &page, limit)?;

    let plan = collapse_plan(name, &version, &page.items)?;
    if !plan.iter().any(|r| r.name == version) {
        info!(pipeline = name, %version, "Pipeline version not found; nothing to delete");
    }

    for revision in plan {
        info!(pipeline = name, revision = %revision.name, "Deleting pipeline version");
        match service.delete_version(&revision.id) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(revision_id = %revision.id, "Pipeline version already gone");
            }
            Err(e) => return Err(KindError::remote("delete pipeline version", e)),
        }
    }
    Ok(())
}
