//! Repository fixtures: write convention-path artifacts for tests.

use bytes::Bytes;

use veld_core::{artifact_path, ArtifactKind, RepoStore, Result};

/// Writes a `local_file` source artifact. Returns the repository path.
///
/// # Errors
///
/// Propagates repository write failures.
pub async fn put_source(
    repo: &dyn RepoStore,
    instance_id: &str,
    name: &str,
    file_path: &str,
) -> Result<String> {
    let path = artifact_path(ArtifactKind::Source, name);
    let yaml = format!("type: local_file\npath: {file_path}\n");
    repo.put(instance_id, &path, Bytes::from(yaml)).await?;
    Ok(path)
}

/// Writes a model artifact. Returns the repository path.
///
/// # Errors
///
/// Propagates repository write failures.
pub async fn put_model(
    repo: &dyn RepoStore,
    instance_id: &str,
    name: &str,
    sql: &str,
) -> Result<String> {
    let path = artifact_path(ArtifactKind::Model, name);
    repo.put(instance_id, &path, Bytes::from(sql.to_string()))
        .await?;
    Ok(path)
}

/// Writes a metrics-view artifact over `model` with the given
/// `(name, expression)` measures. Returns the repository path.
///
/// # Errors
///
/// Propagates repository write failures.
pub async fn put_metrics_view(
    repo: &dyn RepoStore,
    instance_id: &str,
    name: &str,
    model: &str,
    time_dimension: Option<&str>,
    measures: &[(&str, &str)],
) -> Result<String> {
    let path = artifact_path(ArtifactKind::MetricsView, name);
    let mut yaml = format!("model: {model}\n");
    if let Some(time_dim) = time_dimension {
        yaml.push_str(&format!("time_dimension: {time_dim}\n"));
    }
    if !measures.is_empty() {
        yaml.push_str("measures:\n");
        for (measure_name, expression) in measures {
            yaml.push_str(&format!(
                "  - name: {measure_name}\n    expression: {expression}\n"
            ));
        }
    }
    repo.put(instance_id, &path, Bytes::from(yaml)).await?;
    Ok(path)
}
