//! Writing finished runs to disk.
//!
//! A run produces a JSON record (`social_content_<slug>_<run-id>.json`) and,
//! when a blog draft exists, a Markdown document
//! (`blog_post_<slug>_<run-id>.md`). Each file is written to a temp file in
//! the same directory and renamed into place.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use contentforge_shared::{ContentForgeError, Platform, Result, RunResult};

/// Maximum characters of topic carried into file names.
const SLUG_MAX_CHARS: usize = 50;

/// Where a run was written, with content checksums.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRun {
    pub record_path: PathBuf,
    pub document_path: Option<PathBuf>,
    pub record_sha256: String,
    pub document_sha256: Option<String>,
}

/// Write `result` under `output_dir`, creating the directory if needed.
#[instrument(skip_all, fields(run_id = %result.run_id, dir = %output_dir.display()))]
pub fn persist_run(output_dir: &Path, result: &RunResult) -> Result<PersistedRun> {
    std::fs::create_dir_all(output_dir)
        .map_err(|e| ContentForgeError::persistence(output_dir, e))?;

    let slug = slugify(result.request.topic());
    let run_id = &result.run_id;

    let record = serde_json::to_string_pretty(result).map_err(|e| {
        ContentForgeError::parse(format!("run record serialization failed: {e}"))
    })?;
    let record_path = output_dir.join(format!("social_content_{slug}_{run_id}.json"));
    let record_sha256 = write_atomic(&record_path, &record)?;

    let (document_path, document_sha256) = match result.draft(Platform::Blog) {
        Some(blog) => {
            let path = output_dir.join(format!("blog_post_{slug}_{run_id}.md"));
            let hash = match write_atomic(&path, &render_document(&blog.body)) {
                Ok(hash) => hash,
                Err(e) => {
                    // Leave no half-written run behind.
                    let _ = std::fs::remove_file(&record_path);
                    return Err(e);
                }
            };
            (Some(path), Some(hash))
        }
        None => {
            debug!("no blog draft, skipping document file");
            (None, None)
        }
    };

    info!(
        record = %record_path.display(),
        document = document_path.is_some(),
        "run persisted"
    );

    Ok(PersistedRun {
        record_path,
        document_path,
        record_sha256,
        document_sha256,
    })
}

/// Read a run record written by [`persist_run`].
pub fn load_run(path: &Path) -> Result<RunResult> {
    let content = std::fs::read_to_string(path).map_err(|e| ContentForgeError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| {
        ContentForgeError::parse(format!("invalid run record {}: {e}", path.display()))
    })
}

/// File-name-safe form of a topic.
///
/// Alphanumerics, `-` and `_` are kept; everything else becomes `_`.
pub fn slugify(topic: &str) -> String {
    let slug: String = topic
        .trim()
        .chars()
        .take(SLUG_MAX_CHARS)
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

fn render_document(body: &str) -> String {
    let mut doc = body.trim_end().to_string();
    doc.push('\n');
    doc
}

/// Write via `.<name>.tmp` + rename and return the content's SHA-256.
fn write_atomic(target: &Path, content: &str) -> Result<String> {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = target.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, content).map_err(|e| ContentForgeError::persistence(&temp, e))?;
    if let Err(e) = std::fs::rename(&temp, target) {
        let _ = std::fs::remove_file(&temp);
        return Err(ContentForgeError::persistence(target, e));
    }

    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    debug!(path = %target.display(), size = content.len(), "wrote file");
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use contentforge_shared::{
        ContentDraft, PlatformFailure, ResearchResult, RunId, RunRequest,
    };

    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cf-persist-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn make_result(topic: &str, with_blog: bool) -> RunResult {
        let mut drafts = Vec::new();
        if with_blog {
            drafts.push(ContentDraft::new(Platform::Blog, "# Wind\n\nTurbines turn."));
        }
        drafts.push(ContentDraft::new(Platform::Twitter, "Wind! #energy"));

        RunResult {
            run_id: RunId::new(),
            request: RunRequest::new(topic),
            research: ResearchResult {
                summary: "background".into(),
                sources: vec![],
                is_fallback: true,
                skipped: vec![],
            },
            drafts,
            failures: vec![PlatformFailure {
                platform: Platform::Linkedin,
                error: "API error (HTTP 400): nope".into(),
            }],
            generated_at: Utc::now(),
        }
    }

    fn sha256_hex(bytes: &[u8]) -> String {
        format!("{:x}", Sha256::digest(bytes))
    }

    #[test]
    fn slug_rules() {
        assert_eq!(slugify("renewable energy"), "renewable_energy");
        assert_eq!(slugify("AI/ML: what's next?"), "AI_ML__what_s_next_");
        assert_eq!(slugify("keep-these_chars"), "keep-these_chars");
        assert_eq!(slugify("   "), "untitled");
        assert_eq!(slugify(&"x".repeat(80)).chars().count(), 50);
    }

    #[test]
    fn writes_record_and_document() {
        let tmp = temp_dir();
        let result = make_result("wind power", true);

        let persisted = persist_run(&tmp, &result).unwrap();

        let record_name = persisted.record_path.file_name().unwrap().to_string_lossy();
        assert_eq!(
            record_name,
            format!("social_content_wind_power_{}.json", result.run_id)
        );

        let doc_path = persisted.document_path.clone().unwrap();
        let doc = std::fs::read_to_string(&doc_path).unwrap();
        assert_eq!(doc, "# Wind\n\nTurbines turn.\n");
        assert_eq!(
            persisted.document_sha256.as_deref(),
            Some(sha256_hex(doc.as_bytes()).as_str())
        );

        let record = std::fs::read(&persisted.record_path).unwrap();
        assert_eq!(persisted.record_sha256, sha256_hex(&record));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn record_round_trips_through_load() {
        let tmp = temp_dir();
        let result = make_result("wind power", true);

        let persisted = persist_run(&tmp, &result).unwrap();
        let loaded = load_run(&persisted.record_path).unwrap();

        assert_eq!(loaded, result);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn no_blog_means_no_document() {
        let tmp = temp_dir();
        let result = make_result("wind power", false);

        let persisted = persist_run(&tmp, &result).unwrap();

        assert!(persisted.document_path.is_none());
        assert!(persisted.document_sha256.is_none());
        assert!(persisted.record_path.exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn leaves_no_temp_files() {
        let tmp = temp_dir();
        persist_run(&tmp, &make_result("wind", true)).unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(&tmp)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn repeated_runs_get_distinct_files() {
        let tmp = temp_dir();

        let first = persist_run(&tmp, &make_result("same topic", true)).unwrap();
        let second = persist_run(&tmp, &make_result("same topic", true)).unwrap();

        assert_ne!(first.record_path, second.record_path);
        assert!(first.record_path.exists());
        assert!(second.record_path.exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn unwritable_output_dir_is_persistence_error() {
        let tmp = temp_dir();
        let blocker = tmp.join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();

        let err = persist_run(&blocker, &make_result("wind", true)).unwrap_err();
        assert!(matches!(err, ContentForgeError::Persistence { .. }));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn failed_document_write_removes_record() {
        let tmp = temp_dir();
        let result = make_result("wind power", true);
        // A directory squatting on the document name makes the rename fail.
        let doc_path = tmp.join(format!("blog_post_wind_power_{}.md", result.run_id));
        std::fs::create_dir_all(doc_path.join("occupied")).unwrap();

        let err = persist_run(&tmp, &result).unwrap_err();
        assert!(matches!(err, ContentForgeError::Persistence { .. }));

        let record_path = tmp.join(format!("social_content_wind_power_{}.json", result.run_id));
        assert!(!record_path.exists());
        let leftovers: Vec<_> = std::fs::read_dir(&tmp)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path() != doc_path)
            .collect();
        assert!(leftovers.is_empty());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn load_rejects_garbage() {
        let tmp = temp_dir();
        let path = tmp.join("broken.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            load_run(&path).unwrap_err(),
            ContentForgeError::Parse { .. }
        ));

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
