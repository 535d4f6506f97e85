//! Utility functions for record paths, value rendering and file placement

use crate::config::FileCollisionAction;
use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Text used when a path does not exist in a record
pub const UNDEFINED: &str = "undefined";

/// Look up a dotted path in a JSON value
///
/// Segments address object keys, or array indices when the current value is an
/// array. Bracket indices are accepted as well, so `Tags.0.Name` and
/// `Tags[0].Name` are equivalent. An empty path addresses the value itself.
///
/// # Examples
///
/// ```
/// use rally_export::utils::lookup_path;
/// use serde_json::json;
///
/// let record = json!({"Owner": {"Name": "ada"}, "Tags": [{"Name": "ui"}]});
/// assert_eq!(lookup_path(&record, "Owner.Name"), Some(&json!("ada")));
/// assert_eq!(lookup_path(&record, "Tags[0].Name"), Some(&json!("ui")));
/// assert_eq!(lookup_path(&record, "Owner.Email"), None);
/// ```
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path_segments(path).try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['.', '[', ']']).filter(|s| !s.is_empty())
}

/// Render a looked-up value as text for string fields
///
/// Strings are used as-is, a missing value renders as `undefined`, everything
/// else renders as compact JSON (`42`, `true`, `null`, `{"a":1}`).
pub fn render_value(value: Option<&Value>) -> String {
    match value {
        None => UNDEFINED.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Extract the URL of a reference object
///
/// Rally references are objects carrying a `_ref` attribute; a bare string is
/// taken as the URL itself.
pub fn reference_url(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => map
            .get("_ref")
            .and_then(Value::as_str)
            .filter(|r| !r.is_empty())
            .map(str::to_string),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Check that an attachment file name stays inside the processing directory
pub fn validate_file_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
        || name == UNDEFINED;

    if invalid {
        return Err(Error::Other(format!(
            "refusing to write attachment with unsafe file name '{}'",
            name
        )));
    }
    Ok(())
}

/// Get the path to write to, handling collisions according to the specified action
///
/// Returns `None` when the file exists and the action is
/// [`FileCollisionAction::Skip`]. For [`FileCollisionAction::Rename`] the path
/// may carry a ` (n)` suffix before the extension.
///
/// # Examples
///
/// ```
/// use rally_export::utils::get_unique_path;
/// use rally_export::config::FileCollisionAction;
/// use std::path::Path;
///
/// let path = Path::new("/tmp/rally-export-doc/screenshot.png");
/// let unique = get_unique_path(path, FileCollisionAction::Rename).unwrap();
/// // If screenshot.png exists, returns screenshot (1).png, then (2), etc.
/// assert!(unique.is_some());
/// ```
pub fn get_unique_path(path: &Path, action: FileCollisionAction) -> Result<Option<PathBuf>> {
    get_unclaimed_path(path, action, &HashSet::new())
}

/// Like [`get_unique_path`], but paths in `claimed` count as taken too
///
/// Used when several files are placed before any of them is written: a
/// `Skip` of a claimed path returns `None` and `Rename` moves past it.
/// `Overwrite` always returns `path`.
pub fn get_unclaimed_path(
    path: &Path,
    action: FileCollisionAction,
    claimed: &HashSet<PathBuf>,
) -> Result<Option<PathBuf>> {
    let taken = |candidate: &Path| candidate.exists() || claimed.contains(candidate);

    match action {
        FileCollisionAction::Overwrite => Ok(Some(path.to_path_buf())),
        FileCollisionAction::Skip => {
            if taken(path) {
                return Ok(None);
            }
            Ok(Some(path.to_path_buf()))
        }
        FileCollisionAction::Rename => {
            if !taken(path) {
                return Ok(Some(path.to_path_buf()));
            }

            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| Error::Other(format!("cannot extract file stem of {:?}", path)))?;
            let extension = path.extension().and_then(|e| e.to_str());
            let parent = path.parent().ok_or_else(|| {
                Error::Other(format!("cannot extract parent directory of {:?}", path))
            })?;

            for i in 1..=MAX_RENAME_ATTEMPTS {
                let new_name = match extension {
                    Some(ext) => format!("{} ({}).{}", stem, i, ext),
                    None => format!("{} ({})", stem, i),
                };
                let new_path = parent.join(new_name);
                if !taken(&new_path) {
                    return Ok(Some(new_path));
                }
            }

            Err(Error::Other(format!(
                "could not find a free name for {:?} after {} attempts",
                path, MAX_RENAME_ATTEMPTS
            )))
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn lookup_nested_object_path() {
        let record = json!({"a": {"b": "42"}});
        assert_eq!(lookup_path(&record, "a.b"), Some(&json!("42")));
        assert_eq!(lookup_path(&record, "a"), Some(&json!({"b": "42"})));
    }

    #[test]
    fn lookup_missing_segments_return_none() {
        let record = json!({"a": {}});
        assert_eq!(lookup_path(&record, "a.b"), None);
        assert_eq!(lookup_path(&record, "x.y.z"), None);
        // descending into a scalar
        assert_eq!(lookup_path(&json!({"a": 1}), "a.b"), None);
    }

    #[test]
    fn lookup_array_indices() {
        let record = json!({"Tags": [{"Name": "ui"}, {"Name": "api"}]});
        assert_eq!(lookup_path(&record, "Tags.1.Name"), Some(&json!("api")));
        assert_eq!(lookup_path(&record, "Tags[1].Name"), Some(&json!("api")));
        assert_eq!(lookup_path(&record, "Tags.5.Name"), None);
        assert_eq!(lookup_path(&record, "Tags.first"), None);
    }

    #[test]
    fn lookup_empty_path_is_identity() {
        let record = json!({"a": 1});
        assert_eq!(lookup_path(&record, ""), Some(&record));
    }

    #[test]
    fn render_values() {
        assert_eq!(render_value(None), "undefined");
        assert_eq!(render_value(Some(&json!("text"))), "text");
        assert_eq!(render_value(Some(&json!(42))), "42");
        assert_eq!(render_value(Some(&json!(true))), "true");
        assert_eq!(render_value(Some(&Value::Null)), "null");
        assert_eq!(render_value(Some(&json!({"a": 1}))), r#"{"a":1}"#);
    }

    #[test]
    fn reference_url_from_object_or_string() {
        assert_eq!(
            reference_url(&json!({"_ref": "https://rally/defect/1/tasks", "Count": 2})),
            Some("https://rally/defect/1/tasks".to_string())
        );
        assert_eq!(
            reference_url(&json!("https://rally/attachmentcontent/9")),
            Some("https://rally/attachmentcontent/9".to_string())
        );
        assert_eq!(reference_url(&json!({"Count": 2})), None);
        assert_eq!(reference_url(&json!({"_ref": ""})), None);
        assert_eq!(reference_url(&json!(12)), None);
    }

    #[test]
    fn file_name_validation() {
        assert!(validate_file_name("screenshot.png").is_ok());
        assert!(validate_file_name("with space.txt").is_ok());

        for bad in ["", ".", "..", "../etc/passwd", "a/b.png", "a\\b.png", "undefined"] {
            assert!(validate_file_name(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn unique_path_for_nonexistent_file_is_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("log.txt");

        for action in [
            FileCollisionAction::Overwrite,
            FileCollisionAction::Rename,
            FileCollisionAction::Skip,
        ] {
            assert_eq!(get_unique_path(&path, action).unwrap(), Some(path.clone()));
        }
    }

    #[test]
    fn unique_path_rename_adds_counter() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("log.txt");
        fs::write(&path, "original").unwrap();

        let first = get_unique_path(&path, FileCollisionAction::Rename)
            .unwrap()
            .unwrap();
        assert_eq!(first, temp_dir.path().join("log (1).txt"));

        fs::write(&first, "first").unwrap();
        let second = get_unique_path(&path, FileCollisionAction::Rename)
            .unwrap()
            .unwrap();
        assert_eq!(second, temp_dir.path().join("log (2).txt"));
    }

    #[test]
    fn unique_path_skip_and_overwrite_on_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("log.txt");
        fs::write(&path, "original").unwrap();

        assert_eq!(get_unique_path(&path, FileCollisionAction::Skip).unwrap(), None);
        assert_eq!(
            get_unique_path(&path, FileCollisionAction::Overwrite).unwrap(),
            Some(path)
        );
    }

    #[test]
    fn claimed_paths_count_as_taken() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dup.png");
        let claimed = HashSet::from([path.clone(), temp_dir.path().join("dup (1).png")]);

        assert_eq!(
            get_unclaimed_path(&path, FileCollisionAction::Rename, &claimed).unwrap(),
            Some(temp_dir.path().join("dup (2).png"))
        );
        assert_eq!(
            get_unclaimed_path(&path, FileCollisionAction::Skip, &claimed).unwrap(),
            None
        );
        assert_eq!(
            get_unclaimed_path(&path, FileCollisionAction::Overwrite, &claimed).unwrap(),
            Some(path)
        );
    }
}
