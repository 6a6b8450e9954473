//! File filtering and hunk extraction (spec §4.2 steps 1-2).

use coderisk_core::types::FilePatch;
use coderisk_llm::types::FileHunks;

const DOC_EXTENSIONS: &[&str] = &["md", "mdx", "txt", "rst"];
const CONFIG_EXTENSIONS: &[&str] = &["json", "yaml", "yml", "toml", "ini", "lock"];
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "pdf", "zip", "gz", "tar", "woff", "woff2",
    "ttf", "eot", "so", "dylib", "dll", "exe", "wasm", "bin",
];

fn extension(path: &str) -> Option<&str> {
    path.rsplit('.').next().filter(|ext| *ext != path)
}

fn is_dotfile(path: &str) -> bool {
    path.rsplit('/').next().map(|name| name.starts_with('.')).unwrap_or(false)
}

/// Step 1: exclude binary, documentation, dotfiles, and configuration
/// formats from consideration by the atomizer.
pub fn is_excluded(path: &str) -> bool {
    if is_dotfile(path) {
        return true;
    }
    match extension(path) {
        Some(ext) => {
            let ext = ext.to_lowercase();
            DOC_EXTENSIONS.contains(&ext.as_str())
                || CONFIG_EXTENSIONS.contains(&ext.as_str())
                || BINARY_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

/// Step 2: extract hunk text per file that survived filtering. A file with
/// no patch text (a whole-file addition, or one whose patch was dropped at
/// ingestion for exceeding the size threshold) is passed through with
/// `hunks: None` — the LLM prompt treats that as "entire file" (spec §4.2
/// step 2).
pub fn extract_hunks(files: &[FilePatch]) -> Vec<FileHunks> {
    files
        .iter()
        .filter(|f| !is_excluded(&f.path))
        .map(|f| FileHunks { path: f.path.clone(), hunks: f.patch.clone() })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documentation_and_config_files_are_excluded() {
        assert!(is_excluded("README.md"));
        assert!(is_excluded("package.json"));
        assert!(is_excluded("Cargo.lock"));
        assert!(is_excluded(".gitignore"));
        assert!(!is_excluded("src/auth.rs"));
    }

    #[test]
    fn binary_extensions_are_excluded() {
        assert!(is_excluded("assets/logo.png"));
    }

    #[test]
    fn whole_file_addition_without_patch_text_is_still_submitted() {
        let files = vec![FilePatch {
            path: "src/new.rs".into(),
            additions: 120,
            deletions: 0,
            patch: None,
            status: coderisk_core::types::FileChangeStatus::Added,
        }];
        let hunks = extract_hunks(&files);
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].hunks, None);
    }
}
