//! Path resolution (spec §4.6): normalize the caller's `file_path` to the
//! repo-relative form code blocks are keyed on, falling back to recorded
//! renames when the current path has no blocks of its own (S4), and
//! narrowing by changed-line ranges when a diff is supplied.

use coderisk_core::store::StagingStore;
use coderisk_core::types::CodeBlock;
use regex::Regex;

use crate::error::Result;

/// Resolves `file_path` (optionally absolute, joined against `repo_root`) to
/// every repo-relative path worth querying: the normalized path itself, plus
/// any historical path it was renamed from, in that order.
pub fn resolve_candidate_paths(
    store: &StagingStore,
    repo_id: i64,
    file_path: &str,
    repo_root: Option<&str>,
) -> Result<Vec<String>> {
    let normalized = normalize(file_path, repo_root);

    let mut candidates = vec![normalized.clone()];
    let existing = store.list_code_blocks_for_file(repo_id, &normalized)?;
    if existing.is_empty() {
        let historical = store.resolve_historical_paths(repo_id, &normalized)?;
        candidates.extend(historical);
    }
    Ok(candidates)
}

fn normalize(file_path: &str, repo_root: Option<&str>) -> String {
    let stripped = match repo_root {
        Some(root) if !root.is_empty() => file_path.strip_prefix(root).unwrap_or(file_path),
        _ => file_path,
    };
    stripped.trim_start_matches('/').to_string()
}

/// Parses the new-file line ranges touched by a unified diff's hunk headers.
/// A header with no count (`+42 @@`) touches exactly one line (count 1).
pub fn changed_line_ranges(diff_content: &str) -> Vec<(u32, u32)> {
    let header = Regex::new(r"@@ -\d+(?:,\d+)? \+(\d+)(?:,(\d+))? @@").unwrap();
    header
        .captures_iter(diff_content)
        .filter_map(|caps| {
            let start: u32 = caps.get(1)?.as_str().parse().ok()?;
            let count: u32 = match caps.get(2) {
                Some(m) => m.as_str().parse().ok()?,
                None => 1,
            };
            let end = start.saturating_add(count.saturating_sub(1).max(0));
            Some((start, end.max(start)))
        })
        .collect()
}

fn overlaps(block: &CodeBlock, ranges: &[(u32, u32)]) -> bool {
    ranges.iter().any(|(lo, hi)| block.start_line <= *hi && *lo <= block.end_line)
}

/// Narrows `blocks` to those overlapping at least one changed-line range, or
/// returns `blocks` unchanged if the diff yielded no parseable ranges (a
/// malformed or empty diff must not silently drop every candidate block).
pub fn narrow_by_diff(blocks: Vec<CodeBlock>, diff_content: Option<&str>) -> Vec<CodeBlock> {
    let Some(diff) = diff_content else {
        return blocks;
    };
    let ranges = changed_line_ranges(diff);
    if ranges.is_empty() {
        return blocks;
    }
    blocks.into_iter().filter(|b| overlaps(b, &ranges)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_repo_root_prefix_and_leading_slash() {
        assert_eq!(normalize("/repo/src/lib.rs", Some("/repo")), "src/lib.rs");
        assert_eq!(normalize("src/lib.rs", None), "src/lib.rs");
    }

    #[test]
    fn parses_standard_hunk_header() {
        let diff = "@@ -10,3 +20,5 @@ fn foo() {\n context\n";
        assert_eq!(changed_line_ranges(diff), vec![(20, 24)]);
    }

    #[test]
    fn single_line_hunk_header_has_no_count() {
        let diff = "@@ -5 +5 @@\n";
        assert_eq!(changed_line_ranges(diff), vec![(5, 5)]);
    }

    #[test]
    fn malformed_diff_yields_no_ranges_and_keeps_all_blocks() {
        assert!(changed_line_ranges("not a diff").is_empty());
    }
}
