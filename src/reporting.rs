//! Rendering of statistics for terminals and files.
//!
//! Every renderer returns a `String`; [`write_output`] decides whether it
//! goes to a file or to stdout.

use prettytable::{Cell, Row, Table, format};
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::cli::{CommentersOutputFormat, MergedOutputFormat, ReleasesOutputFormat};
use crate::contributor_tally::ContributorTally;
use crate::error::{ReleaseStatsError, Result};
use crate::forge::RateLimitStatus;
use crate::orchestrator::{ReleaseFailure, ReleaseOutcome};
use crate::pull_requests::PullRequestRow;
use crate::release_delta::ReleaseStats;

fn box_table() -> Table {
    let mut table = Table::new();
    let format = format::FormatBuilder::new()
        .column_separator('│')
        .borders('│')
        .separators(
            &[format::LinePosition::Top],
            format::LineSeparator::new('─', '┬', '┌', '┐'),
        )
        .separators(
            &[format::LinePosition::Intern],
            format::LineSeparator::new('─', '┼', '├', '┤'),
        )
        .separators(
            &[format::LinePosition::Bottom],
            format::LineSeparator::new('─', '┴', '└', '┘'),
        )
        .padding(1, 1)
        .build();
    table.set_format(format);
    table
}

fn header(names: &[&str]) -> Row {
    Row::new(names.iter().map(|name| Cell::new(name)).collect())
}

/// One paragraph per release, followed by its most prolific committers.
pub fn release_summary(stats: &ReleaseStats) -> String {
    let mut out = format!(
        "Version {} had {} commits from {} authors ({} new) and {} merges\n",
        stats.release,
        stats.commit_count,
        stats.author_count,
        stats.new_author_count,
        stats.merge_count
    );
    out.push_str("Most prolific committers:\n");
    for committer in &stats.top_committers {
        out.push_str(&format!("{:>7} {}\n", committer.commits, committer.author));
    }
    out
}

fn release_table(stats: &[ReleaseStats]) -> Table {
    let mut table = box_table();
    table.set_titles(header(&[
        "Release",
        "Commits",
        "Merges",
        "Authors",
        "New Authors",
        "Top Committers",
    ]));
    for release in stats {
        let top = release
            .top_committers
            .iter()
            .map(|c| format!("{} ({})", c.author, c.commits))
            .collect::<Vec<_>>()
            .join("\n");
        table.add_row(Row::new(vec![
            Cell::new(&release.release),
            Cell::new(&release.commit_count.to_string()),
            Cell::new(&release.merge_count.to_string()),
            Cell::new(&release.author_count.to_string()),
            Cell::new(&release.new_author_count.to_string()),
            Cell::new(&top),
        ]));
    }
    table
}

fn failure_table(failures: &[ReleaseFailure]) -> Table {
    let mut table = box_table();
    table.set_titles(header(&["Release", "Error"]));
    for failure in failures {
        table.add_row(Row::new(vec![
            Cell::new(&failure.release),
            Cell::new(&failure.message),
        ]));
    }
    table
}

#[derive(Serialize)]
struct ReleaseCsvRow<'a> {
    release: &'a str,
    commits: usize,
    merges: usize,
    authors: usize,
    new_authors: usize,
}

fn csv_string<T: Serialize>(rows: impl IntoIterator<Item = T>) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer.into_inner().map_err(|e| ReleaseStatsError::OutputError {
        format: "csv".to_string(),
        message: format!("Failed to flush CSV: {}", e.error()),
        source: None,
    })?;
    String::from_utf8(bytes).map_err(|e| ReleaseStatsError::OutputError {
        format: "csv".to_string(),
        message: "CSV output is not valid UTF-8".to_string(),
        source: Some(Box::new(e)),
    })
}

/// Renders the releases step in the requested format.
///
/// Failed releases are listed after the statistics in table and text
/// output and under `failures` in JSON and YAML. CSV carries only the
/// successful releases.
pub fn render_releases(outcome: &ReleaseOutcome, output: ReleasesOutputFormat) -> Result<String> {
    match output {
        ReleasesOutputFormat::Table => {
            let mut out = release_table(&outcome.releases).to_string();
            if !outcome.failures.is_empty() {
                out.push_str("\nFailed releases:\n");
                out.push_str(&failure_table(&outcome.failures).to_string());
            }
            Ok(out)
        }
        ReleasesOutputFormat::Text => {
            let mut out = outcome
                .releases
                .iter()
                .map(release_summary)
                .collect::<Vec<_>>()
                .join("\n");
            for failure in &outcome.failures {
                out.push_str(&format!(
                    "Version {} could not be analyzed: {}\n",
                    failure.release, failure.message
                ));
            }
            Ok(out)
        }
        ReleasesOutputFormat::Json => Ok(serde_json::to_string_pretty(outcome)? + "\n"),
        ReleasesOutputFormat::Yaml => Ok(serde_yaml::to_string(outcome)?),
        ReleasesOutputFormat::Csv => csv_string(outcome.releases.iter().map(|r| ReleaseCsvRow {
            release: &r.release,
            commits: r.commit_count,
            merges: r.merge_count,
            authors: r.author_count,
            new_authors: r.new_author_count,
        })),
    }
}

/// Renders a comment tally, rows sorted by count then login.
///
/// The CSV form has exactly the columns `commenter,comments`.
pub fn render_tally(tally: &ContributorTally, output: CommentersOutputFormat) -> Result<String> {
    let rows = tally.sorted_rows();
    match output {
        CommentersOutputFormat::Csv => {
            if rows.is_empty() {
                return Ok("commenter,comments\n".to_string());
            }
            csv_string(&rows)
        }
        CommentersOutputFormat::Table => {
            let mut table = box_table();
            table.set_titles(header(&["Commenter", "Comments"]));
            for row in &rows {
                table.add_row(Row::new(vec![
                    Cell::new(&row.commenter),
                    Cell::new(&row.comments.to_string()),
                ]));
            }
            Ok(table.to_string())
        }
        CommentersOutputFormat::Json => Ok(serde_json::to_string_pretty(&rows)? + "\n"),
    }
}

/// Renders pull requests merged into the mainline.
pub fn render_merged(rows: &[PullRequestRow], output: MergedOutputFormat) -> Result<String> {
    match output {
        MergedOutputFormat::Table => {
            let mut table = box_table();
            table.set_titles(header(&["PR", "Author", "Merged At"]));
            for row in rows {
                let merged_at = row
                    .merged_at
                    .map(|at| at.format("%Y-%m-%d").to_string())
                    .unwrap_or_default();
                table.add_row(Row::new(vec![
                    Cell::new(&row.number.to_string()),
                    Cell::new(&row.author),
                    Cell::new(&merged_at),
                ]));
            }
            Ok(table.to_string())
        }
        MergedOutputFormat::Json => Ok(serde_json::to_string_pretty(rows)? + "\n"),
    }
}

/// One line describing the rate-limit window.
pub fn render_rate_limit(status: &RateLimitStatus) -> String {
    format!(
        "{} of {} requests remaining ({} used), resets at {}\n",
        status.remaining,
        status.limit,
        status.used,
        status.reset.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// Writes `content` to `path`, or to stdout when no path is given.
pub fn write_output(content: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            fs::write(path, content).map_err(|e| {
                ReleaseStatsError::io_error_with_source("write report", path.to_path_buf(), e)
            })?;
            tracing::info!(path = %path.display(), "report written");
        }
        None => print!("{content}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release_delta::CommitterCount;
    use tempfile::TempDir;

    fn stats() -> ReleaseStats {
        ReleaseStats {
            release: "0.15".to_string(),
            commit_count: 6,
            merge_count: 2,
            author_count: 4,
            new_author_count: 3,
            top_committers: vec![
                CommitterCount {
                    author: "Alice".to_string(),
                    commits: 3,
                },
                CommitterCount {
                    author: "Carol".to_string(),
                    commits: 1,
                },
            ],
        }
    }

    fn outcome() -> ReleaseOutcome {
        ReleaseOutcome {
            releases: vec![stats()],
            failures: vec![ReleaseFailure {
                release: "0.16".to_string(),
                kind: "UnresolvedReferenceError".to_string(),
                message: "reference '0.16' not found".to_string(),
            }],
        }
    }

    #[test]
    fn test_release_summary_text() {
        let text = release_summary(&stats());
        assert_eq!(
            text,
            "Version 0.15 had 6 commits from 4 authors (3 new) and 2 merges\n\
             Most prolific committers:\n      3 Alice\n      1 Carol\n"
        );
    }

    #[test]
    fn test_text_output_lists_failures() {
        let text = render_releases(&outcome(), ReleasesOutputFormat::Text).unwrap();
        assert!(text.contains("Version 0.16 could not be analyzed"));
    }

    #[test]
    fn test_table_output_contains_every_release() {
        let table = render_releases(&outcome(), ReleasesOutputFormat::Table).unwrap();
        assert!(table.contains("0.15"));
        assert!(table.contains("Alice (3)"));
        assert!(table.contains("Failed releases"));
    }

    #[test]
    fn test_json_output_has_releases_and_failures() {
        let json = render_releases(&outcome(), ReleasesOutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["releases"][0]["commit_count"], 6);
        assert_eq!(value["failures"][0]["release"], "0.16");
    }

    #[test]
    fn test_release_csv_columns() {
        let csv = render_releases(&outcome(), ReleasesOutputFormat::Csv).unwrap();
        assert_eq!(csv, "release,commits,merges,authors,new_authors\n0.15,6,2,4,3\n");
    }

    #[test]
    fn test_empty_tally_csv_still_has_header() {
        let csv = render_tally(&ContributorTally::new(), CommentersOutputFormat::Csv).unwrap();
        assert_eq!(csv, "commenter,comments\n");
    }

    #[test]
    fn test_write_output_to_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        write_output("a,b\n", Some(&path)).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a,b\n");
    }

    #[test]
    fn test_write_output_to_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("out.csv");
        assert!(matches!(
            write_output("x", Some(&path)),
            Err(ReleaseStatsError::IoError { .. })
        ));
    }
}
