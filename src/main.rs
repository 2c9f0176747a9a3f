//! Thin command-line shell over the draft engine. Every subcommand is a
//! forwarding wrapper around one engine operation; no versioning logic
//! lives here.

use clap::{Parser, Subcommand};
use draftvault::{DraftEngine, MetadataPatch, VersionSummary};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// draftvault — snapshot-based version control for creative projects
#[derive(Parser, Debug)]
#[command(
    name = "draftvault",
    version,
    about = "Snapshot-based version control for creative projects 🎨",
    long_about = "draftvault versions a working directory of large binary assets by \
                  taking atomic snapshots into a deduplicating, compressed object \
                  store. Files keep a stable identity across renames, so restoring \
                  an old version writes each file to wherever it lives today."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Project directory (defaults to the repository containing the
    /// current directory)
    #[arg(short = 'C', long, global = true)]
    project: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a repository for a project
    Init {
        /// Project directory (defaults to the current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Keep draft storage outside the project tree
        #[arg(long)]
        draft_root: Option<PathBuf>,
    },

    /// Snapshot an explicit set of files
    Commit {
        /// Label for the new version
        #[arg(short, long)]
        label: String,

        /// Files to include (relative to the project root)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Snapshot a folder subtree ("." for the whole project)
    Snapshot {
        /// Label for the new version
        #[arg(short, long)]
        label: String,

        /// Folder to snapshot, relative to the project root
        #[arg(default_value = ".")]
        folder: String,
    },

    /// Restore a version onto the working tree
    Restore {
        /// Version id to restore
        version: String,
    },

    /// List versions, optionally only those containing a file or folder
    History {
        /// Filter by file or folder path (tracked across renames)
        path: Option<String>,
    },

    /// Show path-level differences between two versions
    Diff {
        /// Older version id (or unique prefix)
        older: String,

        /// Newer version id (or unique prefix)
        newer: String,

        /// List every changed path
        #[arg(short, long)]
        detail: bool,
    },

    /// Delete a version and reclaim unreferenced storage
    Delete {
        /// Version id to delete
        version: String,
    },

    /// Change a version's label
    Rename {
        /// Version id
        version: String,

        /// New label
        label: String,
    },

    /// Show the version currently materialized on the working tree
    Head,

    /// Extract one file from a version to a destination path
    Extract {
        /// Version id
        version: String,

        /// File path as recorded in the version
        path: String,

        /// Destination file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Record that a file or folder was renamed
    Mv {
        /// Old path relative to the project root
        old: String,

        /// New path relative to the project root
        new: String,
    },

    /// Replace the tags on a file's metadata
    Tag {
        /// File path relative to the project root
        path: String,

        /// Tags to set
        tags: Vec<String>,
    },

    /// Store a file as an attachment and print its internal path
    Attach {
        /// Local file to attach
        file: PathBuf,
    },

    /// Verify repository integrity (blobs, index, manifests)
    Verify,

    /// Show storage usage and compression statistics
    Report,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{} {}", colored::Colorize::red("error:"), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match &cli.command {
        Command::Init { path, draft_root } => cmd_init(path, draft_root.as_deref()),
        Command::Commit { label, files } => cmd_commit(&cli, label, files),
        Command::Snapshot { label, folder } => cmd_snapshot(&cli, folder, label),
        Command::Restore { version } => cmd_restore(&cli, version),
        Command::History { path } => cmd_history(&cli, path.as_deref()),
        Command::Diff {
            older,
            newer,
            detail,
        } => cmd_diff(&cli, older, newer, *detail),
        Command::Delete { version } => cmd_delete(&cli, version),
        Command::Rename { version, label } => {
            let engine = open_engine(&cli)?;
            let id = resolve_version(&engine, version)?;
            engine.rename_version(&id, label)?;
            eprintln!("{} Renamed {id}", colored::Colorize::green("✓"));
            Ok(())
        }
        Command::Head => cmd_head(&cli),
        Command::Extract {
            version,
            path,
            output,
        } => {
            let engine = open_engine(&cli)?;
            let id = resolve_version(&engine, version)?;
            engine.extract_file(&id, path, output)?;
            eprintln!(
                "{} Extracted {path} to {}",
                colored::Colorize::green("✓"),
                output.display(),
            );
            Ok(())
        }
        Command::Mv { old, new } => {
            open_engine(&cli)?.move_metadata(old, new)?;
            eprintln!("{} Recorded rename {old} -> {new}", colored::Colorize::green("✓"));
            Ok(())
        }
        Command::Tag { path, tags } => {
            open_engine(&cli)?.save_metadata(
                path,
                MetadataPatch {
                    tags: Some(tags.clone()),
                    ..MetadataPatch::default()
                },
            )?;
            eprintln!("{} Tagged {path}", colored::Colorize::green("✓"));
            Ok(())
        }
        Command::Attach { file } => {
            let internal = open_engine(&cli)?.save_attachment(file)?;
            println!("{internal}");
            Ok(())
        }
        Command::Verify => cmd_verify(&cli),
        Command::Report => cmd_report(&cli),
    }
}

// ─── Command Implementations ────────────────────────────────────────────────

fn cmd_init(path: &Path, draft_root: Option<&Path>) -> anyhow::Result<()> {
    let engine = DraftEngine::init(path, draft_root)?;
    eprintln!(
        "{} Initialized repository at {}",
        colored::Colorize::green("✓"),
        engine.layout().repo_dir().display(),
    );
    eprintln!("  Take a first snapshot with:");
    eprintln!(
        "  {} draftvault snapshot --label \"initial\"",
        colored::Colorize::bold("$"),
    );
    Ok(())
}

fn cmd_commit(cli: &Cli, label: &str, files: &[PathBuf]) -> anyhow::Result<()> {
    let engine = open_engine(cli)?;
    print_header("Commit");

    let pb = spinner(format!("Snapshotting {} file(s)", files.len()));
    let outcome = engine.commit(label, files);
    pb.finish_and_clear();

    print_snapshot_summary(&outcome?);
    Ok(())
}

fn cmd_snapshot(cli: &Cli, folder: &str, label: &str) -> anyhow::Result<()> {
    let engine = open_engine(cli)?;
    print_header("Snapshot");

    let pb = spinner(format!("Walking {folder}"));
    let outcome = engine.create_snapshot(folder, label);
    pb.finish_and_clear();

    print_snapshot_summary(&outcome?);
    Ok(())
}

fn cmd_restore(cli: &Cli, version: &str) -> anyhow::Result<()> {
    let engine = open_engine(cli)?;
    print_header("Restore");

    let id = resolve_version(&engine, version)?;
    let pb = spinner(format!("Restoring {id}"));
    let report = engine.restore(&id);
    pb.finish_and_clear();
    let report = report?;

    eprintln!(
        "  {} {} file(s) written, {} unchanged, {} cleaned",
        colored::Colorize::green("✓"),
        report.restored,
        report.unchanged,
        report.cleaned,
    );
    for skipped in &report.skipped {
        eprintln!(
            "  {} skipped {skipped} (renamed away or blob missing)",
            colored::Colorize::yellow("~"),
        );
    }
    Ok(())
}

fn cmd_history(cli: &Cli, path: Option<&str>) -> anyhow::Result<()> {
    let engine = open_engine(cli)?;
    let rows = engine.history(path)?;
    let head = engine.get_current_head()?;

    if rows.is_empty() {
        eprintln!("No versions found.");
        return Ok(());
    }

    eprintln!(
        "{:>8}  {:16}  {:19}  {:>6}  {:>10}  {:>10}  {}",
        "Version", "Id", "Created", "Files", "Size", "Stored", "Label"
    );
    eprintln!("{}", "─".repeat(96));

    for row in &rows {
        let head_marker = if head.as_deref() == Some(row.id.as_str()) {
            "●"
        } else {
            " "
        };
        eprintln!(
            "{head_marker}{:>7}  {:16}  {:19}  {:>6}  {:>10}  {:>10}  {}",
            row.version_number,
            row.id,
            row.timestamp.format("%Y-%m-%d %H:%M:%S"),
            row.file_count,
            format_size(row.total_size),
            format_size(row.total_compressed_size),
            row.label,
        );
    }

    eprintln!();
    eprintln!("  {} version(s)", rows.len());
    Ok(())
}

fn cmd_delete(cli: &Cli, version: &str) -> anyhow::Result<()> {
    let engine = open_engine(cli)?;
    print_header("Delete");

    let id = resolve_version(&engine, version)?;
    let outcome = engine.delete_version(&id)?;
    eprintln!(
        "  {} Deleted {id}, reclaimed {} blob(s) ({})",
        colored::Colorize::green("✓"),
        outcome.reclaimed_blobs,
        format_size(outcome.freed_bytes),
    );
    Ok(())
}

fn cmd_diff(cli: &Cli, older: &str, newer: &str, detail: bool) -> anyhow::Result<()> {
    let engine = open_engine(cli)?;
    let older_id = resolve_version(&engine, older)?;
    let newer_id = resolve_version(&engine, newer)?;

    let diff = engine.diff_versions(&older_id, &newer_id)?;
    if !diff.has_changes() {
        eprintln!("  No changes.");
        return Ok(());
    }

    if !diff.added.is_empty() {
        eprintln!(
            "  {} {} file(s) added (+{})",
            colored::Colorize::green("+"),
            diff.added.len(),
            format_size(diff.added_size),
        );
    }
    if !diff.modified.is_empty() {
        let delta = if diff.modified_size_delta >= 0 {
            format!("+{}", format_size(diff.modified_size_delta as u64))
        } else {
            format!("-{}", format_size(diff.modified_size_delta.unsigned_abs()))
        };
        eprintln!(
            "  {} {} file(s) modified (Δ {delta})",
            colored::Colorize::yellow("~"),
            diff.modified.len(),
        );
    }
    if !diff.removed.is_empty() {
        eprintln!(
            "  {} {} file(s) removed (-{})",
            colored::Colorize::red("-"),
            diff.removed.len(),
            format_size(diff.removed_size),
        );
    }

    if detail {
        eprintln!();
        for path in &diff.added {
            eprintln!("  {} {path}", colored::Colorize::green("+"));
        }
        for path in &diff.modified {
            eprintln!("  {} {path}", colored::Colorize::yellow("~"));
        }
        for path in &diff.removed {
            eprintln!("  {} {path}", colored::Colorize::red("-"));
        }
    }
    Ok(())
}

fn cmd_head(cli: &Cli) -> anyhow::Result<()> {
    let engine = open_engine(cli)?;
    match engine.get_current_head()? {
        Some(id) => println!("{id}"),
        None => eprintln!("No version restored or committed yet."),
    }
    Ok(())
}

fn cmd_verify(cli: &Cli) -> anyhow::Result<()> {
    let engine = open_engine(cli)?;
    let report = engine.validate_integrity()?;

    if report.ok {
        eprintln!("{} Repository is consistent", colored::Colorize::green("✓"));
    } else {
        for issue in &report.errors {
            eprintln!(
                "  {} {}",
                colored::Colorize::red("✗"),
                serde_json::to_string(issue)?,
            );
        }
        eprintln!(
            "{} {} problem(s) found",
            colored::Colorize::red("✗"),
            report.errors.len(),
        );
        std::process::exit(2);
    }
    Ok(())
}

fn cmd_report(cli: &Cli) -> anyhow::Result<()> {
    let engine = open_engine(cli)?;
    let report = engine.get_storage_report()?;

    print_header("Storage");
    eprintln!("  Objects:     {}", report.files.len());
    eprintln!("  Original:    {}", format_size(report.total_size));
    eprintln!("  Stored:      {}", format_size(report.total_compressed_size));
    eprintln!(
        "  Ratio:       {:.1}%",
        report.compression_ratio * 100.0,
    );

    if cli.verbose {
        eprintln!();
        eprintln!("  Objects:");
        for file in &report.files {
            eprintln!(
                "    {}  {:>10} → {:>10}  ×{}  {}",
                &file.hash[..12],
                format_size(file.size),
                format_size(file.compressed_size),
                file.ref_count,
                file.first_seen_path,
            );
        }
    }

    eprintln!();
    eprintln!("  Snapshots:");
    for snap in &report.snapshots {
        print_history_line(snap);
    }
    Ok(())
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn open_engine(cli: &Cli) -> anyhow::Result<DraftEngine> {
    let project_root = match &cli.project {
        Some(path) => path.clone(),
        None => {
            let cwd = std::env::current_dir()?;
            DraftEngine::find_project_root(&cwd).ok_or_else(|| {
                anyhow::anyhow!(
                    "no repository found from {} (run `draftvault init` first)",
                    cwd.display()
                )
            })?
        }
    };
    Ok(DraftEngine::open(&project_root)?)
}

fn resolve_version(engine: &DraftEngine, id_or_prefix: &str) -> anyhow::Result<String> {
    engine
        .resolve_version_prefix(id_or_prefix)?
        .ok_or_else(|| anyhow::anyhow!("version '{id_or_prefix}' not found"))
}

fn print_header(action: &str) {
    eprintln!();
    eprintln!(
        "  {} draftvault v{} — {action}",
        colored::Colorize::bold("⚡"),
        env!("CARGO_PKG_VERSION"),
    );
    eprintln!();
}

fn print_snapshot_summary(outcome: &draftvault::SnapshotOutcome) {
    eprintln!(
        "  {} Version {} ({})",
        colored::Colorize::green("✓"),
        colored::Colorize::bold(outcome.version_number.as_str()),
        outcome.version_id,
    );
    eprintln!("    Label:  {}", outcome.label);
    eprintln!(
        "    Files:  {} total, {} new blob(s)",
        outcome.file_count, outcome.new_blobs,
    );
    eprintln!(
        "    Size:   {} → {} stored",
        format_size(outcome.total_size),
        format_size(outcome.stored_size),
    );
}

fn print_history_line(row: &VersionSummary) {
    eprintln!(
        "    {:>8}  {:16}  {:>6} file(s)  {:>10}  {}",
        row.version_number,
        row.id,
        row.file_count,
        format_size(row.total_size),
        row.label,
    );
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Formats a byte count as a human-readable size string.
fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} PiB")
}
