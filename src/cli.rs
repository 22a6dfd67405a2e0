use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::core::session::RowEdit;
use crate::entities::record::parse_flag;

// Build version with tool info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Catalog: xlsx (rust_xlsxwriter / calamine)\n",
    "Tools:   exiftool, oiiotool, ffmpeg, ImageMagick convert\n",
    "Target:  ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Scan catalog and plate publisher
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging to file (default: iomanager.log in the data directory)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE", global = true)]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR", global = true)]
    pub config_dir: Option<PathBuf>,

    /// Project root (overrides show_root/project from settings)
    #[arg(short = 'r', long = "project-root", value_name = "DIR", global = true)]
    pub project_root: Option<PathBuf>,

    /// Project name under the show root
    #[arg(short = 'p', long = "project", value_name = "NAME", global = true)]
    pub project: Option<String>,

    /// Print results as JSON
    #[arg(long = "json", global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the latest catalog of a scan directory
    Latest {
        #[arg(value_name = "SCAN_DIR")]
        dir: PathBuf,
    },
    /// Show the file name the next save would write
    Next {
        #[arg(value_name = "SCAN_DIR")]
        dir: PathBuf,
    },
    /// List detected sequences
    Scan {
        #[arg(value_name = "SCAN_DIR")]
        dir: PathBuf,
    },
    /// Compare the latest catalog with the scan, write nothing
    Status {
        #[arg(value_name = "SCAN_DIR")]
        dir: PathBuf,
    },
    /// Create the first catalog, or check (and optionally renew) the latest one
    Sync {
        #[arg(value_name = "SCAN_DIR")]
        dir: PathBuf,
        /// Write a new version when the scan changed
        #[arg(long = "regenerate")]
        regenerate: bool,
    },
    /// Edit rows and save as the next version
    Edit {
        #[arg(value_name = "SCAN_DIR")]
        dir: PathBuf,
        /// ROW.FIELD=VALUE, FIELD one of seq, shot, check (repeatable)
        #[arg(short = 's', long = "set", value_name = "ROW.FIELD=VALUE", value_parser = parse_set, required = true)]
        sets: Vec<FieldSet>,
    },
    /// Check (or uncheck) rows for publish and save as the next version
    Select {
        #[arg(value_name = "SCAN_DIR")]
        dir: PathBuf,
        /// Sheet row numbers (first record is row 2)
        #[arg(value_name = "ROW", required = true)]
        rows: Vec<usize>,
        #[arg(long = "uncheck")]
        uncheck: bool,
    },
    /// Publish rows of the latest catalog (default: the checked rows)
    Publish {
        #[arg(value_name = "SCAN_DIR")]
        dir: PathBuf,
        #[arg(long = "row", value_name = "ROW")]
        rows: Vec<usize>,
        /// Show what would be published without converting or tracking
        #[arg(short = 'n', long = "dry-run")]
        dry_run: bool,
    },
    /// Show settings (or write the defaults)
    Config {
        /// Write the effective settings to the settings file
        #[arg(long = "init")]
        init: bool,
    },
}

/// Editable catalog field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditField {
    SeqName,
    ShotName,
    Check,
}

/// One `--set` argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSet {
    pub row: usize,
    pub field: EditField,
    pub value: String,
}

/// Parse `ROW.FIELD=VALUE` (`3.shot=S001_0010`)
pub fn parse_set(s: &str) -> Result<FieldSet, String> {
    let (target, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ROW.FIELD=VALUE, got '{}'", s))?;
    let (row, field) = target
        .split_once('.')
        .ok_or_else(|| format!("expected ROW.FIELD before '=', got '{}'", target))?;
    let row: usize = row
        .trim()
        .parse()
        .map_err(|_| format!("invalid row number '{}'", row))?;
    if row < crate::catalog::FIRST_DATA_ROW {
        return Err(format!("row {} is the header; records start at row 2", row));
    }
    let field = match field.trim() {
        "seq" | "seq_name" => EditField::SeqName,
        "shot" | "shot_name" => EditField::ShotName,
        "check" => EditField::Check,
        other => return Err(format!("unknown field '{}' (use seq, shot or check)", other)),
    };
    Ok(FieldSet {
        row,
        field,
        value: value.to_string(),
    })
}

/// Merge `--set` arguments into one edit per row (later sets win)
pub fn row_edits(sets: &[FieldSet]) -> Vec<RowEdit> {
    let mut edits: BTreeMap<usize, RowEdit> = BTreeMap::new();
    for set in sets {
        let edit = edits.entry(set.row).or_insert_with(|| RowEdit {
            row: set.row,
            ..Default::default()
        });
        match set.field {
            EditField::SeqName => edit.seq_name = Some(set.value.clone()),
            EditField::ShotName => edit.shot_name = Some(set.value.clone()),
            EditField::Check => edit.check = Some(parse_flag(&set.value)),
        }
    }
    edits.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_set() {
        assert_eq!(
            parse_set("3.shot=S001_0010"),
            Ok(FieldSet {
                row: 3,
                field: EditField::ShotName,
                value: "S001_0010".into()
            })
        );
        assert_eq!(parse_set("2.seq_name=").map(|s| s.value), Ok(String::new()));
        assert!(parse_set("1.shot=x").is_err());
        assert!(parse_set("a.shot=x").is_err());
        assert!(parse_set("3.directory=/tmp").is_err());
        assert!(parse_set("3shot").is_err());
    }

    #[test]
    fn test_row_edits_merge_per_row() {
        let sets: Vec<FieldSet> = ["3.seq=S001", "2.check=1", "3.shot=S001_0010", "3.check=yes"]
            .iter()
            .map(|s| parse_set(s).unwrap())
            .collect();
        let edits = row_edits(&sets);
        assert_eq!(edits.len(), 2);
        assert_eq!(edits[0].row, 2);
        assert_eq!(edits[0].check, Some(true));
        assert_eq!(edits[1].seq_name.as_deref(), Some("S001"));
        assert_eq!(edits[1].shot_name.as_deref(), Some("S001_0010"));
        assert_eq!(edits[1].check, Some(true));
    }

    #[test]
    fn test_publish_flags() {
        let args = Args::try_parse_from([
            "iomanager", "-vv", "publish", "/show/vamos/product/scan/20250529", "--row", "2", "--row", "4", "-n",
        ])
        .unwrap();
        assert_eq!(args.verbosity, 2);
        match args.command {
            Command::Publish { rows, dry_run, .. } => {
                assert_eq!(rows, vec![2, 4]);
                assert!(dry_run);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
