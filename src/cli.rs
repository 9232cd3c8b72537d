//! Command-line interface definitions.
//!
//! Two independent subcommands share one binary: `scrape` collects reviews
//! into CSV datasets and `pseudonymize` rewrites reviewer names in them.
//! Directory options can also be provided via environment variables.

use crate::models::Section;
use clap::{Args, Parser, Subcommand};
use std::convert::Infallible;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Command-line arguments for the airline review scraper.
///
/// # Examples
///
/// ```sh
/// # Scrape every section of the default airline into ./data
/// airline_reviews scrape
///
/// # First five pages of seat reviews into a specific file
/// airline_reviews scrape --section seat --pages 5 --output /tmp/seats.csv
///
/// # Pseudonymize every dataset in ./data
/// airline_reviews pseudonymize
///
/// # Same, under a private salt
/// PSEUDONYM_SALT=... airline_reviews pseudonymize
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scrape reviews and merge them into the datasets
    Scrape(ScrapeArgs),
    /// Replace reviewer names in datasets with stable pseudonyms
    Pseudonymize(PseudonymizeArgs),
}

#[derive(Args, Debug)]
pub struct ScrapeArgs {
    /// Review section to scrape; repeat for several (default: all)
    #[arg(short, long = "section", value_enum)]
    pub sections: Vec<Section>,

    /// Stop after this many listing pages per section
    #[arg(short, long)]
    pub pages: Option<u32>,

    /// Dataset file to write (only with a single section)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Directory holding the `<section>_reviews.csv` datasets
    #[arg(short, long, env = "REVIEWS_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Airline slug as used in review URLs, e.g. `british-airways`
    #[arg(short, long, env = "AIRLINE")]
    pub airline: Option<String>,

    /// Optional path to a YAML scraper config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl ScrapeArgs {
    /// Sections to scrape, all of them when none was named.
    pub fn sections(&self) -> Vec<Section> {
        if self.sections.is_empty() {
            Section::ALL.to_vec()
        } else {
            let mut sections = Vec::new();
            for section in &self.sections {
                if !sections.contains(section) {
                    sections.push(*section);
                }
            }
            sections
        }
    }

    /// Dataset path for `section`.
    pub fn output_path(&self, section: Section) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.data_dir.join(section.dataset_file_name()))
    }
}

#[derive(Args, Debug)]
pub struct PseudonymizeArgs {
    /// Dataset to pseudonymize (default: every `*_reviews.csv` in the data directory)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Where to write the result (default: overwrite the input)
    #[arg(short, long, requires = "input")]
    pub output: Option<PathBuf>,

    /// Directory searched when no input is given
    #[arg(short, long, env = "REVIEWS_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Secret mixed into every pseudonym; runs must share it to agree
    #[arg(long, env = "PSEUDONYM_SALT", hide_env_values = true)]
    pub salt: Option<Salt>,
}

/// Pseudonym salt. Kept out of `Debug` output so argument logging does not
/// leak it.
#[derive(Clone)]
pub struct Salt(String);

impl Salt {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl FromStr for Salt {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Salt(s.to_string()))
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Salt(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrape_defaults() {
        let cli = Cli::parse_from(["airline_reviews", "scrape"]);
        let Command::Scrape(args) = cli.command else {
            panic!("expected scrape");
        };
        assert_eq!(args.sections(), Section::ALL.to_vec());
        assert_eq!(args.pages, None);
        assert_eq!(
            args.output_path(Section::Lounge),
            PathBuf::from("data/lounge_reviews.csv")
        );
    }

    #[test]
    fn test_scrape_overrides() {
        let cli = Cli::parse_from([
            "airline_reviews",
            "scrape",
            "-s",
            "seat",
            "--section",
            "seat",
            "--pages",
            "5",
            "--output",
            "/tmp/seats.csv",
        ]);
        let Command::Scrape(args) = cli.command else {
            panic!("expected scrape");
        };
        assert_eq!(args.sections(), vec![Section::Seat]);
        assert_eq!(args.pages, Some(5));
        assert_eq!(args.output_path(Section::Seat), PathBuf::from("/tmp/seats.csv"));
    }

    #[test]
    fn test_pseudonymize_paths() {
        let cli = Cli::parse_from([
            "airline_reviews",
            "pseudonymize",
            "-i",
            "in.csv",
            "-o",
            "out.csv",
        ]);
        let Command::Pseudonymize(args) = cli.command else {
            panic!("expected pseudonymize");
        };
        assert_eq!(args.input, Some(PathBuf::from("in.csv")));
        assert_eq!(args.output, Some(PathBuf::from("out.csv")));
    }

    #[test]
    fn test_pseudonymize_salt_flag() {
        let cli = Cli::parse_from(["airline_reviews", "pseudonymize", "--salt", "pepper"]);
        let Command::Pseudonymize(args) = cli.command else {
            panic!("expected pseudonymize");
        };
        assert_eq!(args.salt.as_ref().map(Salt::expose), Some("pepper"));
        assert!(!format!("{args:?}").contains("pepper"));
    }

    #[test]
    fn test_pseudonymize_output_requires_input() {
        let result = Cli::try_parse_from(["airline_reviews", "pseudonymize", "-o", "out.csv"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_section_rejected() {
        let result = Cli::try_parse_from(["airline_reviews", "scrape", "--section", "cargo"]);
        assert!(result.is_err());
    }
}
