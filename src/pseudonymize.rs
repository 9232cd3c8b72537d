//! Reviewer name pseudonymization.
//!
//! Every `reviewer_name` that looks like a personal name is replaced with
//! `reviewer-` followed by 12 hex digits of a BLAKE3 hash of the normalized
//! name and location. A reviewer is identified by name and location together,
//! so two `John Smith`s from different countries get different pseudonyms.
//!
//! The mapping needs no state: the same input gives the same pseudonym on any
//! machine and in any run. Values that already are pseudonyms are left alone,
//! which makes a second pass a no-op. Only the name column is touched; record
//! order and every other field are preserved.
//!
//! Without a salt anyone holding a list of candidate names can recompute the
//! mapping. With a salt (`--salt` / `PSEUDONYM_SALT`) the hash is keyed by a
//! key derived from it, and the mapping is only stable for runs sharing that
//! salt.

use crate::error::WriteError;
use crate::outputs::dataset::Dataset;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

const PREFIX: &str = "reviewer-";
const SALT_CONTEXT: &str = "airline_reviews 2024 reviewer pseudonym salt";

static PSEUDONYM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^reviewer-[0-9a-f]{12}$").expect("pseudonym regex"));

/// Outcome of pseudonymizing one dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PseudonymizeStats {
    pub replaced: usize,
    pub already_pseudonymized: usize,
    pub absent: usize,
    /// Present values that did not look like a name and were kept.
    pub not_a_name: usize,
}

pub fn is_pseudonym(value: &str) -> bool {
    PSEUDONYM_RE.is_match(value)
}

/// Whether a name field holds something worth replacing.
///
/// Any value with a letter counts, including initials and single given
/// names; bare punctuation or digits do not.
pub fn looks_like_name(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && !is_pseudonym(value) && value.chars().any(char::is_alphabetic)
}

fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Maps reviewers to pseudonyms, optionally under a secret salt.
#[derive(Clone, Default)]
pub struct Pseudonymizer {
    key: Option<[u8; 32]>,
}

impl std::fmt::Debug for Pseudonymizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pseudonymizer")
            .field("salted", &self.key.is_some())
            .finish()
    }
}

impl Pseudonymizer {
    /// An empty salt counts as no salt.
    pub fn new(salt: Option<&str>) -> Self {
        let key = salt
            .filter(|s| !s.is_empty())
            .map(|s| blake3::derive_key(SALT_CONTEXT, s.as_bytes()));
        Self { key }
    }

    pub fn is_salted(&self) -> bool {
        self.key.is_some()
    }

    /// Stable pseudonym for a reviewer.
    pub fn pseudonym(&self, name: &str, location: Option<&str>) -> String {
        let mut hasher = match &self.key {
            Some(key) => blake3::Hasher::new_keyed(key),
            None => blake3::Hasher::new(),
        };
        hasher.update(normalize(name).as_bytes());
        hasher.update(b"|");
        hasher.update(normalize(location.unwrap_or_default()).as_bytes());
        let hash = hasher.finalize();
        format!("{PREFIX}{}", &hex::encode(hash.as_bytes())[..12])
    }
}

/// Replace reviewer names in place.
pub fn pseudonymize_dataset(
    dataset: &mut Dataset,
    pseudonymizer: &Pseudonymizer,
) -> PseudonymizeStats {
    let mut stats = PseudonymizeStats::default();
    for review in dataset.records_mut() {
        let Some(name) = review.reviewer_name.as_deref() else {
            stats.absent += 1;
            continue;
        };
        if is_pseudonym(name) {
            stats.already_pseudonymized += 1;
        } else if looks_like_name(name) {
            let alias = pseudonymizer.pseudonym(name, review.reviewer_location.as_deref());
            review.reviewer_name = Some(alias);
            stats.replaced += 1;
        } else {
            stats.not_a_name += 1;
        }
    }
    stats
}

/// Pseudonymize the dataset at `input` and write it to `output`.
///
/// The file keeps its section's header and its record order. `input` and
/// `output` may be the same path; the rewrite goes through a temp file.
///
/// # Arguments
///
/// * `input` - An existing `<section>_reviews.csv`, or any dataset file
///   whose records or header identify its section
/// * `output` - Where to write the result
/// * `pseudonymizer` - Unsalted by default; see [`Pseudonymizer::new`]
///
/// # Returns
///
/// Counts of replaced, already pseudonymized, absent and kept names.
///
/// # Errors
///
/// Returns a [`WriteError`] if `input` is missing or unreadable, its section
/// cannot be determined, or `output` cannot be written.
///
/// # Examples
///
/// ```ignore
/// let path = Path::new("data/airline_reviews.csv");
/// let stats = pseudonymize_file(path, path, &Pseudonymizer::default()).await?;
/// println!("replaced {} names", stats.replaced);
/// ```
#[instrument(level = "info", skip_all, fields(input = %input.display(), output = %output.display()))]
pub async fn pseudonymize_file(
    input: &Path,
    output: &Path,
    pseudonymizer: &Pseudonymizer,
) -> Result<PseudonymizeStats, WriteError> {
    let mut dataset = Dataset::load_any(input).await?;
    let stats = pseudonymize_dataset(&mut dataset, pseudonymizer);
    dataset.save(output).await?;
    info!(
        section = %dataset.section(),
        salted = pseudonymizer.is_salted(),
        records = dataset.len(),
        replaced = stats.replaced,
        already_pseudonymized = stats.already_pseudonymized,
        absent = stats.absent,
        not_a_name = stats.not_a_name,
        "Pseudonymization complete"
    );
    Ok(stats)
}

/// Every `*_reviews.csv` file directly inside `dir`, sorted by name.
pub async fn dataset_files(dir: &Path) -> Result<Vec<PathBuf>, WriteError> {
    let io_err = |source| WriteError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with("_reviews.csv"));
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    if files.is_empty() {
        warn!(dir = %dir.display(), "No *_reviews.csv datasets found");
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Review, Section};
    use crate::outputs::dataset::tests::temp_csv;

    fn review(id: &str, name: Option<&str>, location: Option<&str>) -> Review {
        let mut r = Review::new(id, Section::Airline, format!("body {id}"));
        r.reviewer_name = name.map(str::to_string);
        r.reviewer_location = location.map(str::to_string);
        r
    }

    fn sample() -> Dataset {
        Dataset::from_records(
            Section::Airline,
            [
                review("1", Some("Jane Doe"), Some("United Kingdom")),
                review("2", None, Some("Spain")),
                review("3", Some("jane   doe"), Some("United Kingdom")),
                review("4", Some("Jane Doe"), Some("Canada")),
                review("5", Some("J. D."), None),
                review("6", Some("---"), None),
            ],
        )
    }

    fn unsalted() -> Pseudonymizer {
        Pseudonymizer::default()
    }

    #[test]
    fn test_pseudonym_shape_and_stability() {
        let p = unsalted().pseudonym("Jane Doe", Some("United Kingdom"));
        assert!(is_pseudonym(&p), "{p}");
        assert_eq!(p, unsalted().pseudonym("Jane Doe", Some("United Kingdom")));
        assert_ne!(p, unsalted().pseudonym("Jane Doe", Some("Canada")));
    }

    #[test]
    fn test_salt_changes_mapping_but_stays_stable() {
        let plain = unsalted().pseudonym("Jane Doe", Some("United Kingdom"));
        let salted = Pseudonymizer::new(Some("s3cret"));
        let a = salted.pseudonym("Jane Doe", Some("United Kingdom"));
        assert!(is_pseudonym(&a), "{a}");
        assert_ne!(a, plain);
        assert_eq!(
            a,
            Pseudonymizer::new(Some("s3cret")).pseudonym("jane doe", Some("United  Kingdom"))
        );
        let other = Pseudonymizer::new(Some("other"));
        assert_ne!(a, other.pseudonym("Jane Doe", Some("United Kingdom")));
    }

    #[test]
    fn test_empty_salt_is_unsalted() {
        let empty = Pseudonymizer::new(Some(""));
        assert!(!empty.is_salted());
        assert_eq!(
            empty.pseudonym("Jane Doe", None),
            unsalted().pseudonym("Jane Doe", None)
        );
        assert!(!format!("{:?}", Pseudonymizer::new(Some("s3cret"))).contains("s3cret"));
    }

    #[test]
    fn test_same_reviewer_same_pseudonym() {
        let mut dataset = sample();
        pseudonymize_dataset(&mut dataset, &unsalted());
        let names: Vec<_> = dataset
            .records()
            .iter()
            .map(|r| r.reviewer_name.clone())
            .collect();
        assert_eq!(names[0], names[2]);
        assert_ne!(names[0], names[3]);
        assert_eq!(names[1], None);
        assert!(is_pseudonym(names[4].as_deref().unwrap()));
        assert_eq!(names[5].as_deref(), Some("---"));
    }

    #[test]
    fn test_second_pass_is_noop() {
        let mut once = sample();
        let first = pseudonymize_dataset(&mut once, &unsalted());
        assert_eq!(first.replaced, 4);
        assert_eq!(first.absent, 1);
        assert_eq!(first.not_a_name, 1);

        let mut twice = once.clone();
        let second = pseudonymize_dataset(&mut twice, &unsalted());
        assert_eq!(second.replaced, 0);
        assert_eq!(second.already_pseudonymized, 4);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_other_fields_and_order_untouched() {
        let original = sample();
        let mut dataset = original.clone();
        pseudonymize_dataset(&mut dataset, &unsalted());
        for (before, after) in original.records().iter().zip(dataset.records()) {
            assert_eq!(before.id, after.id);
            assert_eq!(before.body, after.body);
            assert_eq!(before.reviewer_location, after.reviewer_location);
        }
    }

    #[test]
    fn test_looks_like_name() {
        assert!(looks_like_name("Ann"));
        assert!(looks_like_name("Nguyễn Văn An"));
        assert!(!looks_like_name("  "));
        assert!(!looks_like_name("1234"));
        assert!(!looks_like_name("reviewer-0123456789ab"));
    }

    #[tokio::test]
    async fn test_pseudonymize_file_in_place() {
        let path = temp_csv("pseudonymize");
        sample().save(&path).await.unwrap();

        let stats = pseudonymize_file(&path, &path, &unsalted()).await.unwrap();
        assert_eq!(stats.replaced, 4);
        let after_one = std::fs::read(&path).unwrap();

        pseudonymize_file(&path, &path, &unsalted()).await.unwrap();
        let after_two = std::fs::read(&path).unwrap();
        assert_eq!(after_one, after_two);

        let files = dataset_files(path.parent().unwrap()).await.unwrap();
        assert_eq!(files, vec![path.clone()]);
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[tokio::test]
    async fn test_pseudonymize_lounge_file_keeps_its_header() {
        let input = temp_csv("pseudonymize_lounge").with_file_name("lounge_reviews.csv");
        let output = input.with_file_name("lounge_out.csv");
        let mut r = Review::new("1", Section::Lounge, "Busy at 7am.");
        r.reviewer_name = Some("Sam Lee".into());
        r.lounge_name = Some("Galleries South".into());
        Dataset::from_records(Section::Lounge, [r]).save(&input).await.unwrap();

        pseudonymize_file(&input, &output, &Pseudonymizer::new(Some("s3cret")))
            .await
            .unwrap();

        let written = std::fs::read_to_string(&output).unwrap();
        assert!(written.starts_with(&Section::Lounge.columns().join(",")));
        assert!(written.contains("Galleries South"));
        assert!(!written.contains("Sam Lee"));
        std::fs::remove_dir_all(input.parent().unwrap()).ok();
    }
}
