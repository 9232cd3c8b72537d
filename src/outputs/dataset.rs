//! CSV dataset persistence.
//!
//! A dataset file holds the reviews of one [`Section`], one per row, under the
//! fixed header of [`Section::columns`]. Files are never appended to: each run
//! loads the previous file, merges new records into it and rewrites it whole.
//!
//! # Merge rule
//!
//! Records are keyed by `id` and the first record seen for a key wins. Records
//! already on disk therefore beat re-scraped ones, and within a batch the
//! earlier record beats the later one.
//!
//! # Crash behaviour
//!
//! [`Dataset::save`] writes to `<file>.tmp` and renames it over the target, so
//! the file on disk is always the output of the last successful save.

use crate::error::WriteError;
use crate::models::{Review, Section};
use crate::utils::sibling_temp_path;
use itertools::Itertools;
use std::collections::HashSet;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Outcome of one [`Dataset::merge`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub added: usize,
    pub duplicates: usize,
}

/// Ordered, id-unique collection of the reviews of one section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    section: Section,
    records: Vec<Review>,
    ids: HashSet<String>,
}

/// Header and rows of a dataset file, or `None` when there is no file.
async fn read_file(path: &Path) -> Result<Option<(csv::StringRecord, Vec<Review>)>, WriteError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(WriteError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let csv_err = |source| WriteError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    let header = reader.headers().map_err(csv_err)?.clone();
    let records = reader
        .deserialize::<Review>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(csv_err)?;
    Ok(Some((header, records)))
}

impl Dataset {
    pub fn new(section: Section) -> Self {
        Self {
            section,
            ..Self::default()
        }
    }

    /// Build a dataset, dropping every record whose id was already seen.
    pub fn from_records(section: Section, records: impl IntoIterator<Item = Review>) -> Self {
        let records: Vec<Review> = records
            .into_iter()
            .unique_by(|r| r.id.clone())
            .collect();
        let ids = records.iter().map(|r| r.id.clone()).collect();
        Self {
            section,
            records,
            ids,
        }
    }

    pub fn section(&self) -> Section {
        self.section
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn records(&self) -> &[Review] {
        &self.records
    }

    /// Mutable access for in-place edits of non-key fields.
    pub fn records_mut(&mut self) -> &mut [Review] {
        &mut self.records
    }

    /// Add the records whose id is not present yet.
    ///
    /// Records are taken in order; a record whose id is already in the
    /// dataset, or appeared earlier in `incoming`, is dropped. Existing
    /// records are never replaced or reordered.
    ///
    /// # Arguments
    ///
    /// * `incoming` - Freshly scraped reviews, in page order
    ///
    /// # Returns
    ///
    /// How many records were added and how many were dropped as duplicates.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let mut dataset = Dataset::from_records(Section::Airline, [Review::new("1", Section::Airline, "old")]);
    /// let stats = dataset.merge([Review::new("1", Section::Airline, "new"), Review::new("2", Section::Airline, "b")]);
    /// assert_eq!(stats, MergeStats { added: 1, duplicates: 1 });
    /// assert_eq!(dataset.records()[0].body, "old");
    /// ```
    pub fn merge(&mut self, incoming: impl IntoIterator<Item = Review>) -> MergeStats {
        let mut stats = MergeStats::default();
        for review in incoming {
            if self.contains(&review.id) {
                debug!(id = %review.id, "Duplicate review id; keeping the first one");
                stats.duplicates += 1;
            } else {
                self.ids.insert(review.id.clone());
                self.records.push(review);
                stats.added += 1;
            }
        }
        stats
    }

    /// Read the `section` dataset at `path`. A missing file is an empty dataset.
    #[instrument(level = "info", skip_all, fields(path = %path.display(), %section))]
    pub async fn load(path: &Path, section: Section) -> Result<Self, WriteError> {
        let Some((_, records)) = read_file(path).await? else {
            info!("No existing dataset; starting empty");
            return Ok(Self::new(section));
        };
        let foreign = records.iter().filter(|r| r.section != section).count();
        if foreign > 0 {
            warn!(foreign, "Dataset holds records of another section");
        }
        let dataset = Self::from_records(section, records);
        info!(records = dataset.len(), "Loaded dataset");
        Ok(dataset)
    }

    /// Read a dataset file of unknown section.
    ///
    /// The section is taken from the file name (`<section>_reviews.csv`),
    /// then from the records, then from a header matching one section's
    /// columns. The file must exist.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load_any(path: &Path) -> Result<Self, WriteError> {
        let Some((header, records)) = read_file(path).await? else {
            return Err(WriteError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        };
        let section = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(Section::from_dataset_file_name)
            .or_else(|| records.first().map(|r| r.section))
            .or_else(|| {
                Section::ALL
                    .into_iter()
                    .find(|s| header.iter().eq(s.columns().iter().copied()))
            })
            .ok_or_else(|| WriteError::UnknownSection {
                path: path.to_path_buf(),
            })?;
        let dataset = Self::from_records(section, records);
        info!(%section, records = dataset.len(), "Loaded dataset");
        Ok(dataset)
    }

    /// Serialize to CSV under the section's header, even when there are no
    /// rows. Absent values are empty cells.
    pub fn to_csv(&self) -> Result<Vec<u8>, csv::Error> {
        let columns = self.section.columns();
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(columns)?;
        for review in &self.records {
            writer.write_record(
                columns
                    .iter()
                    .map(|column| review.cell(column).unwrap_or_default()),
            )?;
        }
        writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))
    }

    /// Replace the file at `path` with this dataset.
    ///
    /// The CSV is written to `<path>.tmp` next to the target and renamed over
    /// it, so a crash mid-write leaves the previous file intact. Missing
    /// parent directories are created.
    ///
    /// # Errors
    ///
    /// [`WriteError::Csv`] if a record cannot be serialized, [`WriteError::Io`]
    /// if the directory, temp file or rename fails.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn save(&self, path: &Path) -> Result<(), WriteError> {
        let csv = self.to_csv().map_err(|source| WriteError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

        let io_err = |source| WriteError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let tmp = sibling_temp_path(path);
        fs::write(&tmp, csv).await.map_err(io_err)?;
        fs::rename(&tmp, path).await.map_err(io_err)?;

        info!(records = self.len(), "Wrote dataset");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    pub(crate) fn temp_csv(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "airline_reviews_{}_{}",
            name,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("airline_reviews.csv")
    }

    fn review(id: &str, body: &str) -> Review {
        Review::new(id, Section::Airline, body)
    }

    fn airline(records: impl IntoIterator<Item = Review>) -> Dataset {
        Dataset::from_records(Section::Airline, records)
    }

    #[test]
    fn test_first_write_wins_against_persisted() {
        let mut dataset = airline([review("1", "original")]);
        let stats = dataset.merge([review("1", "edited later"), review("2", "new")]);
        assert_eq!(stats, MergeStats { added: 1, duplicates: 1 });
        assert_eq!(dataset.records()[0].body, "original");
        assert_eq!(dataset.len(), 2);
    }

    #[test]
    fn test_first_write_wins_within_batch() {
        let mut dataset = Dataset::new(Section::Airline);
        let stats = dataset.merge([review("7", "first"), review("7", "second")]);
        assert_eq!(stats.added, 1);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(dataset.records()[0].body, "first");
    }

    #[test]
    fn test_from_records_dedups() {
        let dataset = airline([review("a", "x"), review("b", "y"), review("a", "z")]);
        assert_eq!(dataset.len(), 2);
        assert!(dataset.contains("a"));
        assert_eq!(dataset.records()[0].body, "x");
    }

    #[test]
    fn test_header_matches_section_columns() {
        for section in Section::ALL {
            let dataset = Dataset::from_records(section, [Review::new("1", section, "body")]);
            let csv = String::from_utf8(dataset.to_csv().unwrap()).unwrap();
            let header = csv.lines().next().unwrap();
            assert_eq!(header, section.columns().join(","), "{section}");
        }
    }

    #[test]
    fn test_empty_dataset_still_has_header() {
        let csv = String::from_utf8(Dataset::new(Section::Seat).to_csv().unwrap()).unwrap();
        assert_eq!(csv.trim_end(), Section::Seat.columns().join(","));
    }

    #[tokio::test]
    async fn test_save_and_load_keeps_absent_fields_absent() {
        let path = temp_csv("roundtrip");
        let mut full = review("1", "Body, with a comma and \"quotes\"\nand a newline");
        full.date = NaiveDate::from_ymd_opt(2024, 5, 1);
        full.rating = Some(9);
        full.recommended = Some(false);
        full.reviewer_name = Some("Jane Doe".into());
        full.seat_comfort = Some(4);
        let sparse = review("2", "just a body");

        let dataset = airline([full.clone(), sparse.clone()]);
        dataset.save(&path).await.unwrap();
        assert!(!sibling_temp_path(&path).exists());

        let loaded = Dataset::load(&path, Section::Airline).await.unwrap();
        assert_eq!(loaded.records(), &[full, sparse]);
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[tokio::test]
    async fn test_lounge_dataset_keeps_lounge_columns() {
        let path = temp_csv("lounge").with_file_name("lounge_reviews.csv");
        let mut r = Review::new("9", Section::Lounge, "Quiet and clean.");
        r.lounge_name = Some("Galleries First".into());
        r.airport = Some("London Heathrow".into());
        r.cleanliness = Some(2);
        r.wifi_and_connectivity = Some(5);

        Dataset::from_records(Section::Lounge, [r.clone()])
            .save(&path)
            .await
            .unwrap();
        let csv = std::fs::read_to_string(&path).unwrap();
        assert!(csv.starts_with(&Section::Lounge.columns().join(",")));
        assert!(!csv.contains("seat_comfort"));

        let loaded = Dataset::load_any(&path).await.unwrap();
        assert_eq!(loaded.section(), Section::Lounge);
        assert_eq!(loaded.records(), &[r]);
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[tokio::test]
    async fn test_load_any_detects_section_from_header() {
        let path = temp_csv("detect").with_file_name("exported.csv");
        Dataset::new(Section::Seat).save(&path).await.unwrap();

        let loaded = Dataset::load_any(&path).await.unwrap();
        assert_eq!(loaded.section(), Section::Seat);
        assert!(loaded.is_empty());

        std::fs::write(&path, "id,body\n").unwrap();
        let err = Dataset::load_any(&path).await.unwrap_err();
        assert!(matches!(err, WriteError::UnknownSection { .. }));
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let loaded = Dataset::load(Path::new("/nonexistent/dir/reviews.csv"), Section::Airline)
            .await
            .unwrap();
        assert!(loaded.is_empty());
        assert!(Dataset::load_any(Path::new("/nonexistent/dir/reviews.csv")).await.is_err());
    }

    #[tokio::test]
    async fn test_load_rejects_garbage() {
        let path = temp_csv("garbage");
        std::fs::write(&path, "id,section\n1,not-a-section\n").unwrap();
        let err = Dataset::load(&path, Section::Airline).await.unwrap_err();
        assert!(matches!(err, WriteError::Csv { .. }));
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
