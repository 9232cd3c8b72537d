//! Data models for scraped reviews and listing pages.
//!
//! - [`Review`]: one parsed customer review, also the CSV row schema
//! - [`Section`]: which review listing of the site a record came from
//! - [`FieldValue`]: a coerced value on its way into a [`Review`] column
//! - [`Pagination`]: page-count hints read off a listing page
//! - [`Page`]: the reviews and hints parsed from one listing page
//!
//! Each section has its own fixed column list ([`Section::columns`]), which is
//! the header of its dataset file. Downstream notebooks read those files by
//! column name, so renaming or reordering columns is a breaking change.

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Valid range of the overall score shown on a review.
pub const OVERALL_RATING_RANGE: std::ops::RangeInclusive<u8> = 1..=10;

/// Valid range of the per-category star ratings.
pub const STAR_RATING_RANGE: std::ops::RangeInclusive<u8> = 1..=5;

/// The review listings published for each airline.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    #[default]
    Airline,
    Seat,
    Lounge,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Airline, Section::Seat, Section::Lounge];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Airline => "airline",
            Section::Seat => "seat",
            Section::Lounge => "lounge",
        }
    }

    /// File name of the dataset this section is written to.
    pub fn dataset_file_name(&self) -> String {
        format!("{}_reviews.csv", self.as_str())
    }

    /// Section whose dataset file is called `name`, if any.
    pub fn from_dataset_file_name(name: &str) -> Option<Section> {
        Section::ALL
            .into_iter()
            .find(|s| s.dataset_file_name() == name)
    }

    /// Header of this section's dataset file.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Section::Airline => AIRLINE_COLUMNS,
            Section::Seat => SEAT_COLUMNS,
            Section::Lounge => LOUNGE_COLUMNS,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Columns of `airline_reviews.csv`, in order.
pub const AIRLINE_COLUMNS: &[&str] = &[
    "id",
    "section",
    "date",
    "title",
    "body",
    "verified",
    "rating",
    "reviewer_name",
    "reviewer_location",
    "aircraft",
    "traveller_type",
    "seat_type",
    "route",
    "date_flown",
    "recommended",
    "seat_comfort",
    "cabin_staff_service",
    "food_and_beverages",
    "inflight_entertainment",
    "ground_service",
    "wifi_and_connectivity",
    "value_for_money",
];

/// Columns of `seat_reviews.csv`, in order.
pub const SEAT_COLUMNS: &[&str] = &[
    "id",
    "section",
    "date",
    "title",
    "body",
    "verified",
    "rating",
    "reviewer_name",
    "reviewer_location",
    "aircraft",
    "seat_layout",
    "cabin_flown",
    "traveller_type",
    "date_flown",
    "recommended",
    "seat_legroom",
    "seat_recline",
    "seat_width",
    "aisle_space",
    "viewing_tv_screen",
    "power_supply",
    "seat_storage",
    "sleep_comfort",
    "seat_privacy",
];

/// Columns of `lounge_reviews.csv`, in order.
pub const LOUNGE_COLUMNS: &[&str] = &[
    "id",
    "section",
    "date",
    "title",
    "body",
    "verified",
    "rating",
    "reviewer_name",
    "reviewer_location",
    "lounge_name",
    "airport",
    "lounge_type",
    "traveller_type",
    "date_visit",
    "recommended",
    "comfort",
    "cleanliness",
    "bar_and_beverages",
    "catering",
    "washrooms",
    "wifi_and_connectivity",
    "staff_service",
];

/// A coerced field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Date(NaiveDate),
    Score(u8),
    Flag(bool),
}

/// One customer review as scraped from a listing page.
///
/// The struct carries the columns of every section; a dataset file only
/// stores the ones listed in [`Section::columns`] for its section. Every field
/// except `id`, `section` and `body` is optional and stored as an empty cell
/// when the page did not carry it. Nothing is defaulted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    /// Site-assigned review number, or a content hash when the page has none.
    pub id: String,
    pub section: Section,
    /// Publication date of the review.
    pub date: Option<NaiveDate>,
    pub title: Option<String>,
    /// Review text. Never empty.
    pub body: String,
    /// Whether the site marked the trip as verified.
    pub verified: Option<bool>,
    /// Overall score, 1 to 10.
    pub rating: Option<u8>,
    pub reviewer_name: Option<String>,
    pub reviewer_location: Option<String>,
    pub traveller_type: Option<String>,
    pub recommended: Option<bool>,

    // airline
    pub aircraft: Option<String>,
    pub seat_type: Option<String>,
    pub route: Option<String>,
    /// Month of travel as printed, e.g. `May 2024`.
    pub date_flown: Option<String>,
    pub seat_comfort: Option<u8>,
    pub cabin_staff_service: Option<u8>,
    pub food_and_beverages: Option<u8>,
    pub inflight_entertainment: Option<u8>,
    pub ground_service: Option<u8>,
    pub wifi_and_connectivity: Option<u8>,
    pub value_for_money: Option<u8>,

    // seat
    pub seat_layout: Option<String>,
    pub cabin_flown: Option<String>,
    pub seat_legroom: Option<u8>,
    pub seat_recline: Option<u8>,
    pub seat_width: Option<u8>,
    pub aisle_space: Option<u8>,
    pub viewing_tv_screen: Option<u8>,
    pub power_supply: Option<u8>,
    pub seat_storage: Option<u8>,
    pub sleep_comfort: Option<u8>,
    pub seat_privacy: Option<u8>,

    // lounge
    pub lounge_name: Option<String>,
    pub airport: Option<String>,
    pub lounge_type: Option<String>,
    /// Month of the visit as printed.
    pub date_visit: Option<String>,
    pub comfort: Option<u8>,
    pub cleanliness: Option<u8>,
    pub bar_and_beverages: Option<u8>,
    pub catering: Option<u8>,
    pub washrooms: Option<u8>,
    pub staff_service: Option<u8>,
}

impl Review {
    /// A record carrying only the required fields.
    pub fn new(id: impl Into<String>, section: Section, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            section,
            body: body.into(),
            ..Self::default()
        }
    }

    /// Store `value` in `column`.
    ///
    /// Returns `false`, leaving the record unchanged, when there is no such
    /// column or it holds a different kind of value.
    pub fn set(&mut self, column: &str, value: FieldValue) -> bool {
        match value {
            FieldValue::Text(text) => {
                if column == "body" {
                    self.body = text;
                    return true;
                }
                let slot = match column {
                    "title" => &mut self.title,
                    "reviewer_name" => &mut self.reviewer_name,
                    "reviewer_location" => &mut self.reviewer_location,
                    "traveller_type" => &mut self.traveller_type,
                    "aircraft" => &mut self.aircraft,
                    "seat_type" => &mut self.seat_type,
                    "route" => &mut self.route,
                    "date_flown" => &mut self.date_flown,
                    "seat_layout" => &mut self.seat_layout,
                    "cabin_flown" => &mut self.cabin_flown,
                    "lounge_name" => &mut self.lounge_name,
                    "airport" => &mut self.airport,
                    "lounge_type" => &mut self.lounge_type,
                    "date_visit" => &mut self.date_visit,
                    _ => return false,
                };
                *slot = Some(text);
            }
            FieldValue::Score(score) => {
                let slot = match column {
                    "rating" => &mut self.rating,
                    "seat_comfort" => &mut self.seat_comfort,
                    "cabin_staff_service" => &mut self.cabin_staff_service,
                    "food_and_beverages" => &mut self.food_and_beverages,
                    "inflight_entertainment" => &mut self.inflight_entertainment,
                    "ground_service" => &mut self.ground_service,
                    "wifi_and_connectivity" => &mut self.wifi_and_connectivity,
                    "value_for_money" => &mut self.value_for_money,
                    "seat_legroom" => &mut self.seat_legroom,
                    "seat_recline" => &mut self.seat_recline,
                    "seat_width" => &mut self.seat_width,
                    "aisle_space" => &mut self.aisle_space,
                    "viewing_tv_screen" => &mut self.viewing_tv_screen,
                    "power_supply" => &mut self.power_supply,
                    "seat_storage" => &mut self.seat_storage,
                    "sleep_comfort" => &mut self.sleep_comfort,
                    "seat_privacy" => &mut self.seat_privacy,
                    "comfort" => &mut self.comfort,
                    "cleanliness" => &mut self.cleanliness,
                    "bar_and_beverages" => &mut self.bar_and_beverages,
                    "catering" => &mut self.catering,
                    "washrooms" => &mut self.washrooms,
                    "staff_service" => &mut self.staff_service,
                    _ => return false,
                };
                *slot = Some(score);
            }
            FieldValue::Flag(flag) => {
                let slot = match column {
                    "verified" => &mut self.verified,
                    "recommended" => &mut self.recommended,
                    _ => return false,
                };
                *slot = Some(flag);
            }
            FieldValue::Date(date) => {
                if column != "date" {
                    return false;
                }
                self.date = Some(date);
            }
        }
        true
    }

    /// CSV cell of `column`, formatted the way serde writes the field.
    ///
    /// `None` for an absent value or an unknown column.
    pub fn cell(&self, column: &str) -> Option<String> {
        let text = |v: &Option<String>| v.clone();
        let score = |v: Option<u8>| v.map(|n| n.to_string());
        let flag = |v: Option<bool>| v.map(|b| b.to_string());
        match column {
            "id" => Some(self.id.clone()),
            "section" => Some(self.section.to_string()),
            "date" => self.date.map(|d| d.to_string()),
            "title" => text(&self.title),
            "body" => Some(self.body.clone()),
            "verified" => flag(self.verified),
            "rating" => score(self.rating),
            "reviewer_name" => text(&self.reviewer_name),
            "reviewer_location" => text(&self.reviewer_location),
            "traveller_type" => text(&self.traveller_type),
            "recommended" => flag(self.recommended),
            "aircraft" => text(&self.aircraft),
            "seat_type" => text(&self.seat_type),
            "route" => text(&self.route),
            "date_flown" => text(&self.date_flown),
            "seat_comfort" => score(self.seat_comfort),
            "cabin_staff_service" => score(self.cabin_staff_service),
            "food_and_beverages" => score(self.food_and_beverages),
            "inflight_entertainment" => score(self.inflight_entertainment),
            "ground_service" => score(self.ground_service),
            "wifi_and_connectivity" => score(self.wifi_and_connectivity),
            "value_for_money" => score(self.value_for_money),
            "seat_layout" => text(&self.seat_layout),
            "cabin_flown" => text(&self.cabin_flown),
            "seat_legroom" => score(self.seat_legroom),
            "seat_recline" => score(self.seat_recline),
            "seat_width" => score(self.seat_width),
            "aisle_space" => score(self.aisle_space),
            "viewing_tv_screen" => score(self.viewing_tv_screen),
            "power_supply" => score(self.power_supply),
            "seat_storage" => score(self.seat_storage),
            "sleep_comfort" => score(self.sleep_comfort),
            "seat_privacy" => score(self.seat_privacy),
            "lounge_name" => text(&self.lounge_name),
            "airport" => text(&self.airport),
            "lounge_type" => text(&self.lounge_type),
            "date_visit" => text(&self.date_visit),
            "comfort" => score(self.comfort),
            "cleanliness" => score(self.cleanliness),
            "bar_and_beverages" => score(self.bar_and_beverages),
            "catering" => score(self.catering),
            "washrooms" => score(self.washrooms),
            "staff_service" => score(self.staff_service),
            _ => None,
        }
    }
}

/// Page-count hints found on a listing page.
///
/// Either may be missing when the site changes its markup; the crawler then
/// falls back to stopping on the first empty page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pagination {
    /// Highest page number linked from the pagination bar.
    pub total_pages: Option<u32>,
    /// Total number of reviews from the `1 to 100 of N Reviews` banner.
    pub total_reviews: Option<u32>,
}

impl Pagination {
    /// Number of pages to crawl, preferring the explicit page count.
    pub fn page_count(&self, page_size: u32) -> Option<u32> {
        self.total_pages.or_else(|| {
            self.total_reviews
                .filter(|_| page_size > 0)
                .map(|total| total.div_ceil(page_size))
        })
    }
}

/// One parsed listing page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// 1-based page number.
    pub index: u32,
    pub pagination: Pagination,
    /// Review fragments found in the markup, valid or not.
    pub fragments: usize,
    pub reviews: Vec<Review>,
    /// Fragments dropped because they could not be parsed.
    pub skipped: usize,
}

impl Page {
    pub fn is_empty(&self) -> bool {
        self.fragments == 0
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_file_names() {
        assert_eq!(Section::Airline.dataset_file_name(), "airline_reviews.csv");
        assert_eq!(Section::Seat.dataset_file_name(), "seat_reviews.csv");
        assert_eq!(Section::Lounge.dataset_file_name(), "lounge_reviews.csv");
        assert_eq!(
            Section::from_dataset_file_name("lounge_reviews.csv"),
            Some(Section::Lounge)
        );
        assert_eq!(Section::from_dataset_file_name("reviews.csv"), None);
    }

    #[test]
    fn test_new_review_has_no_optional_fields() {
        let review = Review::new("123", Section::Airline, "Great flight");
        assert_eq!(review.body, "Great flight");
        assert!(review.rating.is_none());
        assert!(review.reviewer_name.is_none());
        assert!(review.recommended.is_none());
        assert!(review.lounge_name.is_none());
    }

    #[test]
    fn test_every_section_column_is_a_review_field() {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.serialize(Review::default()).unwrap();
        let csv = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let fields: Vec<&str> = csv.lines().next().unwrap().split(',').collect();
        for section in Section::ALL {
            for column in section.columns() {
                assert!(fields.contains(column), "{section}: {column}");
            }
        }
    }

    #[test]
    fn test_section_columns_share_the_leading_block() {
        for section in Section::ALL {
            assert_eq!(&section.columns()[..9], &AIRLINE_COLUMNS[..9]);
        }
    }

    #[test]
    fn test_set_checks_column_kind() {
        let mut review = Review::new("1", Section::Lounge, "body");
        assert!(review.set("cleanliness", FieldValue::Score(2)));
        assert!(review.set("lounge_name", FieldValue::Text("Galleries First".into())));
        assert!(!review.set("cleanliness", FieldValue::Text("two".into())));
        assert!(!review.set("no_such_column", FieldValue::Score(1)));
        assert_eq!(review.cleanliness, Some(2));
        assert_eq!(review.cell("cleanliness").as_deref(), Some("2"));
        assert_eq!(review.cell("lounge_name").as_deref(), Some("Galleries First"));
        assert_eq!(review.cell("airport"), None);
    }

    #[test]
    fn test_page_count_prefers_explicit_total_pages() {
        let p = Pagination {
            total_pages: Some(4),
            total_reviews: Some(1000),
        };
        assert_eq!(p.page_count(100), Some(4));
    }

    #[test]
    fn test_page_count_from_review_total() {
        let p = Pagination {
            total_pages: None,
            total_reviews: Some(3923),
        };
        assert_eq!(p.page_count(100), Some(40));
        assert_eq!(p.page_count(0), None);
        assert_eq!(Pagination::default().page_count(100), None);
    }
}
