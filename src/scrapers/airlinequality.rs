//! Review parser for [AirlineQuality](https://www.airlinequality.com) listing pages.
//!
//! Every review on a listing page is an `article.list-item` fragment. Fields
//! are read through declarative tables evaluated the same way for every
//! fragment:
//!
//! - [`FIELD_RULES`]: a CSS selector inside the fragment, whether to read the
//!   element text or an attribute, and a coercion into a [`FieldValue`]
//! - [`detail_rules`]: rows of the `table.review-ratings` block, matched by
//!   their header label. Each section has its own table, since the site asks
//!   different questions about flights, seats and lounges
//!
//! A rule that finds nothing, or whose coercion rejects the raw text, leaves
//! the field absent. When several field rules target one column the first
//! one that yields a value wins. A fragment without body text is rejected
//! with [`ParseError::MissingBody`]; the rest of the page is unaffected.

use crate::error::ParseError;
use crate::models::{
    FieldValue, OVERALL_RATING_RANGE, Page, Pagination, Review, STAR_RATING_RANGE, Section,
};
use crate::utils::truncate_for_log;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Where a rule reads its raw text from.
#[derive(Debug, Clone, Copy)]
pub enum Source {
    /// Concatenated text of the element and its descendants.
    Text,
    /// Value of the named attribute.
    Attr(&'static str),
}

/// Extraction rule for one column.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub column: &'static str,
    pub selector: &'static str,
    pub source: Source,
    pub coerce: fn(&str) -> Option<FieldValue>,
}

/// Extraction rule for one row of the ratings table.
#[derive(Debug, Clone, Copy)]
pub struct DetailRule {
    /// Header label as shown on the site, compared case-insensitively.
    pub label: &'static str,
    pub column: &'static str,
    pub coerce: fn(&str) -> Option<FieldValue>,
}

pub const FRAGMENT_SELECTOR: &str = "article.list-item";

pub const FIELD_RULES: &[FieldRule] = &[
    FieldRule {
        column: "date",
        selector: "time[itemprop=datePublished]",
        source: Source::Attr("datetime"),
        coerce: coerce_date,
    },
    FieldRule {
        column: "title",
        selector: "h2.text_header",
        source: Source::Text,
        coerce: coerce_title,
    },
    FieldRule {
        column: "body",
        selector: "div[itemprop=reviewBody]",
        source: Source::Text,
        coerce: coerce_text,
    },
    FieldRule {
        column: "verified",
        selector: "div[itemprop=reviewBody]",
        source: Source::Text,
        coerce: coerce_verified,
    },
    FieldRule {
        column: "rating",
        selector: "span[itemprop=ratingValue]",
        source: Source::Text,
        coerce: coerce_overall_rating,
    },
    // Older markup has no ratingValue span, only "7/10" in the wrapper.
    FieldRule {
        column: "rating",
        selector: "div.rating-10",
        source: Source::Text,
        coerce: coerce_rating_fraction,
    },
    FieldRule {
        column: "reviewer_name",
        selector: "h3.userStatusWrapper span[itemprop=name]",
        source: Source::Text,
        coerce: coerce_text,
    },
    FieldRule {
        column: "reviewer_location",
        selector: "h3.userStatusWrapper",
        source: Source::Text,
        coerce: coerce_location,
    },
];

pub const AIRLINE_DETAIL_RULES: &[DetailRule] = &[
    DetailRule { label: "Aircraft", column: "aircraft", coerce: coerce_text },
    DetailRule { label: "Type Of Traveller", column: "traveller_type", coerce: coerce_text },
    DetailRule { label: "Seat Type", column: "seat_type", coerce: coerce_text },
    DetailRule { label: "Route", column: "route", coerce: coerce_text },
    DetailRule { label: "Date Flown", column: "date_flown", coerce: coerce_text },
    DetailRule { label: "Recommended", column: "recommended", coerce: coerce_yes_no },
    DetailRule { label: "Seat Comfort", column: "seat_comfort", coerce: coerce_stars },
    DetailRule { label: "Cabin Staff Service", column: "cabin_staff_service", coerce: coerce_stars },
    DetailRule { label: "Food & Beverages", column: "food_and_beverages", coerce: coerce_stars },
    DetailRule { label: "Inflight Entertainment", column: "inflight_entertainment", coerce: coerce_stars },
    DetailRule { label: "Ground Service", column: "ground_service", coerce: coerce_stars },
    DetailRule { label: "Wifi & Connectivity", column: "wifi_and_connectivity", coerce: coerce_stars },
    DetailRule { label: "Value For Money", column: "value_for_money", coerce: coerce_stars },
];

pub const SEAT_DETAIL_RULES: &[DetailRule] = &[
    DetailRule { label: "Aircraft Type", column: "aircraft", coerce: coerce_text },
    DetailRule { label: "Aircraft", column: "aircraft", coerce: coerce_text },
    DetailRule { label: "Seat Layout", column: "seat_layout", coerce: coerce_text },
    DetailRule { label: "Cabin Flown", column: "cabin_flown", coerce: coerce_text },
    DetailRule { label: "Type Of Traveller", column: "traveller_type", coerce: coerce_text },
    DetailRule { label: "Date Flown", column: "date_flown", coerce: coerce_text },
    DetailRule { label: "Recommended", column: "recommended", coerce: coerce_yes_no },
    DetailRule { label: "Seat Legroom", column: "seat_legroom", coerce: coerce_stars },
    DetailRule { label: "Seat Recline", column: "seat_recline", coerce: coerce_stars },
    DetailRule { label: "Seat Width", column: "seat_width", coerce: coerce_stars },
    DetailRule { label: "Aisle Space", column: "aisle_space", coerce: coerce_stars },
    DetailRule { label: "Viewing Tv Screen", column: "viewing_tv_screen", coerce: coerce_stars },
    DetailRule { label: "Power Supply", column: "power_supply", coerce: coerce_stars },
    DetailRule { label: "Seat Storage", column: "seat_storage", coerce: coerce_stars },
    DetailRule { label: "Sleep Comfort", column: "sleep_comfort", coerce: coerce_stars },
    DetailRule { label: "Seat Privacy", column: "seat_privacy", coerce: coerce_stars },
];

pub const LOUNGE_DETAIL_RULES: &[DetailRule] = &[
    DetailRule { label: "Lounge Name", column: "lounge_name", coerce: coerce_text },
    DetailRule { label: "Airport", column: "airport", coerce: coerce_text },
    DetailRule { label: "Type Of Lounge", column: "lounge_type", coerce: coerce_text },
    DetailRule { label: "Type Of Traveller", column: "traveller_type", coerce: coerce_text },
    DetailRule { label: "Date Visit", column: "date_visit", coerce: coerce_text },
    DetailRule { label: "Recommended", column: "recommended", coerce: coerce_yes_no },
    DetailRule { label: "Comfort", column: "comfort", coerce: coerce_stars },
    DetailRule { label: "Cleanliness", column: "cleanliness", coerce: coerce_stars },
    DetailRule { label: "Bar & Beverages", column: "bar_and_beverages", coerce: coerce_stars },
    DetailRule { label: "Catering", column: "catering", coerce: coerce_stars },
    DetailRule { label: "Washrooms", column: "washrooms", coerce: coerce_stars },
    DetailRule { label: "Wifi & Connectivity", column: "wifi_and_connectivity", coerce: coerce_stars },
    DetailRule { label: "Staff Service", column: "staff_service", coerce: coerce_stars },
];

/// Ratings-table rules of `section`. Every rule writes one of that section's
/// [`Section::columns`].
pub fn detail_rules(section: Section) -> &'static [DetailRule] {
    match section {
        Section::Airline => AIRLINE_DETAIL_RULES,
        Section::Seat => SEAT_DETAIL_RULES,
        Section::Lounge => LOUNGE_DETAIL_RULES,
    }
}

static LOCATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([^()]+)\)").expect("location regex"));
static TOTAL_REVIEWS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)of\s+([\d,]+)\s+reviews").expect("total regex"));
static REVIEW_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:review-|anchor)?(\d+)$").expect("id regex"));

fn coerce_text(raw: &str) -> Option<FieldValue> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| FieldValue::Text(trimmed.to_string()))
}

fn coerce_title(raw: &str) -> Option<FieldValue> {
    let trimmed = raw.trim().trim_matches(|c: char| c == '"' || c == '“' || c == '”').trim();
    coerce_text(trimmed)
}

fn coerce_date(raw: &str) -> Option<FieldValue> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .map(FieldValue::Date)
}

fn coerce_location(raw: &str) -> Option<FieldValue> {
    LOCATION_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .and_then(|m| coerce_text(m.as_str()))
}

/// `raw` as a whole integer inside `range`. Decimals, units or any other
/// trailing text make the value absent.
fn bounded_score(raw: &str, range: &std::ops::RangeInclusive<u8>) -> Option<FieldValue> {
    raw.trim()
        .parse::<u8>()
        .ok()
        .filter(|v| range.contains(v))
        .map(FieldValue::Score)
}

fn coerce_overall_rating(raw: &str) -> Option<FieldValue> {
    bounded_score(raw, &OVERALL_RATING_RANGE)
}

/// Numerator of a `7/10` style score.
fn coerce_rating_fraction(raw: &str) -> Option<FieldValue> {
    let (numerator, _) = raw.split_once('/')?;
    coerce_overall_rating(numerator)
}

fn coerce_stars(raw: &str) -> Option<FieldValue> {
    bounded_score(raw, &STAR_RATING_RANGE)
}

fn coerce_yes_no(raw: &str) -> Option<FieldValue> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "yes" => Some(FieldValue::Flag(true)),
        "no" => Some(FieldValue::Flag(false)),
        _ => None,
    }
}

/// Reads the `Trip Verified |` marker the site prefixes review bodies with.
fn coerce_verified(raw: &str) -> Option<FieldValue> {
    let (marker, _) = raw.split_once('|')?;
    let marker = marker
        .trim()
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .to_ascii_lowercase();
    match marker.as_str() {
        "trip verified" | "verified review" => Some(FieldValue::Flag(true)),
        "not verified" => Some(FieldValue::Flag(false)),
        _ => None,
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

fn parse_selector(selector: &str) -> Result<Selector, ParseError> {
    Selector::parse(selector).map_err(|_| ParseError::InvalidSelector {
        selector: selector.to_string(),
    })
}

/// Compiled selectors for one run.
#[derive(Debug)]
pub struct ReviewParser {
    fragment: Selector,
    fields: Vec<(FieldRule, Selector)>,
    detail_rows: Selector,
    detail_header: Selector,
    detail_value: Selector,
    filled_star: Selector,
    pagination_items: Selector,
    pagination_total: Selector,
}

impl ReviewParser {
    pub fn new() -> Result<Self, ParseError> {
        let fields = FIELD_RULES
            .iter()
            .map(|rule| parse_selector(rule.selector).map(|selector| (*rule, selector)))
            .collect::<Result<Vec<_>, ParseError>>()?;
        Ok(Self {
            fragment: parse_selector(FRAGMENT_SELECTOR)?,
            fields,
            detail_rows: parse_selector("table.review-ratings tr")?,
            detail_header: parse_selector("td.review-rating-header")?,
            detail_value: parse_selector("td.review-value, td.review-rating-stars")?,
            filled_star: parse_selector("span.star.fill")?,
            pagination_items: parse_selector("article.comp_reviews-pagination li")?,
            pagination_total: parse_selector("div.pagination-total")?,
        })
    }

    /// Parse every review fragment of a document, lazily.
    ///
    /// Each item is independent: an error for one fragment says nothing about
    /// the others.
    pub fn parse_reviews<'a>(
        &'a self,
        document: &'a Html,
        section: Section,
    ) -> impl Iterator<Item = Result<Review, ParseError>> + 'a {
        document
            .select(&self.fragment)
            .enumerate()
            .map(move |(i, fragment)| self.parse_fragment(fragment, i, section))
    }

    /// Page-count hints from the pagination bar and the review total banner.
    pub fn parse_pagination(&self, document: &Html) -> Pagination {
        let total_pages = document
            .select(&self.pagination_items)
            .filter_map(|li| element_text(li).trim().parse::<u32>().ok())
            .max();
        let total_reviews = document
            .select(&self.pagination_total)
            .next()
            .map(element_text)
            .and_then(|text| {
                TOTAL_REVIEWS_RE
                    .captures(&text)
                    .and_then(|c| c.get(1))
                    .and_then(|m| m.as_str().replace(',', "").parse::<u32>().ok())
            });
        Pagination {
            total_pages,
            total_reviews,
        }
    }

    /// Parse a whole listing page, logging and counting rejected fragments.
    pub fn parse_page(&self, html: &str, index: u32, section: Section) -> Page {
        let document = Html::parse_document(html);
        let pagination = self.parse_pagination(&document);

        let mut page = Page {
            index,
            pagination,
            ..Page::default()
        };
        for result in self.parse_reviews(&document, section) {
            page.fragments += 1;
            match result {
                Ok(review) => page.reviews.push(review),
                Err(e) => {
                    page.skipped += 1;
                    warn!(page = index, %section, error = %e, "Skipping review fragment");
                }
            }
        }

        info!(
            page = index,
            %section,
            fragments = page.fragments,
            parsed = page.reviews.len(),
            skipped = page.skipped,
            "Parsed listing page"
        );
        page
    }

    fn parse_fragment(
        &self,
        fragment: ElementRef<'_>,
        index: usize,
        section: Section,
    ) -> Result<Review, ParseError> {
        let mut fields: BTreeMap<&'static str, FieldValue> = BTreeMap::new();

        for (rule, selector) in &self.fields {
            if fields.contains_key(rule.column) {
                continue;
            }
            let Some(element) = fragment.select(selector).next() else {
                continue;
            };
            let raw = match rule.source {
                Source::Text => Some(element_text(element)),
                Source::Attr(name) => element.value().attr(name).map(str::to_string),
            };
            if let Some(value) = raw.as_deref().and_then(rule.coerce) {
                fields.insert(rule.column, value);
            }
        }

        for row in fragment.select(&self.detail_rows) {
            let (Some(header), Some(value)) = (
                row.select(&self.detail_header).next(),
                row.select(&self.detail_value).next(),
            ) else {
                continue;
            };
            let label = element_text(header);
            let label = label.trim();
            let Some(rule) = detail_rules(section)
                .iter()
                .find(|r| r.label.eq_ignore_ascii_case(label))
            else {
                debug!(label, %section, "Ignoring unknown review detail");
                continue;
            };

            let is_stars = value.value().has_class(
                "review-rating-stars",
                scraper::CaseSensitivity::AsciiCaseInsensitive,
            );
            let mut raw = element_text(value);
            if is_stars || raw.trim() == "12345" {
                raw = value.select(&self.filled_star).count().to_string();
            }
            if let Some(v) = (rule.coerce)(&raw) {
                fields.insert(rule.column, v);
            }
        }

        let Some(FieldValue::Text(body)) = fields.remove("body") else {
            debug!(
                fragment = index,
                html = %truncate_for_log(&fragment.html(), 200),
                "Fragment without body"
            );
            return Err(ParseError::MissingBody { fragment: index });
        };

        let id = fragment_id(fragment).unwrap_or_else(|| derived_id(&fields, &body));
        Ok(assemble(id, section, body, fields))
    }
}

/// The site's own review number, from the `review-NNN` class or the id attribute.
fn fragment_id(fragment: ElementRef<'_>) -> Option<String> {
    let element = fragment.value();
    element
        .classes()
        .chain(element.id())
        .find_map(|token| REVIEW_ID_RE.captures(token))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Content-derived identifier for fragments the site did not number.
fn derived_id(fields: &BTreeMap<&'static str, FieldValue>, body: &str) -> String {
    let date = match fields.get("date") {
        Some(FieldValue::Date(d)) => d.to_string(),
        _ => String::new(),
    };
    let name = match fields.get("reviewer_name") {
        Some(FieldValue::Text(n)) => n.as_str(),
        _ => "",
    };
    let mut hasher = blake3::Hasher::new();
    hasher.update(date.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(name.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(body.as_bytes());
    let hash = hasher.finalize();
    format!("h{}", &hex::encode(hash.as_bytes())[..16])
}

fn assemble(
    id: String,
    section: Section,
    body: String,
    fields: BTreeMap<&'static str, FieldValue>,
) -> Review {
    let mut review = Review::new(id, section, body);
    for (column, value) in fields {
        if !review.set(column, value) {
            debug!(column, "Rule value does not fit its column; dropped");
        }
    }
    review
}
