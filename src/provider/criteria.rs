//! Search criteria shared by every provider query.
//!
//! [`BoundingBox`] and [`SearchCriteria`] validate on construction, so a value
//! that exists is always well formed: min < max on both axes, coordinates in
//! range, and a start date that does not follow the end date.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use thiserror::Error;

/// Date formats accepted for criteria dates, tried in order.
const DATE_FORMATS: [&str; 2] = ["%Y%m%d", "%Y-%m-%d"];

/// Errors raised while building search criteria.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CriteriaError {
    /// The bounding box is malformed.
    #[error("invalid bounding box: {reason}")]
    InvalidBoundingBox {
        /// What is wrong with the box.
        reason: String,
    },

    /// A date string could not be parsed.
    #[error("invalid date '{value}': expected YYYYMMDD or YYYY-MM-DD")]
    InvalidDate {
        /// The rejected input.
        value: String,
    },

    /// Start date is after end date.
    #[error("start date {start} is after end date {end}")]
    InvertedDateRange {
        /// Requested start date.
        start: NaiveDate,
        /// Requested end date.
        end: NaiveDate,
    },

    /// Product type string is empty.
    #[error("product type must not be empty")]
    EmptyProductType,
}

/// A longitude/latitude pair in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// Longitude in degrees.
    pub lon: f64,
    /// Latitude in degrees.
    pub lat: f64,
}

/// An axis-aligned geographic bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    min_lon: f64,
    min_lat: f64,
    max_lon: f64,
    max_lat: f64,
}

impl BoundingBox {
    /// Creates a bounding box from `(min_lon, min_lat, max_lon, max_lat)`.
    ///
    /// # Errors
    ///
    /// Returns [`CriteriaError::InvalidBoundingBox`] if any value is not finite,
    /// out of range, or if min is not strictly below max on either axis.
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self, CriteriaError> {
        let values = [min_lon, min_lat, max_lon, max_lat];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(invalid_bbox("coordinates must be finite numbers"));
        }
        if !(-180.0..=180.0).contains(&min_lon) || !(-180.0..=180.0).contains(&max_lon) {
            return Err(invalid_bbox("longitude must be within [-180, 180]"));
        }
        if !(-90.0..=90.0).contains(&min_lat) || !(-90.0..=90.0).contains(&max_lat) {
            return Err(invalid_bbox("latitude must be within [-90, 90]"));
        }
        if min_lon >= max_lon {
            return Err(invalid_bbox(&format!(
                "min longitude {min_lon} must be less than max longitude {max_lon}"
            )));
        }
        if min_lat >= max_lat {
            return Err(invalid_bbox(&format!(
                "min latitude {min_lat} must be less than max latitude {max_lat}"
            )));
        }
        Ok(Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        })
    }

    /// Creates a bounding box from a `[min_lon, min_lat, max_lon, max_lat]` array.
    ///
    /// # Errors
    ///
    /// Same as [`BoundingBox::new`].
    pub fn from_array(values: [f64; 4]) -> Result<Self, CriteriaError> {
        Self::new(values[0], values[1], values[2], values[3])
    }

    /// Minimum longitude.
    #[must_use]
    pub fn min_lon(&self) -> f64 {
        self.min_lon
    }

    /// Minimum latitude.
    #[must_use]
    pub fn min_lat(&self) -> f64 {
        self.min_lat
    }

    /// Maximum longitude.
    #[must_use]
    pub fn max_lon(&self) -> f64 {
        self.max_lon
    }

    /// Maximum latitude.
    #[must_use]
    pub fn max_lat(&self) -> f64 {
        self.max_lat
    }

    /// Returns the box as `[min_lon, min_lat, max_lon, max_lat]`.
    #[must_use]
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }

    /// Lower-left corner.
    #[must_use]
    pub fn lower_left(&self) -> Point {
        Point {
            lon: self.min_lon,
            lat: self.min_lat,
        }
    }

    /// Upper-right corner.
    #[must_use]
    pub fn upper_right(&self) -> Point {
        Point {
            lon: self.max_lon,
            lat: self.max_lat,
        }
    }

    /// The four corners in counter-clockwise order starting at lower-left.
    #[must_use]
    pub fn corners(&self) -> [Point; 4] {
        [
            self.lower_left(),
            Point {
                lon: self.max_lon,
                lat: self.min_lat,
            },
            self.upper_right(),
            Point {
                lon: self.min_lon,
                lat: self.max_lat,
            },
        ]
    }

    /// Well-known-text polygon spanning the box.
    ///
    /// The ring lists the four corners counter-clockwise and closes on the
    /// first one, e.g. `POLYGON((23.5 37.7,24 37.7,24 38.2,23.5 38.2,23.5 37.7))`.
    #[must_use]
    pub fn to_wkt_polygon(&self) -> String {
        let corners = self.corners();
        let ring: Vec<String> = corners
            .iter()
            .chain(std::iter::once(&corners[0]))
            .map(|p| format!("{} {}", p.lon, p.lat))
            .collect();
        format!("POLYGON(({}))", ring.join(","))
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

impl FromStr for BoundingBox {
    type Err = CriteriaError;

    /// Parses `MINLON,MINLAT,MAXLON,MAXLAT`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(invalid_bbox(&format!(
                "expected 4 comma-separated values, got {}",
                parts.len()
            )));
        }
        let mut values = [0.0_f64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse::<f64>()
                .map_err(|_| invalid_bbox(&format!("'{part}' is not a number")))?;
        }
        Self::from_array(values)
    }
}

fn invalid_bbox(reason: &str) -> CriteriaError {
    CriteriaError::InvalidBoundingBox {
        reason: reason.to_string(),
    }
}

/// Parses a criteria date in `YYYYMMDD` or `YYYY-MM-DD` form.
///
/// # Errors
///
/// Returns [`CriteriaError::InvalidDate`] when neither format matches.
pub fn parse_date(value: &str) -> Result<NaiveDate, CriteriaError> {
    let trimmed = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| CriteriaError::InvalidDate {
            value: value.to_string(),
        })
}

/// A fully validated provider query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCriteria {
    product_type: String,
    bbox: BoundingBox,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

impl SearchCriteria {
    /// Creates criteria from already-parsed parts.
    ///
    /// # Errors
    ///
    /// Returns [`CriteriaError::EmptyProductType`] for a blank product type and
    /// [`CriteriaError::InvertedDateRange`] when `start_date > end_date`.
    pub fn new(
        product_type: impl Into<String>,
        bbox: BoundingBox,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Self, CriteriaError> {
        let product_type = product_type.into().trim().to_string();
        if product_type.is_empty() {
            return Err(CriteriaError::EmptyProductType);
        }
        if start_date > end_date {
            return Err(CriteriaError::InvertedDateRange {
                start: start_date,
                end: end_date,
            });
        }
        Ok(Self {
            product_type,
            bbox,
            start_date,
            end_date,
        })
    }

    /// Creates criteria from date strings in `YYYYMMDD` or `YYYY-MM-DD` form.
    ///
    /// # Errors
    ///
    /// Returns any [`CriteriaError`] raised by date parsing or [`SearchCriteria::new`].
    pub fn parse(
        product_type: impl Into<String>,
        bbox: BoundingBox,
        start_date: &str,
        end_date: &str,
    ) -> Result<Self, CriteriaError> {
        Self::new(product_type, bbox, parse_date(start_date)?, parse_date(end_date)?)
    }

    /// Returns the same search for a different product type.
    #[must_use]
    pub fn for_product_type(&self, product_type: impl Into<String>) -> Self {
        Self {
            product_type: product_type.into(),
            ..self.clone()
        }
    }

    /// Product type identifier, e.g. `S2MSI1C`.
    #[must_use]
    pub fn product_type(&self) -> &str {
        &self.product_type
    }

    /// Area of interest.
    #[must_use]
    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// First acquisition date of interest.
    #[must_use]
    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    /// Last acquisition date of interest.
    #[must_use]
    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }
}
