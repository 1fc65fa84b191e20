//! Areal data model
//!
//! Known areas carry an aggregate value (a count or a rate) and the point
//! samples that describe their support, typically population counts located
//! inside the area. Unknown areas carry only point samples; their value is
//! what kriging predicts.

use std::collections::{HashMap, HashSet};
use std::fmt;

use geo_types::MultiPolygon;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identifier of an area.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AreaId(String);

impl AreaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AreaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AreaId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for AreaId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

macro_rules! area_id_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for AreaId {
                fn from(id: $t) -> Self {
                    Self(id.to_string())
                }
            }
        )*
    };
}

area_id_from_int!(u32, u64, usize, i32, i64);

/// A point sample located inside an area.
///
/// The value is the support measure of the point (e.g. the population living
/// at that location), not the variable being kriged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointSample {
    pub x: f64,
    pub y: f64,
    pub value: f64,
}

impl PointSample {
    pub fn new(x: f64, y: f64, value: f64) -> Self {
        Self { x, y, value }
    }

    /// Squared Euclidean distance to another location
    #[inline]
    pub fn dist_sq(&self, other_x: f64, other_y: f64) -> f64 {
        let dx = self.x - other_x;
        let dy = self.y - other_y;
        dx * dx + dy * dy
    }

    /// Euclidean distance to another location
    #[inline]
    pub fn dist(&self, other_x: f64, other_y: f64) -> f64 {
        self.dist_sq(other_x, other_y).sqrt()
    }
}

/// An area with an observed aggregate value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Area {
    pub id: AreaId,
    pub centroid_x: f64,
    pub centroid_y: f64,
    /// Aggregate value: a non-negative count or rate
    pub value: f64,
    /// Boundary as read by the ingestion layer. Never inspected by kriging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<MultiPolygon<f64>>,
}

impl Area {
    pub fn new(id: impl Into<AreaId>, centroid_x: f64, centroid_y: f64, value: f64) -> Self {
        Self {
            id: id.into(),
            centroid_x,
            centroid_y,
            value,
            geometry: None,
        }
    }

    pub fn with_geometry(mut self, geometry: MultiPolygon<f64>) -> Self {
        self.geometry = Some(geometry);
        self
    }
}

/// Borrowed view of one known area together with its support.
#[derive(Debug, Clone, Copy)]
pub struct KnownArea<'a> {
    pub area: &'a Area,
    pub points: &'a [PointSample],
    /// Sum of the point sample values
    pub population: f64,
}

/// The set of known areas and their point samples.
///
/// Areas without any point sample cannot contribute to point-support
/// semivariance or to area-to-area distances; they are dropped at
/// construction and listed by [`KnownAreas::excluded`].
///
/// Serialized as the area table plus each area's points; deserializing goes
/// back through [`KnownAreas::new`] so the same checks apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "KnownAreasRecord", into = "KnownAreasRecord")]
pub struct KnownAreas {
    areas: Vec<Area>,
    points: Vec<Vec<PointSample>>,
    populations: Vec<f64>,
    excluded: Vec<AreaId>,
}

impl KnownAreas {
    /// Associate areas with their point samples.
    ///
    /// Area order is preserved. Points keyed by an id that has no area are
    /// ignored with a warning.
    ///
    /// # Errors
    /// - [`Error::DuplicateArea`] if two areas share an id
    /// - [`Error::InvalidParameter`] for non-finite coordinates or negative values
    pub fn new(
        areas: Vec<Area>,
        points: impl IntoIterator<Item = (AreaId, Vec<PointSample>)>,
    ) -> Result<Self> {
        let mut by_id: HashMap<AreaId, Vec<PointSample>> = HashMap::new();
        for (id, pts) in points {
            by_id.entry(id).or_default().extend(pts);
        }

        let mut seen = HashSet::with_capacity(areas.len());
        let mut kept = Vec::with_capacity(areas.len());
        let mut kept_points = Vec::with_capacity(areas.len());
        let mut excluded = Vec::new();

        for area in areas {
            if !seen.insert(area.id.clone()) {
                return Err(Error::DuplicateArea { area_id: area.id });
            }
            validate_area(&area)?;

            let pts = by_id.remove(&area.id).unwrap_or_default();
            for p in &pts {
                validate_point(&area.id, p)?;
            }

            if pts.is_empty() {
                tracing::warn!(area_id = %area.id, "area has no point samples; excluded");
                excluded.push(area.id);
                continue;
            }

            kept.push(area);
            kept_points.push(pts);
        }

        let mut orphans: Vec<AreaId> = by_id.into_keys().collect();
        orphans.sort();
        for id in orphans {
            tracing::warn!(area_id = %id, "point samples reference an unknown area; ignored");
        }

        let populations = kept_points
            .iter()
            .map(|pts| pts.iter().map(|p| p.value).sum())
            .collect();

        Ok(Self {
            areas: kept,
            points: kept_points,
            populations,
            excluded,
        })
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// Areas dropped because they had no point samples.
    pub fn excluded(&self) -> &[AreaId] {
        &self.excluded
    }

    pub fn get(&self, index: usize) -> Option<KnownArea<'_>> {
        let area = self.areas.get(index)?;
        Some(KnownArea {
            area,
            points: &self.points[index],
            population: self.populations[index],
        })
    }

    pub fn index_of(&self, id: &AreaId) -> Option<usize> {
        self.areas.iter().position(|a| &a.id == id)
    }

    /// Sum of the point values of an area, if it is known.
    pub fn population(&self, id: &AreaId) -> Option<f64> {
        self.index_of(id).map(|i| self.populations[i])
    }

    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    pub fn iter(&self) -> impl Iterator<Item = KnownArea<'_>> + '_ {
        self.areas
            .iter()
            .zip(self.points.iter())
            .zip(self.populations.iter())
            .map(|((area, points), &population)| KnownArea {
                area,
                points,
                population,
            })
    }

    /// Population-weighted mean of the area values (m*).
    ///
    /// Falls back to the plain mean when the total population is zero.
    pub fn mean_rate(&self) -> f64 {
        population_weighted_mean(self.iter().map(|a| (a.area.value, a.population)))
    }

    /// Population variance of the area values.
    pub fn value_variance(&self) -> f64 {
        let n = self.areas.len();
        if n == 0 {
            return 0.0;
        }
        let mean = self.areas.iter().map(|a| a.value).sum::<f64>() / n as f64;
        self.areas
            .iter()
            .map(|a| (a.value - mean) * (a.value - mean))
            .sum::<f64>()
            / n as f64
    }

    /// A copy of this set without the given area.
    pub fn without(&self, id: &AreaId) -> Self {
        let mut out = self.clone();
        if let Some(idx) = out.index_of(id) {
            out.areas.remove(idx);
            out.points.remove(idx);
            out.populations.remove(idx);
        }
        out
    }
}

/// Points of one area in the serialized form of [`KnownAreas`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AreaSupport {
    id: AreaId,
    points: Vec<PointSample>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KnownAreasRecord {
    areas: Vec<Area>,
    points: Vec<AreaSupport>,
    #[serde(default)]
    excluded: Vec<AreaId>,
}

impl From<KnownAreas> for KnownAreasRecord {
    fn from(known: KnownAreas) -> Self {
        let points = known
            .areas
            .iter()
            .zip(known.points)
            .map(|(area, points)| AreaSupport {
                id: area.id.clone(),
                points,
            })
            .collect();
        Self {
            areas: known.areas,
            points,
            excluded: known.excluded,
        }
    }
}

impl TryFrom<KnownAreasRecord> for KnownAreas {
    type Error = Error;

    fn try_from(record: KnownAreasRecord) -> Result<Self> {
        let mut known = KnownAreas::new(
            record.areas,
            record.points.into_iter().map(|s| (s.id, s.points)),
        )?;
        for id in record.excluded {
            if known.index_of(&id).is_none() && !known.excluded.contains(&id) {
                known.excluded.push(id);
            }
        }
        Ok(known)
    }
}

/// Population-weighted mean of `(value, population)` pairs.
pub fn population_weighted_mean(items: impl Iterator<Item = (f64, f64)>) -> f64 {
    let mut weighted = 0.0;
    let mut total = 0.0;
    let mut plain = 0.0;
    let mut n = 0usize;
    for (value, population) in items {
        weighted += value * population;
        total += population;
        plain += value;
        n += 1;
    }
    if total > 0.0 {
        weighted / total
    } else if n > 0 {
        plain / n as f64
    } else {
        0.0
    }
}

/// An area whose value is to be predicted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnknownArea {
    pub id: AreaId,
    pub centroid_x: f64,
    pub centroid_y: f64,
    pub points: Vec<PointSample>,
}

impl UnknownArea {
    /// Build an unknown area whose centroid is the mean of its point coordinates.
    ///
    /// # Errors
    /// [`Error::EmptyArea`] if `points` is empty.
    pub fn new(id: impl Into<AreaId>, points: Vec<PointSample>) -> Result<Self> {
        let id = id.into();
        if points.is_empty() {
            return Err(Error::EmptyArea { area_id: id });
        }
        for p in &points {
            validate_point(&id, p)?;
        }
        let n = points.len() as f64;
        let centroid_x = points.iter().map(|p| p.x).sum::<f64>() / n;
        let centroid_y = points.iter().map(|p| p.y).sum::<f64>() / n;
        Ok(Self {
            id,
            centroid_x,
            centroid_y,
            points,
        })
    }

    /// Replace the derived centroid, e.g. with the polygon centroid.
    pub fn with_centroid(mut self, x: f64, y: f64) -> Self {
        self.centroid_x = x;
        self.centroid_y = y;
        self
    }

    pub fn population(&self) -> f64 {
        self.points.iter().map(|p| p.value).sum()
    }
}

fn validate_area(area: &Area) -> Result<()> {
    if !area.centroid_x.is_finite() || !area.centroid_y.is_finite() {
        return Err(Error::invalid(
            "centroid",
            format!("({}, {}) in area {}", area.centroid_x, area.centroid_y, area.id),
            "centroid coordinates must be finite",
        ));
    }
    if !area.value.is_finite() || area.value < 0.0 {
        return Err(Error::invalid(
            "area_value",
            format!("{} in area {}", area.value, area.id),
            "area value must be a finite, non-negative count or rate",
        ));
    }
    Ok(())
}

fn validate_point(id: &AreaId, p: &PointSample) -> Result<()> {
    if !p.x.is_finite() || !p.y.is_finite() || !p.value.is_finite() || p.value < 0.0 {
        return Err(Error::invalid(
            "point_sample",
            format!("({}, {}, {}) in area {}", p.x, p.y, p.value, id),
            "point coordinates must be finite and values non-negative",
        ));
    }
    Ok(())
}
