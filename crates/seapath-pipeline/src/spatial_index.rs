//! Multi-resolution nearest-feature index over geographic points.
//!
//! Features are bucketed by H3 cell at each configured resolution. A
//! query walks the levels from finest to coarsest, collecting features
//! whose cell lies within a fixed ring around the query's cell, and
//! stops at the first level that yields any candidate. The nearest
//! candidate by haversine distance wins.
//!
//! Bucketing is an approximation: the true nearest feature may sit just
//! outside the ring at the level that produced candidates. That trade-off
//! is accepted for throughput.
//!
//! When every level misses, the query falls back to the full reference
//! set through an R\*-tree over unit-sphere coordinates, so every query
//! returns a feature.

use std::collections::HashMap;
use std::fmt;

use h3o::{CellIndex, LatLng, Resolution};
use rstar::RTree;
use rstar::primitives::GeomWithData;
use serde::{Deserialize, Serialize};

use crate::types::{GeoPoint, PipelineError};

/// Which H3 resolutions to index and how far to expand around a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexLevels {
    /// H3 resolutions (0..=15). Order does not matter; queries always
    /// run finest first.
    pub resolutions: Vec<u8>,

    /// Neighbourhood ring (grid distance) searched around the query
    /// cell at every level. `0` means the query cell only.
    pub ring: u32,
}

impl IndexLevels {
    /// Levels used for the port registry.
    #[must_use]
    pub fn ports() -> Self {
        Self {
            resolutions: vec![3, 5],
            ring: 2,
        }
    }

    /// Levels used for ocean network nodes.
    #[must_use]
    pub fn ocean_nodes() -> Self {
        Self {
            resolutions: vec![1, 2, 3, 4],
            ring: 0,
        }
    }

    /// Check every resolution is a valid H3 resolution.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidResolution`] for the first
    /// resolution above 15.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for &r in &self.resolutions {
            Resolution::try_from(r).map_err(|_| PipelineError::InvalidResolution(r))?;
        }
        Ok(())
    }
}

impl Default for IndexLevels {
    fn default() -> Self {
        Self::ports()
    }
}

/// One grid level: features bucketed by their cell at `resolution`.
#[derive(Debug)]
struct GridLevel {
    resolution: Resolution,
    resolution_id: u8,
    cells: HashMap<CellIndex, Vec<usize>>,
}

/// Unit-sphere position tagged with its feature index.
type FallbackEntry = GeomWithData<[f64; 3], usize>;

/// Result of a nearest-feature query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nearest<'a, T> {
    /// Position of the feature in the reference set.
    pub index: usize,
    /// The feature itself.
    pub feature: &'a T,
    /// Where the feature is.
    pub location: GeoPoint,
    /// Haversine distance from the query point in kilometres.
    pub distance_km: f64,
    /// Resolution of the level that answered, or `None` when the full
    /// reference set fallback answered.
    pub resolution: Option<u8>,
}

/// Nearest-feature index over a fixed, non-empty reference set.
pub struct SpatialIndex<T> {
    features: Vec<T>,
    locations: Vec<GeoPoint>,
    /// Finest resolution first.
    levels: Vec<GridLevel>,
    ring: u32,
    fallback: RTree<FallbackEntry>,
}

impl<T> fmt::Debug for SpatialIndex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("len", &self.features.len())
            .field("resolutions", &self.resolutions().collect::<Vec<_>>())
            .field("ring", &self.ring)
            .finish_non_exhaustive()
    }
}

impl<T> SpatialIndex<T> {
    /// Build an index over `features`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyReferenceSet`] if `features` is
    /// empty, [`PipelineError::InvalidCoordinate`] if any location is not
    /// a valid coordinate, and [`PipelineError::InvalidResolution`] for a
    /// bad resolution in `levels`.
    pub fn new(features: Vec<(T, GeoPoint)>, levels: &IndexLevels) -> Result<Self, PipelineError> {
        if features.is_empty() {
            return Err(PipelineError::EmptyReferenceSet);
        }

        let mut resolution_ids = levels.resolutions.clone();
        resolution_ids.sort_unstable();
        resolution_ids.dedup();
        resolution_ids.reverse();

        let mut grid_levels = resolution_ids
            .into_iter()
            .map(|id| {
                Resolution::try_from(id)
                    .map(|resolution| GridLevel {
                        resolution,
                        resolution_id: id,
                        cells: HashMap::new(),
                    })
                    .map_err(|_| PipelineError::InvalidResolution(id))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (features, locations): (Vec<T>, Vec<GeoPoint>) = features.into_iter().unzip();

        for (i, location) in locations.iter().enumerate() {
            let latlng = to_latlng(*location)?;
            for level in &mut grid_levels {
                level
                    .cells
                    .entry(latlng.to_cell(level.resolution))
                    .or_default()
                    .push(i);
            }
        }

        let fallback = RTree::bulk_load(
            locations
                .iter()
                .enumerate()
                .map(|(i, p)| GeomWithData::new(p.unit_vector(), i))
                .collect(),
        );

        Ok(Self {
            features,
            locations,
            levels: grid_levels,
            ring: levels.ring,
            fallback,
        })
    }

    /// Number of features in the reference set (always at least one).
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Always `false`: construction rejects empty reference sets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// The feature at `index`, if any.
    #[must_use]
    pub fn feature(&self, index: usize) -> Option<&T> {
        self.features.get(index)
    }

    /// The location of the feature at `index`, if any.
    #[must_use]
    pub fn location(&self, index: usize) -> Option<GeoPoint> {
        self.locations.get(index).copied()
    }

    /// Indexed resolutions, finest first.
    pub fn resolutions(&self) -> impl Iterator<Item = u8> + '_ {
        self.levels.iter().map(|l| l.resolution_id)
    }

    /// Nearest feature to `point`.
    ///
    /// A non-finite `point` answers with the first feature at a NaN
    /// distance.
    #[must_use]
    pub fn nearest(&self, point: GeoPoint) -> Nearest<'_, T> {
        self.nearest_with_hint(point, None)
    }

    /// Nearest feature to `point`, reusing a precomputed cell of the
    /// point where its resolution matches a level.
    #[must_use]
    pub fn nearest_with_hint(&self, point: GeoPoint, hint: Option<CellIndex>) -> Nearest<'_, T> {
        if let Ok(latlng) = LatLng::new(point.lat, point.lon) {
            for level in &self.levels {
                let cell = match hint {
                    Some(c) if c.resolution() == level.resolution => c,
                    _ => latlng.to_cell(level.resolution),
                };
                let disk: Vec<CellIndex> = cell.grid_disk(self.ring);
                let best = disk
                    .iter()
                    .filter_map(|c| level.cells.get(c))
                    .flatten()
                    .map(|&i| (i, self.locations[i].distance_km(point)))
                    .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
                if let Some((index, distance_km)) = best {
                    return self.hit(index, distance_km, Some(level.resolution_id));
                }
            }
        }

        // The R*-tree has no nearest neighbour for a non-finite point.
        if !(point.lat.is_finite() && point.lon.is_finite()) {
            return self.hit(0, f64::NAN, None);
        }
        let index = self
            .fallback
            .nearest_neighbor(&point.unit_vector())
            .map_or(0, |entry| entry.data);
        self.hit(index, self.locations[index].distance_km(point), None)
    }

    fn hit(&self, index: usize, distance_km: f64, resolution: Option<u8>) -> Nearest<'_, T> {
        Nearest {
            index,
            feature: &self.features[index],
            location: self.locations[index],
            distance_km,
            resolution,
        }
    }
}

fn to_latlng(p: GeoPoint) -> Result<LatLng, PipelineError> {
    if !p.is_valid() {
        return Err(PipelineError::InvalidCoordinate {
            lat: p.lat,
            lon: p.lon,
        });
    }
    LatLng::new(p.lat, p.lon).map_err(|_| PipelineError::InvalidCoordinate {
        lat: p.lat,
        lon: p.lon,
    })
}
