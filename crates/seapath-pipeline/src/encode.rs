//! Port-visit encoding: one vessel's position history to a compressed
//! sequence of canonical port visits.
//!
//! Each report is first classified as stopped or moving. Stopped reports
//! are attributed to the nearest registered port when it lies within the
//! arrival threshold. The per-row port labels are then collapsed into
//! runs, each run becoming one [`Visit`]. Symbols are plain ordinals
//! handed out in order of first appearance, so a vessel may visit any
//! number of distinct ports.

use std::collections::HashMap;

use h3o::CellIndex;
use rayon::prelude::*;

use crate::spatial_index::{IndexLevels, Nearest, SpatialIndex};
use crate::types::{ExtractionConfig, GeoPoint, PipelineError, PortCode, PortRecord, PositionRecord};

/// Every registered port plus the index used to attribute stops.
#[derive(Debug)]
pub struct PortRegistry {
    index: SpatialIndex<PortRecord>,
    by_code: HashMap<PortCode, usize>,
}

impl PortRegistry {
    /// Build a registry over `ports`.
    ///
    /// When a raw code appears more than once, the first record wins for
    /// code lookups; every record still participates in nearest-port
    /// queries.
    ///
    /// # Errors
    ///
    /// Propagates [`SpatialIndex::new`] errors: an empty registry, an
    /// invalid port coordinate, or an invalid resolution.
    pub fn new(ports: Vec<PortRecord>, levels: &IndexLevels) -> Result<Self, PipelineError> {
        let mut by_code = HashMap::with_capacity(ports.len());
        for (i, port) in ports.iter().enumerate() {
            by_code.entry(port.code.clone()).or_insert(i);
        }
        let features = ports
            .into_iter()
            .map(|port| {
                let position = port.position;
                (port, position)
            })
            .collect();
        let index = SpatialIndex::new(features, levels)?;
        Ok(Self { index, by_code })
    }

    /// Number of registered ports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Always `false`: construction rejects empty registries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Look up a port by raw code.
    #[must_use]
    pub fn get(&self, code: &PortCode) -> Option<&PortRecord> {
        self.by_code.get(code).and_then(|&i| self.index.feature(i))
    }

    /// Canonical code for a raw code, if the raw code is registered.
    #[must_use]
    pub fn canonical(&self, code: &PortCode) -> Option<&PortCode> {
        self.get(code).map(PortRecord::canonical)
    }

    /// Location of a port by raw code.
    #[must_use]
    pub fn position(&self, code: &PortCode) -> Option<GeoPoint> {
        self.get(code).map(|p| p.position)
    }

    /// Nearest registered port to `point`.
    #[must_use]
    pub fn nearest(&self, point: GeoPoint, hint: Option<CellIndex>) -> Nearest<'_, PortRecord> {
        self.index.nearest_with_hint(point, hint)
    }
}

/// Whether a report counts as stopped: stationary status at or below
/// the stopped-speed threshold.
#[must_use]
pub fn is_stopped(record: &PositionRecord, config: &ExtractionConfig) -> bool {
    record.nav_status.is_stationary() && record.speed <= config.stopped_speed_knots
}

/// Canonical port a report is attributed to, if any.
///
/// Moving reports and stopped reports further than the arrival threshold
/// from every port yield `None`.
#[must_use]
pub fn port_label(
    record: &PositionRecord,
    registry: &PortRegistry,
    config: &ExtractionConfig,
) -> Option<PortCode> {
    if !is_stopped(record, config) || !record.position.is_valid() {
        return None;
    }
    let hint = record.cell.and_then(|raw| CellIndex::try_from(raw).ok());
    let nearest = registry.nearest(record.position, hint);
    (nearest.distance_km <= config.arrival_threshold_nm * crate::types::KM_PER_NAUTICAL_MILE)
        .then(|| nearest.feature.canonical().clone())
}

/// Port labels for every row of `records`, computed in parallel.
#[must_use]
pub fn label_ports(
    records: &[PositionRecord],
    registry: &PortRegistry,
    config: &ExtractionConfig,
) -> Vec<Option<PortCode>> {
    records
        .par_iter()
        .map(|r| port_label(r, registry, config))
        .collect()
}

/// Ordinal assigned to a canonical port within one vessel's sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(pub u32);

/// One element of an encoded sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visit {
    /// A run of reports attributed to one port.
    Port(Symbol),
    /// A data gap that no journey may span.
    Break,
}

/// Encoded port visits of one vessel.
///
/// `row_positions[i]` is the first row of visit `i` within the vessel's
/// slice of the position table and `departure_rows[i]` the last row of
/// the same run. For a [`Visit::Break`] both are the row where the gap
/// was detected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VesselPortSequence {
    visits: Vec<Visit>,
    row_positions: Vec<usize>,
    departure_rows: Vec<usize>,
    port_map: HashMap<PortCode, Symbol>,
    ports: Vec<PortCode>,
}

impl VesselPortSequence {
    /// The sequence of a vessel with no qualifying stop.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the vessel has no port visit at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.visits.is_empty()
    }

    /// Number of visits, breaks included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.visits.len()
    }

    /// The visits in order.
    #[must_use]
    pub fn visits(&self) -> &[Visit] {
        &self.visits
    }

    /// First row of each visit within the vessel's slice.
    #[must_use]
    pub fn row_positions(&self) -> &[usize] {
        &self.row_positions
    }

    /// Last row of each visit within the vessel's slice.
    #[must_use]
    pub fn departure_rows(&self) -> &[usize] {
        &self.departure_rows
    }

    /// Symbol of a canonical port, if the vessel visited it.
    #[must_use]
    pub fn symbol(&self, port: &PortCode) -> Option<Symbol> {
        self.port_map.get(port).copied()
    }

    /// Canonical port behind a symbol.
    #[must_use]
    pub fn port(&self, symbol: Symbol) -> Option<&PortCode> {
        self.ports.get(symbol.0 as usize)
    }

    /// Number of distinct ports visited.
    #[must_use]
    pub fn distinct_ports(&self) -> usize {
        self.ports.len()
    }

    /// Human-readable form, e.g. `"NLRTM-DEHAM|CNSHA"` where `|` marks a
    /// journey break.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, visit) in self.visits.iter().enumerate() {
            match visit {
                Visit::Port(s) => {
                    if i > 0 && self.visits[i - 1] != Visit::Break {
                        out.push('-');
                    }
                    if let Some(code) = self.port(*s) {
                        out.push_str(code.as_str());
                    }
                }
                Visit::Break => out.push('|'),
            }
        }
        out
    }

    fn symbol_for(&mut self, port: &PortCode) -> Symbol {
        if let Some(&s) = self.port_map.get(port) {
            return s;
        }
        #[allow(clippy::cast_possible_truncation)]
        let s = Symbol(self.ports.len() as u32);
        self.port_map.insert(port.clone(), s);
        self.ports.push(port.clone());
        s
    }

    fn push(&mut self, visit: Visit, row: usize) {
        self.visits.push(visit);
        self.row_positions.push(row);
        self.departure_rows.push(row);
    }
}

/// Collapse consecutive equal items into one.
///
/// Idempotent: collapsing an already collapsed sequence returns it
/// unchanged.
#[must_use]
pub fn collapse_runs<T: PartialEq + Clone>(items: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if out.last() != Some(item) {
            out.push(item.clone());
        }
    }
    out
}

/// Encode one vessel's history.
///
/// `records` must belong to a single vessel and be sorted ascending by
/// timestamp. `labels` holds the port label of each row (see
/// [`label_ports`]). Rows without a port are skipped; they neither start
/// nor end a run. A journey break is recorded before a row whose
/// `journey_break` flag is set, or whose gap to the previous row exceeds
/// `config.max_report_gap_hours`.
///
/// # Errors
///
/// Returns [`PipelineError::LengthMismatch`] if `labels` does not line up
/// with `records`, [`PipelineError::MixedVessels`] if more than one
/// vessel is present, and [`PipelineError::UnsortedHistory`] if
/// timestamps go backwards.
pub fn encode_vessel(
    records: &[PositionRecord],
    labels: &[Option<PortCode>],
    config: &ExtractionConfig,
) -> Result<VesselPortSequence, PipelineError> {
    if labels.len() != records.len() {
        return Err(PipelineError::LengthMismatch {
            expected: records.len(),
            found: labels.len(),
        });
    }
    let Some(first) = records.first() else {
        return Ok(VesselPortSequence::empty());
    };

    #[allow(clippy::cast_possible_truncation)]
    let max_gap = config
        .max_report_gap_hours
        .map(|h| chrono::Duration::milliseconds((h * 3_600_000.0).round() as i64));

    let mut seq = VesselPortSequence::empty();
    for (row, (record, label)) in records.iter().zip(labels).enumerate() {
        if record.vessel_id != first.vessel_id {
            return Err(PipelineError::MixedVessels {
                expected: first.vessel_id,
                found: record.vessel_id,
            });
        }
        if row > 0 {
            let gap = record.timestamp - records[row - 1].timestamp;
            if gap < chrono::Duration::zero() {
                return Err(PipelineError::UnsortedHistory {
                    vessel: record.vessel_id,
                    row,
                });
            }
            let gap_break = max_gap.is_some_and(|max| gap > max);
            if (record.journey_break || gap_break)
                && seq.visits.last().is_some_and(|v| *v != Visit::Break)
            {
                seq.push(Visit::Break, row);
            }
        }

        let Some(port) = label else {
            continue;
        };
        let visit = Visit::Port(seq.symbol_for(port));
        if seq.visits.last() == Some(&visit) {
            if let Some(last) = seq.departure_rows.last_mut() {
                *last = row;
            }
        } else {
            seq.push(visit, row);
        }
    }

    if seq.visits.last() == Some(&Visit::Break) {
        seq.visits.pop();
        seq.row_positions.pop();
        seq.departure_rows.pop();
    }
    Ok(seq)
}
