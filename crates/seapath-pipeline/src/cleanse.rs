//! Port-sequence cleansing.
//!
//! Every candidate route of an OD pair is reduced to its port sequence,
//! the canonical ports it stopped at in order with runs collapsed, e.g.
//! `CNSHA-SGSIN-NLRTM`. Sequences observed often enough are trusted
//! templates. Rare sequences are compared against the templates of the
//! same OD and kept only if their duration is plausible, with some extra
//! slack for sequences that are textually close to a template. Routes
//! whose sequence stays untrusted are dropped, and the survivors get an
//! OD-wide route id in order of departure.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;
use tracing::debug;

use crate::assembly::JourneyObservation;
use crate::encode::collapse_runs;
use crate::types::{PipelineError, VesselId};

/// Separator between ports in a rendered sequence.
pub const SEQUENCE_SEPARATOR: &str = "-";

/// Parameters of port-sequence cleansing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanseConfig {
    /// A sequence observed at least this many times is a template.
    pub template_min_count: usize,

    /// Minimum similarity (0 to 100) for the relaxed duration rule.
    pub similarity_threshold: f64,

    /// Multiple of the template's 95th-percentile duration allowed under
    /// the relaxed rule.
    pub outlier_factor: f64,
}

impl CleanseConfig {
    /// Default template count.
    pub const DEFAULT_TEMPLATE_MIN_COUNT: usize = 2;
    /// Default similarity threshold.
    pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 85.0;
    /// Default outlier factor.
    pub const DEFAULT_OUTLIER_FACTOR: f64 = 1.25;

    /// Check that all parameters are usable.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.template_min_count == 0 {
            return Err(PipelineError::InvalidConfig(
                "template_min_count must be at least 1".to_owned(),
            ));
        }
        if !(0.0..=100.0).contains(&self.similarity_threshold) {
            return Err(PipelineError::InvalidConfig(format!(
                "similarity_threshold must be within 0..=100, got {}",
                self.similarity_threshold
            )));
        }
        if !(self.outlier_factor.is_finite() && self.outlier_factor >= 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "outlier_factor must be at least 1, got {}",
                self.outlier_factor
            )));
        }
        Ok(())
    }
}

impl Default for CleanseConfig {
    fn default() -> Self {
        Self {
            template_min_count: Self::DEFAULT_TEMPLATE_MIN_COUNT,
            similarity_threshold: Self::DEFAULT_SIMILARITY_THRESHOLD,
            outlier_factor: Self::DEFAULT_OUTLIER_FACTOR,
        }
    }
}

/// One candidate route reduced to its port sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStatistic {
    /// OD label.
    pub od: String,
    /// Vessel.
    pub vessel_id: VesselId,
    /// Per-vessel route ordinal.
    pub route_id: u32,
    /// OD-wide route id; `0` for routes that were dropped.
    pub unique_route_id: u32,
    /// Ports stopped at, runs collapsed, joined by `-`.
    pub port_sequence: String,
    /// Ports strictly between origin and destination.
    pub num_intermediate_ports: usize,
    /// Journey duration in days.
    pub journey_time: f64,
    /// Time of the route's first row.
    pub start_time: DateTime<Utc>,
}

/// Validity of a port sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SequenceStatus {
    /// Observed often enough to be a template.
    Valid,
    /// Rare, but promoted against a template.
    Salvaged {
        /// The template it was compared against.
        template: String,
        /// Similarity score, 0 to 100.
        score: f64,
    },
    /// Rare and implausible; its routes are dropped.
    Invalid,
}

impl SequenceStatus {
    /// Whether routes with this sequence are kept.
    #[must_use]
    pub const fn is_kept(&self) -> bool {
        !matches!(self, Self::Invalid)
    }

    /// Short name used in tabular output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Salvaged { .. } => "salvaged",
            Self::Invalid => "invalid",
        }
    }
}

/// Duration statistics of all routes sharing one port sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSequenceStatistic {
    /// OD label.
    pub od: String,
    /// The port sequence.
    pub port_sequence: String,
    /// Number of routes with this sequence.
    pub count: usize,
    /// Mean intermediate port count.
    pub mean_intermediate_ports: f64,
    /// Longest journey time in days.
    pub max_journey_time: f64,
    /// Shortest journey time in days.
    pub min_journey_time: f64,
    /// Mean journey time in days.
    pub mean_journey_time: f64,
    /// Median journey time in days.
    pub median_journey_time: f64,
    /// 95th-percentile journey time in days.
    pub q95_journey_time: f64,
    /// Template status after salvage.
    pub status: SequenceStatus,
}

/// Result of cleansing one OD's observations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanseOutcome {
    /// Surviving observations with unique route ids, ordered by
    /// (unique route id, time).
    pub observations: Vec<JourneyObservation>,
    /// One entry per candidate route, dropped ones included.
    pub routes: Vec<RouteStatistic>,
    /// One entry per distinct port sequence.
    pub sequences: Vec<PortSequenceStatistic>,
}

impl CleanseOutcome {
    /// Number of distinct unique route ids among the survivors.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.observations
            .iter()
            .map(|o| o.unique_route_id)
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Quantile `q` of ascending `sorted` values with linear interpolation
/// between closest ranks. `NaN` for an empty slice.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = pos.floor() as usize;
            let upper = pos.ceil() as usize;
            let frac = pos - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * frac
        }
    }
}

/// Similarity of two rendered sequences on a 0 to 100 scale.
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    normalized_levenshtein(a, b) * 100.0
}

type RouteKey = (String, VesselId, u32);

/// Reduce observations to one [`RouteStatistic`] per (OD, vessel, route),
/// ordered by key.
#[must_use]
pub fn route_statistics(observations: &[JourneyObservation]) -> Vec<RouteStatistic> {
    let mut groups: BTreeMap<RouteKey, Vec<&JourneyObservation>> = BTreeMap::new();
    for o in observations {
        groups
            .entry((o.od.clone(), o.record.vessel_id, o.route_id))
            .or_default()
            .push(o);
    }

    groups
        .into_iter()
        .filter_map(|((od, vessel_id, route_id), mut rows)| {
            rows.sort_by_key(|o| o.record.timestamp);
            let start_time = rows.first()?.record.timestamp;
            let ports: Vec<&str> = rows
                .iter()
                .filter_map(|o| o.port.as_ref().map(|p| p.as_str()))
                .collect();
            let ports = collapse_runs(&ports);
            let journey_time = rows
                .iter()
                .map(|o| o.remaining_lead_time)
                .fold(f64::NEG_INFINITY, f64::max);
            Some(RouteStatistic {
                od,
                vessel_id,
                route_id,
                unique_route_id: 0,
                num_intermediate_ports: ports.len().saturating_sub(2),
                port_sequence: ports.join(SEQUENCE_SEPARATOR),
                journey_time,
                start_time,
            })
        })
        .collect()
}

/// Group routes by (OD, port sequence) and compute duration statistics.
///
/// Every sequence starts out [`Valid`](SequenceStatus::Valid) or
/// [`Invalid`](SequenceStatus::Invalid) by count alone; see [`salvage`].
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn sequence_statistics(
    routes: &[RouteStatistic],
    config: &CleanseConfig,
) -> Vec<PortSequenceStatistic> {
    let mut groups: BTreeMap<(&str, &str), Vec<&RouteStatistic>> = BTreeMap::new();
    for r in routes {
        groups
            .entry((r.od.as_str(), r.port_sequence.as_str()))
            .or_default()
            .push(r);
    }

    groups
        .into_iter()
        .map(|((od, sequence), group)| {
            let mut times: Vec<f64> = group.iter().map(|r| r.journey_time).collect();
            times.sort_by(f64::total_cmp);
            let count = group.len();
            let n = count as f64;
            let intermediate: usize = group.iter().map(|r| r.num_intermediate_ports).sum();
            PortSequenceStatistic {
                od: od.to_owned(),
                port_sequence: sequence.to_owned(),
                count,
                mean_intermediate_ports: intermediate as f64 / n,
                max_journey_time: times.last().copied().unwrap_or(f64::NAN),
                min_journey_time: times.first().copied().unwrap_or(f64::NAN),
                mean_journey_time: times.iter().sum::<f64>() / n,
                median_journey_time: quantile(&times, 0.5),
                q95_journey_time: quantile(&times, 0.95),
                status: if count >= config.template_min_count {
                    SequenceStatus::Valid
                } else {
                    SequenceStatus::Invalid
                },
            }
        })
        .collect()
}

/// Try to promote every invalid sequence against the valid templates of
/// the same OD.
///
/// The best template is the one with the highest [`similarity`]. Equal
/// scores go to the first template in the order count descending, mean
/// intermediate ports descending, sequence text ascending. A sequence
/// is promoted if its mean duration is within the template's
/// 95th-percentile duration, or within `outlier_factor` times that when
/// the similarity reaches `similarity_threshold`.
pub fn salvage(stats: &mut [PortSequenceStatistic], config: &CleanseConfig) {
    let mut templates: HashMap<String, Vec<PortSequenceStatistic>> = HashMap::new();
    for s in stats.iter().filter(|s| s.status == SequenceStatus::Valid) {
        templates.entry(s.od.clone()).or_default().push(s.clone());
    }
    for list in templates.values_mut() {
        list.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(b.mean_intermediate_ports.total_cmp(&a.mean_intermediate_ports))
                .then_with(|| a.port_sequence.cmp(&b.port_sequence))
        });
    }

    for stat in stats.iter_mut().filter(|s| s.status == SequenceStatus::Invalid) {
        let Some(candidates) = templates.get(&stat.od) else {
            continue;
        };
        let mut best: Option<(&PortSequenceStatistic, f64)> = None;
        for template in candidates {
            let score = similarity(&stat.port_sequence, &template.port_sequence);
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((template, score));
            }
        }
        let Some((template, score)) = best else {
            continue;
        };

        let p95 = template.q95_journey_time;
        let within = stat.mean_journey_time <= p95;
        let close = stat.mean_journey_time <= config.outlier_factor * p95
            && score >= config.similarity_threshold;
        if within || close {
            debug!(
                od = %stat.od,
                sequence = %stat.port_sequence,
                template = %template.port_sequence,
                score,
                "salvaged port sequence"
            );
            stat.status = SequenceStatus::Salvaged {
                template: template.port_sequence.clone(),
                score,
            };
        }
    }
}

/// Cleanse one OD's assembled observations.
///
/// Routes with a kept sequence are numbered 1, 2, ... across the OD in
/// order of their first report (ties by vessel, then route ordinal).
#[must_use]
pub fn cleanse(observations: Vec<JourneyObservation>, config: &CleanseConfig) -> CleanseOutcome {
    let mut routes = route_statistics(&observations);
    let mut sequences = sequence_statistics(&routes, config);
    salvage(&mut sequences, config);

    let kept: HashSet<(&str, &str)> = sequences
        .iter()
        .filter(|s| s.status.is_kept())
        .map(|s| (s.od.as_str(), s.port_sequence.as_str()))
        .collect();

    let mut order: Vec<usize> = (0..routes.len())
        .filter(|&i| kept.contains(&(routes[i].od.as_str(), routes[i].port_sequence.as_str())))
        .collect();
    order.sort_by(|&a, &b| {
        let (ra, rb) = (&routes[a], &routes[b]);
        ra.start_time
            .cmp(&rb.start_time)
            .then(ra.vessel_id.cmp(&rb.vessel_id))
            .then(ra.route_id.cmp(&rb.route_id))
    });

    let mut unique_ids: HashMap<RouteKey, u32> = HashMap::with_capacity(order.len());
    for (&i, id) in order.iter().zip(1_u32..) {
        routes[i].unique_route_id = id;
        unique_ids.insert(
            (routes[i].od.clone(), routes[i].vessel_id, routes[i].route_id),
            id,
        );
    }

    let mut survivors: Vec<JourneyObservation> = observations
        .into_iter()
        .filter_map(|mut o| {
            let key = (o.od.clone(), o.record.vessel_id, o.route_id);
            o.unique_route_id = *unique_ids.get(&key)?;
            Some(o)
        })
        .collect();
    survivors.sort_by(|a, b| {
        a.unique_route_id
            .cmp(&b.unique_route_id)
            .then(a.record.timestamp.cmp(&b.record.timestamp))
    });

    CleanseOutcome {
        observations: survivors,
        routes,
        sequences,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::encode::tests::{at, report};
    use crate::types::{GeoPoint, PortCode};

    /// Observations of one route visiting `ports` and lasting `days`.
    fn route(
        vessel: u64,
        route_id: u32,
        start_hour: i64,
        days: f64,
        ports: &[&str],
    ) -> Vec<JourneyObservation> {
        let n = ports.len();
        ports
            .iter()
            .enumerate()
            .map(|(i, port)| {
                #[allow(clippy::cast_precision_loss)]
                let elapsed = days * i as f64 / (n - 1) as f64;
                JourneyObservation {
                    record: report(vessel, start_hour + i as i64, GeoPoint::new(0.0, 0.0), true),
                    od: "A-C".to_owned(),
                    route_id,
                    unique_route_id: 0,
                    port: Some(PortCode::from(*port)),
                    remaining_lead_time: days - elapsed,
                    percent_complete: elapsed / days,
                    elapsed_time: elapsed,
                    journey_time: days,
                    week: 1,
                }
            })
            .collect()
    }

    fn stat(sequence: &str, count: usize, mean: f64, q95: f64) -> PortSequenceStatistic {
        PortSequenceStatistic {
            od: "A-C".to_owned(),
            port_sequence: sequence.to_owned(),
            count,
            mean_intermediate_ports: 1.0,
            max_journey_time: q95,
            min_journey_time: mean,
            mean_journey_time: mean,
            median_journey_time: mean,
            q95_journey_time: q95,
            status: if count >= 2 {
                SequenceStatus::Valid
            } else {
                SequenceStatus::Invalid
            },
        }
    }

    fn salvaged(status: &SequenceStatus) -> Option<(&str, f64)> {
        match status {
            SequenceStatus::Salvaged { template, score } => Some((template.as_str(), *score)),
            _ => None,
        }
    }

    #[test]
    fn quantile_interpolates_linearly() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert!((quantile(&v, 0.5) - 2.5).abs() < 1e-12);
        assert!((quantile(&v, 0.95) - 3.85).abs() < 1e-12);
        assert!((quantile(&v, 0.0) - 1.0).abs() < 1e-12);
        assert!((quantile(&[7.0], 0.95) - 7.0).abs() < 1e-12);
        assert!(quantile(&[], 0.5).is_nan());
    }

    #[test]
    fn route_sequence_skips_unlabeled_rows_and_collapses_runs() {
        let mut rows = route(1, 1, 0, 10.0, &["A", "A", "B", "B", "C"]);
        rows[2].port = None;
        let stats = route_statistics(&rows);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].port_sequence, "A-B-C");
        assert_eq!(stats[0].num_intermediate_ports, 1);
        assert!((stats[0].journey_time - 10.0).abs() < 1e-12);
        assert_eq!(stats[0].start_time, at(0));
    }

    #[test]
    fn sequences_grouped_with_count_based_validity() {
        let mut rows = route(1, 1, 0, 10.0, &["A", "B", "C"]);
        rows.extend(route(2, 1, 5, 12.0, &["A", "B", "C"]));
        rows.extend(route(3, 1, 9, 30.0, &["A", "X", "C"]));
        let routes = route_statistics(&rows);
        let stats = sequence_statistics(&routes, &CleanseConfig::default());
        assert_eq!(stats.len(), 2);
        let abc = stats.iter().find(|s| s.port_sequence == "A-B-C").unwrap();
        assert_eq!(abc.count, 2);
        assert_eq!(abc.status, SequenceStatus::Valid);
        assert!((abc.mean_journey_time - 11.0).abs() < 1e-12);
        assert!((abc.q95_journey_time - 11.9).abs() < 1e-12);
        let axc = stats.iter().find(|s| s.port_sequence == "A-X-C").unwrap();
        assert_eq!(axc.status, SequenceStatus::Invalid);
    }

    #[test]
    fn dissimilar_slow_sequence_stays_invalid() {
        // Similarity about 70, mean 40% above the template's p95.
        let template = "CNSHA-SGSIN-NLRTM";
        let rare = "CNSHA-LKCMB-NLRTM";
        // Five of seventeen characters substituted.
        let score = similarity(rare, template);
        assert!((score - 1200.0 / 17.0).abs() < 1e-9, "score {score}");

        let mut stats = vec![stat(template, 5, 30.0, 35.0), stat(rare, 1, 49.0, 49.0)];
        salvage(&mut stats, &CleanseConfig::default());
        assert_eq!(stats[1].status, SequenceStatus::Invalid);
    }

    #[test]
    fn similarity_is_normalized_edit_distance() {
        let template = "AAAAA-BBBBB-CCCCC";
        assert!((similarity(template, template) - 100.0).abs() < 1e-9);
        assert!((similarity("AAAAA-XXXXX-CCCCC", template) - 1200.0 / 17.0).abs() < 1e-9);
        assert!((similarity("AAAAA-BBBBB-CCCCD", template) - 1600.0 / 17.0).abs() < 1e-9);
        // An extra port is five characters plus a separator longer.
        assert!((similarity("AAAAA-BBBBB-XXXXX-CCCCC", template) - 1700.0 / 23.0).abs() < 1e-9);
        assert!(similarity("", "").abs() > 99.0);
    }

    #[test]
    fn fast_sequence_salvaged_regardless_of_similarity() {
        let mut stats = vec![
            stat("CNSHA-SGSIN-NLRTM", 5, 30.0, 35.0),
            stat("CNSHA-LKCMB-NLRTM", 1, 34.0, 34.0),
        ];
        salvage(&mut stats, &CleanseConfig::default());
        assert!(matches!(stats[1].status, SequenceStatus::Salvaged { .. }));
    }

    #[test]
    fn similar_sequence_gets_outlier_slack() {
        // One character apart: similarity well above 85.
        let mut stats = vec![
            stat("CNSHA-SGSIN-NLRTM", 5, 30.0, 35.0),
            stat("CNSHA-SGSIN-NLRTA", 1, 42.0, 42.0),
        ];
        salvage(&mut stats, &CleanseConfig::default());
        let (template, score) = salvaged(&stats[1].status).unwrap();
        assert_eq!(template, "CNSHA-SGSIN-NLRTM");
        assert!(score >= 85.0);

        // Beyond 1.25 x p95 even a close sequence is dropped.
        let mut stats = vec![
            stat("CNSHA-SGSIN-NLRTM", 5, 30.0, 35.0),
            stat("CNSHA-SGSIN-NLRTA", 1, 44.0, 44.0),
        ];
        salvage(&mut stats, &CleanseConfig::default());
        assert_eq!(stats[1].status, SequenceStatus::Invalid);
    }

    #[test]
    fn no_template_means_no_salvage() {
        let mut stats = vec![stat("A-B-C", 1, 1.0, 1.0), stat("A-X-C", 1, 1.0, 1.0)];
        salvage(&mut stats, &CleanseConfig::default());
        assert!(stats.iter().all(|s| s.status == SequenceStatus::Invalid));
    }

    #[test]
    fn equal_scores_break_toward_more_frequent_template() {
        // "A-X-C" is one edit from both templates.
        let mut stats = vec![
            stat("A-B-C", 2, 10.0, 10.0),
            stat("A-D-C", 4, 10.0, 20.0),
            stat("A-X-C", 1, 15.0, 15.0),
        ];
        salvage(&mut stats, &CleanseConfig::default());
        assert_eq!(salvaged(&stats[2].status).map(|(t, _)| t), Some("A-D-C"));
    }

    #[test]
    fn equal_scores_and_counts_break_by_sequence_text() {
        let mut stats = vec![
            stat("A-D-C", 3, 10.0, 20.0),
            stat("A-B-C", 3, 10.0, 20.0),
            stat("A-X-C", 1, 15.0, 15.0),
        ];
        salvage(&mut stats, &CleanseConfig::default());
        assert_eq!(salvaged(&stats[2].status).map(|(t, _)| t), Some("A-B-C"));
    }

    #[test]
    fn invalid_routes_dropped_and_survivors_ranked_by_departure() {
        let mut rows = route(2, 1, 100, 10.0, &["A", "B", "C"]);
        rows.extend(route(1, 1, 0, 11.0, &["A", "B", "C"]));
        rows.extend(route(1, 2, 300, 12.0, &["A", "B", "C"]));
        rows.extend(route(3, 1, 50, 40.0, &["A", "LONG-DETOUR", "C"]));

        let outcome = cleanse(rows, &CleanseConfig::default());
        assert_eq!(outcome.routes.len(), 4);
        assert_eq!(outcome.sequences.len(), 2);
        assert_eq!(outcome.route_count(), 3);
        assert!(
            outcome
                .observations
                .iter()
                .all(|o| o.record.vessel_id != VesselId(3))
        );

        let id_of = |vessel: u64, route: u32| {
            outcome
                .routes
                .iter()
                .find(|r| r.vessel_id == VesselId(vessel) && r.route_id == route)
                .unwrap()
                .unique_route_id
        };
        assert_eq!(id_of(1, 1), 1);
        assert_eq!(id_of(2, 1), 2);
        assert_eq!(id_of(1, 2), 3);
        assert_eq!(id_of(3, 1), 0);

        let ids: Vec<u32> = outcome.observations.iter().map(|o| o.unique_route_id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn config_validation() {
        assert_eq!(CleanseConfig::default().validate(), Ok(()));
        let bad = CleanseConfig {
            similarity_threshold: 120.0,
            ..CleanseConfig::default()
        };
        assert!(bad.validate().is_err());
        let bad = CleanseConfig {
            outlier_factor: 0.5,
            ..CleanseConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
