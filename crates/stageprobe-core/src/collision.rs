//! Host-side collision analysis over simulator output.
//!
//! Every present access is grouped twice: once by staging-region offset and
//! once by private-buffer offset. Any offset reached by two or more accesses in
//! the same space is a race in the simulated address computation.

use std::collections::BTreeMap;
use std::fmt;

use crate::geometry::GeometryError;
use crate::record::{LaneBuffers, LaneId, COORD_COMPONENTS};

/// Human-facing context for one access that landed on an offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HitDescriptor {
    pub lane_id: LaneId,
    pub element: usize,
    pub dst_offset: i64,
    pub coord: [i64; COORD_COMPONENTS],
}

impl fmt::Display for HitDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "warp={}/lane={}/elem={}/dst={}/coord=({},{},{})",
            self.lane_id.warp,
            self.lane_id.lane,
            self.element,
            self.dst_offset,
            self.coord[0],
            self.coord[1],
            self.coord[2]
        )
    }
}

/// Offset -> accesses, in lane/element visitation order.
pub type HitMap = BTreeMap<i64, Vec<HitDescriptor>>;

#[derive(Clone, Debug, Default)]
pub struct CollisionReport {
    pub src_hits: HitMap,
    pub dst_hits: HitMap,
    /// Sum of per-lane element counts after clamping to capacity.
    pub total_elements: usize,
    /// Number of accesses actually recorded.
    pub recorded: usize,
    pub truncated: bool,
    /// Lanes whose true element count exceeded capacity.
    pub truncated_lanes: Vec<usize>,
    pub capacity: usize,
}

impl CollisionReport {
    pub fn src_collisions(&self) -> Vec<(i64, &[HitDescriptor])> {
        collisions(&self.src_hits)
    }

    pub fn dst_collisions(&self) -> Vec<(i64, &[HitDescriptor])> {
        collisions(&self.dst_hits)
    }

    pub fn unique_src_offsets(&self) -> usize {
        self.src_hits.len()
    }

    pub fn unique_dst_offsets(&self) -> usize {
        self.dst_hits.len()
    }

    pub fn has_collisions(&self) -> bool {
        self.src_hits.values().any(|hits| hits.len() >= 2)
            || self.dst_hits.values().any(|hits| hits.len() >= 2)
    }
}

fn collisions(map: &HitMap) -> Vec<(i64, &[HitDescriptor])> {
    map.iter()
        .filter(|(_, hits)| hits.len() >= 2)
        .map(|(&offset, hits)| (offset, hits.as_slice()))
        .collect()
}

/// Build the collision report for one simulation pass.
pub fn analyze(
    buffers: &LaneBuffers,
    lanes_per_warp: usize,
) -> Result<CollisionReport, GeometryError> {
    if lanes_per_warp == 0 {
        return Err(GeometryError::ZeroLanes);
    }
    let capacity = buffers.capacity();
    let mut report = CollisionReport {
        capacity,
        ..CollisionReport::default()
    };

    for lane in 0..buffers.lane_count() {
        let Some(count) = buffers.count(lane) else {
            continue;
        };
        let elements = count.min(capacity);
        if elements < count {
            report.truncated = true;
            report.truncated_lanes.push(lane);
        }
        report.total_elements += elements;

        let lane_id = LaneId::from_flat(lane, lanes_per_warp);
        for record in buffers.lane_slots(lane)[..elements].iter().flatten() {
            let hit = HitDescriptor {
                lane_id,
                element: record.element,
                dst_offset: record.dst_offset,
                coord: record.coord,
            };
            report
                .src_hits
                .entry(record.src_offset)
                .or_default()
                .push(hit.clone());
            report.dst_hits.entry(record.dst_offset).or_default().push(hit);
            report.recorded += 1;
        }
    }

    tracing::debug!(
        lanes = buffers.lane_count(),
        recorded = report.recorded,
        total_elements = report.total_elements,
        truncated = report.truncated,
        "collision analysis complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ElementAddress;
    use crate::record::{AccessRecord, COORD_PAD};

    fn record(lane: usize, element: usize, src: i64, dst: i64) -> AccessRecord {
        AccessRecord {
            lane,
            element,
            src_offset: src,
            dst_offset: dst,
            coord: [lane as i64, element as i64, COORD_PAD],
        }
    }

    fn buffers_with(capacity: usize, lanes: &[(Option<usize>, Vec<AccessRecord>)]) -> LaneBuffers {
        let mut buffers = LaneBuffers::new(lanes.len(), capacity);
        for (mut slot, (count, records)) in buffers.lane_slots_mut().zip(lanes) {
            if let Some(count) = count {
                slot.set_count(*count);
            }
            for r in records {
                slot.record(
                    r.element,
                    ElementAddress {
                        src_offset: r.src_offset,
                        dst_offset: r.dst_offset,
                        coord: r.coord,
                    },
                );
            }
        }
        buffers
    }

    #[test]
    fn descriptor_format_matches_report_contract() {
        let hit = HitDescriptor {
            lane_id: LaneId { warp: 2, lane: 7 },
            element: 3,
            dst_offset: 65540,
            coord: [1, 4, COORD_PAD],
        };
        assert_eq!(
            hit.to_string(),
            "warp=2/lane=7/elem=3/dst=65540/coord=(1,4,-1)"
        );
    }

    #[test]
    fn distinct_offsets_produce_no_collisions() {
        let buffers = buffers_with(
            4,
            &[
                (Some(2), vec![record(0, 0, 0, 100), record(0, 1, 1, 101)]),
                (Some(2), vec![record(1, 0, 2, 102), record(1, 1, 3, 103)]),
            ],
        );
        let report = analyze(&buffers, 32).unwrap();
        assert!(!report.has_collisions());
        assert!(report.src_collisions().is_empty());
        assert!(report.dst_collisions().is_empty());
        assert_eq!(report.unique_src_offsets(), 4);
        assert_eq!(report.unique_dst_offsets(), 4);
        assert_eq!(report.total_elements, 4);
        assert_eq!(report.recorded, 4);
        assert!(!report.truncated);
    }

    #[test]
    fn multiplicity_is_counted_per_space_without_merging() {
        // src 7 is shared by three accesses; dst offsets reuse the value 7 but
        // only once, which must not count towards the src collision.
        let buffers = buffers_with(
            4,
            &[
                (Some(2), vec![record(0, 0, 7, 7), record(0, 1, 7, 8)]),
                (Some(1), vec![record(1, 0, 7, 9)]),
            ],
        );
        let report = analyze(&buffers, 32).unwrap();

        let src = report.src_collisions();
        assert_eq!(src.len(), 1);
        assert_eq!(src[0].0, 7);
        assert_eq!(src[0].1.len(), 3);
        assert!(report.dst_collisions().is_empty());
        assert_eq!(report.dst_hits[&7].len(), 1);
    }

    #[test]
    fn hit_lists_follow_visitation_order() {
        let buffers = buffers_with(
            2,
            &[
                (Some(2), vec![record(0, 0, 5, 0), record(0, 1, 6, 1)]),
                (Some(1), vec![record(1, 0, 5, 2)]),
                (Some(1), vec![record(2, 0, 5, 3)]),
            ],
        );
        let report = analyze(&buffers, 2).unwrap();
        let hits = &report.src_hits[&5];
        let order: Vec<_> = hits.iter().map(|h| (h.lane_id.warp, h.lane_id.lane)).collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (1, 0)]);
    }

    #[test]
    fn inactive_lanes_are_skipped() {
        let buffers = buffers_with(
            2,
            &[(Some(1), vec![record(0, 0, 0, 0)]), (None, Vec::new())],
        );
        let report = analyze(&buffers, 32).unwrap();
        assert_eq!(report.total_elements, 1);
        assert_eq!(report.recorded, 1);
        assert!(!report.truncated);
    }

    #[test]
    fn counts_above_capacity_are_clamped_and_flagged() {
        let buffers = buffers_with(
            2,
            &[
                (Some(5), vec![record(0, 0, 0, 0), record(0, 1, 1, 1)]),
                (Some(2), vec![record(1, 0, 2, 2), record(1, 1, 3, 3)]),
            ],
        );
        let report = analyze(&buffers, 32).unwrap();
        assert!(report.truncated);
        assert_eq!(report.truncated_lanes, vec![0]);
        assert_eq!(report.total_elements, 4);
        assert_eq!(report.recorded, 4);
    }

    #[test]
    fn zero_lanes_per_warp_is_rejected() {
        let buffers = buffers_with(2, &[(Some(1), vec![record(0, 0, 0, 0)])]);
        assert_eq!(analyze(&buffers, 0).unwrap_err(), GeometryError::ZeroLanes);
    }

    #[test]
    fn unvisited_slots_do_not_create_hits() {
        // lane 0 is assigned 3 elements but only visited index 1
        let buffers = buffers_with(4, &[(Some(3), vec![record(0, 1, 42, 42)])]);
        let report = analyze(&buffers, 32).unwrap();
        assert_eq!(report.total_elements, 3);
        assert_eq!(report.recorded, 1);
        assert_eq!(report.unique_src_offsets(), 1);
        assert!(!report.has_collisions());
    }
}
