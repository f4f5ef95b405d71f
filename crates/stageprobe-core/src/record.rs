//! Access records and the flat per-lane buffers the simulator fills.

use crate::geometry::ElementAddress;

/// Number of logical coordinate components kept per access.
pub const COORD_COMPONENTS: usize = 3;

/// Value stored in unused coordinate components.
pub const COORD_PAD: i64 = -1;

/// Flat lane index split into its warp and lane-in-warp parts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LaneId {
    pub warp: usize,
    pub lane: usize,
}

impl LaneId {
    pub fn from_flat(flat: usize, lanes_per_warp: usize) -> Self {
        Self {
            warp: flat / lanes_per_warp,
            lane: flat % lanes_per_warp,
        }
    }
}

/// One element visited by one lane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessRecord {
    pub lane: usize,
    pub element: usize,
    pub src_offset: i64,
    pub dst_offset: i64,
    pub coord: [i64; COORD_COMPONENTS],
}

/// Pad or truncate a logical coordinate to `COORD_COMPONENTS` entries.
pub fn pack_coord(coord: &[usize]) -> [i64; COORD_COMPONENTS] {
    let mut packed = [COORD_PAD; COORD_COMPONENTS];
    for (slot, &c) in packed.iter_mut().zip(coord.iter()) {
        *slot = c as i64;
    }
    packed
}

/// Error raised when raw device output cannot be turned into lane buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    LengthMismatch {
        array: &'static str,
        expected: usize,
        actual: usize,
    },
    InvalidCount { lane: usize, count: i64 },
}

impl std::fmt::Display for TransferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LengthMismatch {
                array,
                expected,
                actual,
            } => write!(
                f,
                "device array `{}` has {} entries, expected {}",
                array, actual, expected
            ),
            Self::InvalidCount { lane, count } => {
                write!(f, "lane {} reported invalid element count {}", lane, count)
            }
        }
    }
}

impl std::error::Error for TransferError {}

/// Output of one simulation pass.
///
/// `counts[t]` is `None` for lanes that never ran; slot `t * capacity + i` is
/// `None` when lane `t` did not visit local index `i`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaneBuffers {
    capacity: usize,
    counts: Vec<Option<usize>>,
    slots: Vec<Option<AccessRecord>>,
}

/// Mutable view of the part of `LaneBuffers` owned by a single lane.
///
/// Only `LaneBuffers::lane_slots_mut` hands these out, one per lane, so two
/// slots never alias the same count or record range.
#[derive(Debug)]
pub struct LaneSlot<'a> {
    lane: usize,
    count: &'a mut Option<usize>,
    records: &'a mut [Option<AccessRecord>],
}

impl LaneSlot<'_> {
    pub fn lane(&self) -> usize {
        self.lane
    }

    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    /// Mark the lane as run with `elements` assigned elements.
    pub fn set_count(&mut self, elements: usize) {
        *self.count = Some(elements);
    }

    /// Record the access made for local element `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= capacity()`.
    pub fn record(&mut self, index: usize, address: ElementAddress) {
        self.records[index] = Some(AccessRecord {
            lane: self.lane,
            element: index,
            src_offset: address.src_offset,
            dst_offset: address.dst_offset,
            coord: address.coord,
        });
    }
}

impl LaneBuffers {
    pub fn new(lanes: usize, capacity: usize) -> Self {
        Self {
            capacity,
            counts: vec![None; lanes],
            slots: vec![None; lanes * capacity],
        }
    }

    pub fn lane_count(&self) -> usize {
        self.counts.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn count(&self, lane: usize) -> Option<usize> {
        self.counts[lane]
    }

    pub fn counts(&self) -> &[Option<usize>] {
        &self.counts
    }

    pub fn lane_slots(&self, lane: usize) -> &[Option<AccessRecord>] {
        let start = lane * self.capacity;
        &self.slots[start..start + self.capacity]
    }

    /// Present records of one lane, in local index order.
    pub fn lane_records(&self, lane: usize) -> impl Iterator<Item = &AccessRecord> {
        self.lane_slots(lane).iter().flatten()
    }

    /// One `LaneSlot` per lane, in lane order. Each slot borrows that lane's
    /// count and its `capacity` records and nothing else.
    pub fn lane_slots_mut(&mut self) -> impl ExactSizeIterator<Item = LaneSlot<'_>> {
        let capacity = self.capacity;
        let mut slots = self.slots.as_mut_slice();
        self.counts
            .iter_mut()
            .enumerate()
            .map(move |(lane, count)| {
                let (records, rest) = std::mem::take(&mut slots).split_at_mut(capacity);
                slots = rest;
                LaneSlot {
                    lane,
                    count,
                    records,
                }
            })
    }

    /// Rebuild lane buffers from the arrays a device launch writes.
    ///
    /// `counts` uses `-1` for lanes that never ran; `valid` holds one byte per
    /// slot and is the only liveness signal for offsets and coordinates.
    pub fn from_device_arrays(
        capacity: usize,
        counts: &[i32],
        valid: &[u8],
        src_offsets: &[i64],
        dst_offsets: &[i64],
        coords: &[i32],
    ) -> Result<Self, TransferError> {
        let lanes = counts.len();
        let slots_len = lanes * capacity;
        check_len("valid", slots_len, valid.len())?;
        check_len("src_offsets", slots_len, src_offsets.len())?;
        check_len("dst_offsets", slots_len, dst_offsets.len())?;
        check_len("coords", slots_len * COORD_COMPONENTS, coords.len())?;

        let mut buffers = Self::new(lanes, capacity);
        for (lane, &raw) in counts.iter().enumerate() {
            buffers.counts[lane] = match raw {
                -1 => None,
                n if n >= 0 => Some(n as usize),
                n => {
                    return Err(TransferError::InvalidCount {
                        lane,
                        count: n as i64,
                    })
                }
            };
        }
        for (slot_idx, slot) in buffers.slots.iter_mut().enumerate() {
            if valid[slot_idx] == 0 {
                continue;
            }
            let c = &coords[slot_idx * COORD_COMPONENTS..(slot_idx + 1) * COORD_COMPONENTS];
            *slot = Some(AccessRecord {
                lane: slot_idx / capacity,
                element: slot_idx % capacity,
                src_offset: src_offsets[slot_idx],
                dst_offset: dst_offsets[slot_idx],
                coord: [c[0] as i64, c[1] as i64, c[2] as i64],
            });
        }
        Ok(buffers)
    }
}

fn check_len(array: &'static str, expected: usize, actual: usize) -> Result<(), TransferError> {
    if expected != actual {
        return Err(TransferError::LengthMismatch {
            array,
            expected,
            actual,
        });
    }
    Ok(())
}
