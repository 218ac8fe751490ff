//! Position mapping through document changes.

use std::sync::Arc;

const LOWER16: usize = 0xffff;
const FACTOR16: usize = 1 << 16;

fn make_recover(index: usize, offset: usize) -> usize {
    index + offset * FACTOR16
}

fn recover_index(value: usize) -> usize {
    value & LOWER16
}

fn recover_offset(value: usize) -> usize {
    (value - (value & LOWER16)) / FACTOR16
}

const DEL_BEFORE: u8 = 1;
const DEL_AFTER: u8 = 2;
const DEL_ACROSS: u8 = 4;
const DEL_SIDE: u8 = 8;

/// Which side a mapped position sticks to when content is inserted at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Assoc {
    /// Stay before inserted content.
    Before,
    /// Move past inserted content.
    #[default]
    After,
}

impl Assoc {
    fn sign(self) -> isize {
        match self {
            Assoc::Before => -1,
            Assoc::After => 1,
        }
    }
}

/// A mapped position with information about deletions around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapResult {
    pub pos: usize,
    del_info: u8,
    pub(crate) recover: Option<usize>,
}

impl MapResult {
    fn new(pos: usize, del_info: u8, recover: Option<usize>) -> Self {
        Self {
            pos,
            del_info,
            recover,
        }
    }

    /// The position's side (per its association) was deleted.
    pub fn deleted(&self) -> bool {
        self.del_info & DEL_SIDE > 0
    }

    /// The token before the position was deleted.
    pub fn deleted_before(&self) -> bool {
        self.del_info & (DEL_BEFORE | DEL_ACROSS) > 0
    }

    /// The token after the position was deleted.
    pub fn deleted_after(&self) -> bool {
        self.del_info & (DEL_AFTER | DEL_ACROSS) > 0
    }

    /// The position lay strictly inside a deleted range.
    pub fn deleted_across(&self) -> bool {
        self.del_info & DEL_ACROSS > 0
    }
}

/// Something positions can be mapped through.
pub trait Mappable {
    fn map(&self, pos: usize, assoc: Assoc) -> usize;
    fn map_result(&self, pos: usize, assoc: Assoc) -> MapResult;
}

/// The position changes made by a single step, as `(start, old size, new
/// size)` triples in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepMap {
    ranges: Arc<[usize]>,
    inverted: bool,
}

impl StepMap {
    /// # Panics
    ///
    /// Panics if `ranges` is not made of triples.
    pub fn new(ranges: Vec<usize>) -> Self {
        assert!(ranges.len() % 3 == 0, "step map ranges come in triples");
        Self {
            ranges: Arc::from(ranges),
            inverted: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// A map that shifts every position by `n`.
    pub fn offset(n: isize) -> Self {
        match n {
            0 => Self::empty(),
            n if n < 0 => Self::new(vec![0, n.unsigned_abs(), 0]),
            n => Self::new(vec![0, 0, n.unsigned_abs()]),
        }
    }

    pub fn ranges(&self) -> &[usize] {
        &self.ranges
    }

    fn indices(&self) -> (usize, usize) {
        if self.inverted { (2, 1) } else { (1, 2) }
    }

    /// Position in the mapped document for a `recover` value produced by
    /// this map's mirror.
    pub fn recover(&self, value: usize) -> usize {
        let index = recover_index(value);
        let mut diff: isize = 0;
        if !self.inverted {
            for i in 0..index {
                diff += self.ranges[i * 3 + 2] as isize - self.ranges[i * 3 + 1] as isize;
            }
        }
        (self.ranges[index * 3] + recover_offset(value)).saturating_add_signed(diff)
    }

    fn map_inner(&self, pos: usize, assoc: Assoc) -> MapResult {
        let assoc = assoc.sign();
        let mut diff: isize = 0;
        let (old_index, new_index) = self.indices();
        for (i, range) in self.ranges.chunks_exact(3).enumerate() {
            let start = if self.inverted {
                range[0].saturating_add_signed(-diff)
            } else {
                range[0]
            };
            if start > pos {
                break;
            }
            let old_size = range[old_index];
            let new_size = range[new_index];
            let end = start + old_size;
            if pos <= end {
                let side = if old_size == 0 {
                    assoc
                } else if pos == start {
                    -1
                } else if pos == end {
                    1
                } else {
                    assoc
                };
                let result =
                    (start + if side < 0 { 0 } else { new_size }).saturating_add_signed(diff);
                let recover = if pos == (if assoc < 0 { start } else { end }) {
                    None
                } else {
                    Some(make_recover(i, pos - start))
                };
                let mut del = if pos == start {
                    DEL_AFTER
                } else if pos == end {
                    DEL_BEFORE
                } else {
                    DEL_ACROSS
                };
                if if assoc < 0 { pos != start } else { pos != end } {
                    del |= DEL_SIDE;
                }
                return MapResult::new(result, del, recover);
            }
            diff += new_size as isize - old_size as isize;
        }
        MapResult::new(pos.saturating_add_signed(diff), 0, None)
    }

    /// Whether `pos` touches the range that `recover` points at.
    pub fn touches(&self, pos: usize, recover: usize) -> bool {
        let mut diff: isize = 0;
        let index = recover_index(recover);
        let (old_index, new_index) = self.indices();
        for (i, range) in self.ranges.chunks_exact(3).enumerate() {
            let start = if self.inverted {
                range[0].saturating_add_signed(-diff)
            } else {
                range[0]
            };
            if start > pos {
                break;
            }
            let old_size = range[old_index];
            let end = start + old_size;
            if pos <= end && i == index {
                return true;
            }
            diff += range[new_index] as isize - old_size as isize;
        }
        false
    }

    /// Calls `f(old_start, old_end, new_start, new_end)` for each changed
    /// range.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(usize, usize, usize, usize),
    {
        let (old_index, new_index) = self.indices();
        let mut diff: isize = 0;
        for range in self.ranges.chunks_exact(3) {
            let start = range[0];
            let old_start = if self.inverted {
                start.saturating_add_signed(-diff)
            } else {
                start
            };
            let new_start = if self.inverted {
                start
            } else {
                start.saturating_add_signed(diff)
            };
            let old_size = range[old_index];
            let new_size = range[new_index];
            f(old_start, old_start + old_size, new_start, new_start + new_size);
            diff += new_size as isize - old_size as isize;
        }
    }

    pub fn invert(&self) -> StepMap {
        StepMap {
            ranges: self.ranges.clone(),
            inverted: !self.inverted,
        }
    }
}

impl Mappable for StepMap {
    fn map(&self, pos: usize, assoc: Assoc) -> usize {
        self.map_inner(pos, assoc).pos
    }

    fn map_result(&self, pos: usize, assoc: Assoc) -> MapResult {
        self.map_inner(pos, assoc)
    }
}

/// A sequence of step maps, with optional mirror pairs: maps known to be
/// exact inverses of each other. Mapping through a mirrored pair recovers
/// positions inside deleted ranges.
#[derive(Debug, Clone, Default)]
pub struct Mapping {
    maps: Vec<StepMap>,
    /// Flat `(a, b)` pairs of mirrored map indices.
    mirror: Vec<usize>,
    from: usize,
    to: usize,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_maps(maps: Vec<StepMap>) -> Self {
        let to = maps.len();
        Self {
            maps,
            mirror: Vec::new(),
            from: 0,
            to,
        }
    }

    pub fn maps(&self) -> &[StepMap] {
        &self.maps
    }

    pub fn from(&self) -> usize {
        self.from
    }

    pub fn to(&self) -> usize {
        self.to
    }

    /// A mapping that only applies maps `from..to`.
    pub fn slice(&self, from: usize, to: usize) -> Mapping {
        Mapping {
            maps: self.maps.clone(),
            mirror: self.mirror.clone(),
            from,
            to,
        }
    }

    /// Adds a map, optionally recording it as the mirror of map `mirrors`.
    pub fn append_map(&mut self, map: StepMap, mirrors: Option<usize>) {
        self.maps.push(map);
        self.to = self.maps.len();
        if let Some(m) = mirrors {
            self.set_mirror(self.maps.len() - 1, m);
        }
    }

    pub fn append_mapping(&mut self, mapping: &Mapping) {
        let start_size = self.maps.len();
        for (i, map) in mapping.maps.iter().enumerate() {
            let mirr = mapping.get_mirror(i).filter(|&m| m < i);
            self.append_map(map.clone(), mirr.map(|m| start_size + m));
        }
    }

    /// Appends the inverse of every map in `mapping`, last first.
    pub fn append_mapping_inverted(&mut self, mapping: &Mapping) {
        let total_size = self.maps.len() + mapping.maps.len();
        for i in (0..mapping.maps.len()).rev() {
            let mirr = mapping.get_mirror(i).filter(|&m| m > i);
            self.append_map(mapping.maps[i].invert(), mirr.map(|m| total_size - m - 1));
        }
    }

    pub fn get_mirror(&self, n: usize) -> Option<usize> {
        self.mirror
            .iter()
            .position(|&m| m == n)
            .map(|i| self.mirror[if i % 2 == 1 { i - 1 } else { i + 1 }])
    }

    pub fn set_mirror(&mut self, n: usize, m: usize) {
        self.mirror.push(n);
        self.mirror.push(m);
    }

    pub fn invert(&self) -> Mapping {
        let mut inverse = Mapping::new();
        inverse.append_mapping_inverted(self);
        inverse
    }

    fn map_inner(&self, pos: usize, assoc: Assoc) -> MapResult {
        let mut del_info = 0;
        let mut pos = pos;
        let mut i = self.from;
        while i < self.to {
            let result = self.maps[i].map_result(pos, assoc);
            if let Some(recover) = result.recover {
                if let Some(corr) = self.get_mirror(i).filter(|&c| c > i && c < self.to) {
                    pos = self.maps[corr].recover(recover);
                    i = corr + 1;
                    continue;
                }
            }
            del_info |= result.del_info;
            pos = result.pos;
            i += 1;
        }
        MapResult::new(pos, del_info, None)
    }
}

impl Mappable for Mapping {
    fn map(&self, pos: usize, assoc: Assoc) -> usize {
        if !self.mirror.is_empty() {
            return self.map_inner(pos, assoc).pos;
        }
        self.maps[self.from..self.to]
            .iter()
            .fold(pos, |pos, map| map.map(pos, assoc))
    }

    fn map_result(&self, pos: usize, assoc: Assoc) -> MapResult {
        self.map_inner(pos, assoc)
    }
}
