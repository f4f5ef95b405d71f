//! Runtime layout functions.
//!
//! A `Layout` maps a multi-dimensional coordinate to a linear offset through a
//! per-mode stride. Linear indices decompose into coordinates colexicographically
//! (mode 0 varies fastest), which is the convention the staging kernels use for
//! both shared tiles and per-thread fragments.

/// Error types for layout construction and inversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    EmptyShape,
    RankMismatch { shape: usize, stride: usize },
    ZeroExtent { mode: usize },
    NotBijective { size: usize },
}

impl std::fmt::Display for LayoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyShape => write!(f, "layout must have at least one mode"),
            Self::RankMismatch { shape, stride } => {
                write!(f, "shape has {} modes but stride has {}", shape, stride)
            }
            Self::ZeroExtent { mode } => write!(f, "mode {} has zero extent", mode),
            Self::NotBijective { size } => {
                write!(f, "layout is not a bijection onto [0, {})", size)
            }
        }
    }
}

impl std::error::Error for LayoutError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    shape: Vec<usize>,
    stride: Vec<i64>,
}

impl Layout {
    pub fn new(shape: Vec<usize>, stride: Vec<i64>) -> Result<Self, LayoutError> {
        if shape.is_empty() {
            return Err(LayoutError::EmptyShape);
        }
        if shape.len() != stride.len() {
            return Err(LayoutError::RankMismatch {
                shape: shape.len(),
                stride: stride.len(),
            });
        }
        if let Some(mode) = shape.iter().position(|&extent| extent == 0) {
            return Err(LayoutError::ZeroExtent { mode });
        }
        Ok(Self { shape, stride })
    }

    /// Compact layout with mode 0 contiguous.
    pub fn col_major(shape: Vec<usize>) -> Result<Self, LayoutError> {
        let mut stride = Vec::with_capacity(shape.len());
        let mut acc = 1i64;
        for &extent in &shape {
            stride.push(acc);
            acc *= extent as i64;
        }
        Self::new(shape, stride)
    }

    /// Compact layout with the last mode contiguous.
    pub fn row_major(shape: Vec<usize>) -> Result<Self, LayoutError> {
        let mut stride = vec![0i64; shape.len()];
        let mut acc = 1i64;
        for (slot, &extent) in stride.iter_mut().zip(shape.iter()).rev() {
            *slot = acc;
            acc *= extent as i64;
        }
        Self::new(shape, stride)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn stride(&self) -> &[i64] {
        &self.stride
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    /// Colexicographic decomposition of `idx` over this layout's shape.
    ///
    /// The last mode absorbs any overflow, so callers must keep `idx < size()`
    /// if they want an in-domain coordinate.
    pub fn idx2crd(&self, idx: usize) -> Vec<usize> {
        idx2crd(idx, &self.shape)
    }

    pub fn crd2idx(&self, coord: &[usize]) -> i64 {
        debug_assert_eq!(coord.len(), self.rank());
        coord
            .iter()
            .zip(self.stride.iter())
            .map(|(&c, &s)| c as i64 * s)
            .sum()
    }

    /// Evaluate the layout function at a linear index.
    pub fn offset(&self, idx: usize) -> i64 {
        self.crd2idx(&self.idx2crd(idx))
    }

    /// Inverse of a bijective layout: entry `k` holds the coordinate that maps
    /// to offset `k`.
    pub fn coordinate_table(&self) -> Result<Vec<Vec<usize>>, LayoutError> {
        let size = self.size();
        let mut table: Vec<Option<Vec<usize>>> = vec![None; size];
        for idx in 0..size {
            let coord = self.idx2crd(idx);
            let image = self.crd2idx(&coord);
            if image < 0 || image as usize >= size {
                return Err(LayoutError::NotBijective { size });
            }
            let slot = &mut table[image as usize];
            if slot.is_some() {
                return Err(LayoutError::NotBijective { size });
            }
            *slot = Some(coord);
        }
        table
            .into_iter()
            .map(|entry| entry.ok_or(LayoutError::NotBijective { size }))
            .collect()
    }
}

/// Colexicographic index -> coordinate over an arbitrary shape.
pub fn idx2crd(mut idx: usize, shape: &[usize]) -> Vec<usize> {
    let mut coord = Vec::with_capacity(shape.len());
    for (mode, &extent) in shape.iter().enumerate() {
        if mode + 1 == shape.len() {
            coord.push(idx);
        } else {
            coord.push(idx % extent);
            idx /= extent;
        }
    }
    coord
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn col_major_is_identity_on_linear_index() {
        let layout = Layout::col_major(vec![4, 3, 2]).unwrap();
        assert_eq!(layout.stride(), &[1, 4, 12]);
        for idx in 0..layout.size() {
            assert_eq!(layout.offset(idx), idx as i64);
        }
    }

    #[test]
    fn row_major_transposes_modes() {
        let layout = Layout::row_major(vec![4, 8]).unwrap();
        assert_eq!(layout.stride(), &[8, 1]);
        // idx 1 -> coord (1, 0) -> offset 8
        assert_eq!(layout.offset(1), 8);
        assert_eq!(layout.offset(4), 1);
    }

    #[test]
    fn idx2crd_is_colexicographic() {
        let layout = Layout::col_major(vec![2, 3]).unwrap();
        assert_eq!(layout.idx2crd(0), vec![0, 0]);
        assert_eq!(layout.idx2crd(1), vec![1, 0]);
        assert_eq!(layout.idx2crd(2), vec![0, 1]);
        assert_eq!(layout.idx2crd(5), vec![1, 2]);
    }

    #[test]
    fn new_rejects_bad_shapes() {
        assert_eq!(Layout::new(vec![], vec![]), Err(LayoutError::EmptyShape));
        assert_eq!(
            Layout::new(vec![2, 2], vec![1]),
            Err(LayoutError::RankMismatch { shape: 2, stride: 1 })
        );
        assert_eq!(
            Layout::new(vec![2, 0], vec![1, 2]),
            Err(LayoutError::ZeroExtent { mode: 1 })
        );
    }

    #[test]
    fn coordinate_table_inverts_permuted_layout() {
        // 32 x 4 threads, row index fastest in the thread id
        let layout = Layout::new(vec![32, 4], vec![1, 32]).unwrap();
        let table = layout.coordinate_table().unwrap();
        assert_eq!(table.len(), 128);
        assert_eq!(table[0], vec![0, 0]);
        assert_eq!(table[33], vec![1, 1]);

        let transposed = Layout::new(vec![32, 4], vec![4, 1]).unwrap();
        let table = transposed.coordinate_table().unwrap();
        assert_eq!(table[1], vec![0, 1]);
        assert_eq!(table[4], vec![1, 0]);
    }

    #[test]
    fn coordinate_table_rejects_broadcast_stride() {
        let layout = Layout::new(vec![4, 2], vec![1, 0]).unwrap();
        assert_eq!(
            layout.coordinate_table(),
            Err(LayoutError::NotBijective { size: 8 })
        );
    }
}
