/// Axis count a single mechanism is expected to report.
pub const MAX_AXES: usize = 12;

const HOMOGENEOUS_TOLERANCE: f64 = 1e-6;

/// 4x4 homogeneous transform, stored column-major as on the wire.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    values: [f64; 16],
}

impl Pose {
    pub fn identity() -> Self {
        let mut values = [0.0; 16];
        for index in 0..4 {
            values[index * 4 + index] = 1.0;
        }
        Self { values }
    }

    pub fn from_column_major(values: [f64; 16]) -> Self {
        Self { values }
    }

    pub fn from_rows(rows: [[f64; 4]; 4]) -> Self {
        let mut values = [0.0; 16];
        for (row, row_values) in rows.iter().enumerate() {
            for (col, value) in row_values.iter().enumerate() {
                values[col * 4 + row] = *value;
            }
        }
        Self { values }
    }

    pub fn translation(x: f64, y: f64, z: f64) -> Self {
        let mut pose = Self::identity();
        pose.values[12] = x;
        pose.values[13] = y;
        pose.values[14] = z;
        pose
    }

    pub fn column_major(&self) -> &[f64; 16] {
        &self.values
    }

    /// Panics if `row` or `col` is not below 4.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[col * 4 + row]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.values[col * 4 + row] = value;
    }

    pub fn position(&self) -> [f64; 3] {
        [self.values[12], self.values[13], self.values[14]]
    }

    /// Advisory check: orthonormal rotation block and a `[0 0 0 1]` bottom row.
    ///
    /// Non-homogeneous poses are still valid wire values.
    pub fn is_homogeneous(&self) -> bool {
        let bottom = [self.get(3, 0), self.get(3, 1), self.get(3, 2), self.get(3, 3)];
        if bottom
            .iter()
            .zip([0.0, 0.0, 0.0, 1.0])
            .any(|(actual, expected)| (actual - expected).abs() > HOMOGENEOUS_TOLERANCE)
        {
            return false;
        }

        for left in 0..3 {
            for right in 0..3 {
                let dot: f64 = (0..3)
                    .map(|row| self.get(row, left) * self.get(row, right))
                    .sum();
                let expected = if left == right { 1.0 } else { 0.0 };
                if (dot - expected).abs() > HOMOGENEOUS_TOLERANCE {
                    return false;
                }
            }
        }

        true
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Axis positions of one mechanism, in degrees or millimetres per axis.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JointVector {
    values: Vec<f64>,
}

impl JointVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the vector fits a single mechanism (at most [`MAX_AXES`] values).
    pub fn fits_mechanism(&self) -> bool {
        self.values.len() <= MAX_AXES
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.values
    }
}

impl From<Vec<f64>> for JointVector {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

impl From<&[f64]> for JointVector {
    fn from(values: &[f64]) -> Self {
        Self::new(values.to_vec())
    }
}

/// Growable column-major matrix used for batched points and trajectories.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Matrix2D {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl Matrix2D {
    /// Zero-filled matrix of the given shape, or `None` if `rows * cols` overflows.
    pub fn new(rows: usize, cols: usize) -> Option<Self> {
        let len = rows.checked_mul(cols)?;
        Some(Self {
            rows,
            cols,
            values: vec![0.0; len],
        })
    }

    pub fn from_column_major(rows: usize, cols: usize, values: Vec<f64>) -> Option<Self> {
        if rows.checked_mul(cols)? != values.len() {
            return None;
        }

        Some(Self { rows, cols, values })
    }

    pub fn from_columns<C: AsRef<[f64]>>(columns: &[C]) -> Option<Self> {
        let mut matrix = Self::default();
        for column in columns {
            if !matrix.push_column(column.as_ref()) {
                return None;
            }
        }
        Some(matrix)
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn column_major(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.values.get(col * self.rows + row).copied()
    }

    pub fn column(&self, col: usize) -> Option<&[f64]> {
        if col >= self.cols {
            return None;
        }
        let start = col * self.rows;
        self.values.get(start..start + self.rows)
    }

    /// Appends a column. The first column of an empty matrix fixes the row count.
    ///
    /// Returns `false` and leaves the matrix untouched on a length mismatch.
    pub fn push_column(&mut self, column: &[f64]) -> bool {
        if self.cols == 0 && self.values.is_empty() {
            self.rows = column.len();
        } else if column.len() != self.rows {
            return false;
        }

        self.values.extend_from_slice(column);
        self.cols += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::{JointVector, Matrix2D, Pose, MAX_AXES};

    #[test]
    fn from_rows_stores_column_major() {
        let pose = Pose::from_rows([
            [1.0, 2.0, 3.0, 4.0],
            [5.0, 6.0, 7.0, 8.0],
            [9.0, 10.0, 11.0, 12.0],
            [13.0, 14.0, 15.0, 16.0],
        ]);
        assert_eq!(&pose.column_major()[..4], &[1.0, 5.0, 9.0, 13.0]);
        assert_eq!(pose.get(1, 2), 7.0);
    }

    #[test]
    fn translation_is_homogeneous() {
        let pose = Pose::translation(100.0, -50.0, 300.0);
        assert!(pose.is_homogeneous());
        assert_eq!(pose.position(), [100.0, -50.0, 300.0]);
    }

    #[test]
    fn scaled_rotation_is_not_homogeneous() {
        let mut pose = Pose::identity();
        pose.set(0, 0, 2.0);
        assert!(!pose.is_homogeneous());

        let mut skewed = Pose::identity();
        skewed.set(3, 0, 0.5);
        assert!(!skewed.is_homogeneous());
    }

    #[test]
    fn joint_vector_reports_mechanism_fit() {
        assert!(JointVector::new(vec![0.0; MAX_AXES]).fits_mechanism());
        assert!(!JointVector::new(vec![0.0; MAX_AXES + 1]).fits_mechanism());
        assert!(JointVector::default().is_empty());
    }

    #[test]
    fn matrix_grows_by_columns() {
        let mut matrix = Matrix2D::default();
        assert!(matrix.push_column(&[1.0, 2.0, 3.0]));
        assert!(matrix.push_column(&[4.0, 5.0, 6.0]));
        assert!(!matrix.push_column(&[7.0]));

        assert_eq!(matrix.shape(), (3, 2));
        assert_eq!(matrix.get(2, 1), Some(6.0));
        assert_eq!(matrix.get(3, 0), None);
    }

    #[test]
    fn zero_filled_shape_rejects_overflow() {
        let matrix = Matrix2D::new(4, 3).expect("small shape");
        assert_eq!(matrix.column_major().len(), 12);
        assert_eq!(matrix.get(3, 2), Some(0.0));

        assert!(Matrix2D::new(usize::MAX, 2).is_none());
    }

    #[test]
    fn from_column_major_checks_length() {
        assert!(Matrix2D::from_column_major(2, 2, vec![0.0; 3]).is_none());
        assert!(Matrix2D::from_column_major(0, 5, Vec::new()).is_some());
        assert!(Matrix2D::from_columns(&[vec![1.0, 2.0], vec![3.0]]).is_none());
    }
}
