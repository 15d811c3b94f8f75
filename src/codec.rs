//! Byte-exact encoders and decoders for the six wire types.
//!
//! Every multi-byte number travels big-endian. Decoders never touch I/O: they
//! either consume exactly the bytes a value occupies or report how many bytes
//! they need (`CodecError::Incomplete`) or why the bytes can never form a value.

use thiserror::Error;

use crate::model::{Handle, JointVector, Matrix2D, Pose};

/// Largest joint count accepted on the wire, in either direction.
pub const MAX_WIRE_JOINTS: usize = 50;

/// Largest element count (`rows * cols`) accepted for a matrix.
pub const MAX_MATRIX_VALUES: usize = 1 << 22;

/// Largest encoded size of any non-line value.
pub const MAX_VALUE_BYTES: usize = 2 * INT_LEN + MAX_MATRIX_VALUES * DOUBLE_LEN;

/// Longest line accepted from the remote, terminator included.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Outbound replacement for embedded newlines.
pub const LINE_BREAK_ESCAPE: &str = "<br>";

const INT_LEN: usize = 4;
const DOUBLE_LEN: usize = 8;
const HANDLE_LEN: usize = 12;
const POSE_LEN: usize = 16 * DOUBLE_LEN;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("need {needed} bytes to decode, have {available}")]
    Incomplete { needed: usize, available: usize },

    #[error("element count {count} outside 0..={max}")]
    CountOutOfRange { count: i64, max: usize },

    #[error("invalid matrix shape {rows}x{cols}")]
    InvalidShape { rows: i64, cols: i64 },

    #[error("line exceeds {max} bytes without a terminator")]
    LineTooLong { max: usize },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum WireKind {
    Int32,
    Handle,
    Pose,
    JointVector,
    Matrix2D,
    Line,
}

impl std::fmt::Display for WireKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            Self::Int32 => "int32",
            Self::Handle => "handle",
            Self::Pose => "pose",
            Self::JointVector => "joints",
            Self::Matrix2D => "matrix",
            Self::Line => "line",
        };

        write!(f, "{value}")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum WireValue {
    Int32(i32),
    Handle(Handle),
    Pose(Pose),
    JointVector(JointVector),
    Matrix2D(Matrix2D),
    Line(String),
}

impl WireValue {
    pub fn kind(&self) -> WireKind {
        match self {
            Self::Int32(_) => WireKind::Int32,
            Self::Handle(_) => WireKind::Handle,
            Self::Pose(_) => WireKind::Pose,
            Self::JointVector(_) => WireKind::JointVector,
            Self::Matrix2D(_) => WireKind::Matrix2D,
            Self::Line(_) => WireKind::Line,
        }
    }
}

impl From<i32> for WireValue {
    fn from(value: i32) -> Self {
        Self::Int32(value)
    }
}

impl From<Handle> for WireValue {
    fn from(value: Handle) -> Self {
        Self::Handle(value)
    }
}

impl From<Pose> for WireValue {
    fn from(value: Pose) -> Self {
        Self::Pose(value)
    }
}

impl From<JointVector> for WireValue {
    fn from(value: JointVector) -> Self {
        Self::JointVector(value)
    }
}

impl From<Matrix2D> for WireValue {
    fn from(value: Matrix2D) -> Self {
        Self::Matrix2D(value)
    }
}

impl From<&str> for WireValue {
    fn from(value: &str) -> Self {
        Self::Line(value.to_string())
    }
}

impl From<String> for WireValue {
    fn from(value: String) -> Self {
        Self::Line(value)
    }
}

pub fn encode(value: &WireValue, out: &mut Vec<u8>) -> Result<(), CodecError> {
    match value {
        WireValue::Int32(value) => encode_int(*value, out),
        WireValue::Handle(handle) => encode_handle(*handle, out),
        WireValue::Pose(pose) => encode_pose(pose, out),
        WireValue::JointVector(joints) => return encode_joints(joints, out),
        WireValue::Matrix2D(matrix) => return encode_matrix(matrix, out),
        WireValue::Line(line) => encode_line(line, out),
    }

    Ok(())
}

pub fn encode_int(value: i32, out: &mut Vec<u8>) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// A null handle still carries its kind on the wire.
pub fn encode_handle(handle: Handle, out: &mut Vec<u8>) {
    out.extend_from_slice(&handle.id.to_be_bytes());
    out.extend_from_slice(&handle.kind.to_be_bytes());
}

pub fn encode_pose(pose: &Pose, out: &mut Vec<u8>) {
    for value in pose.column_major() {
        encode_double(*value, out);
    }
}

pub fn encode_joints(joints: &JointVector, out: &mut Vec<u8>) -> Result<(), CodecError> {
    let values = joints.as_slice();
    if values.len() > MAX_WIRE_JOINTS {
        return Err(CodecError::CountOutOfRange {
            count: values.len() as i64,
            max: MAX_WIRE_JOINTS,
        });
    }

    encode_int(values.len() as i32, out);
    for value in values {
        encode_double(*value, out);
    }

    Ok(())
}

pub fn encode_matrix(matrix: &Matrix2D, out: &mut Vec<u8>) -> Result<(), CodecError> {
    let (rows, cols) = matrix.shape();
    let invalid = || CodecError::InvalidShape {
        rows: rows as i64,
        cols: cols as i64,
    };
    if matrix.column_major().len() > MAX_MATRIX_VALUES {
        return Err(invalid());
    }
    let (Ok(wire_rows), Ok(wire_cols)) = (i32::try_from(rows), i32::try_from(cols)) else {
        return Err(invalid());
    };

    encode_int(wire_rows, out);
    encode_int(wire_cols, out);
    for value in matrix.column_major() {
        encode_double(*value, out);
    }

    Ok(())
}

/// Escapes embedded newlines as `<br>` and appends the single terminator.
pub fn encode_line(line: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(line.replace('\n', LINE_BREAK_ESCAPE).as_bytes());
    out.push(b'\n');
}

fn encode_double(value: f64, out: &mut Vec<u8>) {
    out.extend_from_slice(&value.to_bits().to_be_bytes());
}

/// Decodes one value of `kind` from the front of `bytes`.
///
/// On success returns the value and the number of bytes it occupied.
pub fn decode(kind: WireKind, bytes: &[u8]) -> Result<(WireValue, usize), CodecError> {
    match kind {
        WireKind::Int32 => decode_int(bytes).map(|(v, n)| (WireValue::Int32(v), n)),
        WireKind::Handle => decode_handle(bytes).map(|(v, n)| (WireValue::Handle(v), n)),
        WireKind::Pose => decode_pose(bytes).map(|(v, n)| (WireValue::Pose(v), n)),
        WireKind::JointVector => decode_joints(bytes).map(|(v, n)| (WireValue::JointVector(v), n)),
        WireKind::Matrix2D => decode_matrix(bytes).map(|(v, n)| (WireValue::Matrix2D(v), n)),
        WireKind::Line => decode_line(bytes).map(|(v, n)| (WireValue::Line(v), n)),
    }
}

pub fn decode_int(bytes: &[u8]) -> Result<(i32, usize), CodecError> {
    let raw = take::<INT_LEN>(bytes, 0)?;
    Ok((i32::from_be_bytes(raw), INT_LEN))
}

pub fn decode_handle(bytes: &[u8]) -> Result<(Handle, usize), CodecError> {
    require(bytes, HANDLE_LEN)?;
    let id = u64::from_be_bytes(take::<8>(bytes, 0)?);
    let kind = i32::from_be_bytes(take::<4>(bytes, 8)?);
    Ok((Handle::new(id, kind), HANDLE_LEN))
}

pub fn decode_pose(bytes: &[u8]) -> Result<(Pose, usize), CodecError> {
    require(bytes, POSE_LEN)?;
    let mut values = [0.0; 16];
    for (index, slot) in values.iter_mut().enumerate() {
        *slot = decode_double(bytes, index * DOUBLE_LEN)?;
    }

    Ok((Pose::from_column_major(values), POSE_LEN))
}

pub fn decode_joints(bytes: &[u8]) -> Result<(JointVector, usize), CodecError> {
    let (count, header) = decode_int(bytes)?;
    if count < 0 || count as usize > MAX_WIRE_JOINTS {
        return Err(CodecError::CountOutOfRange {
            count: i64::from(count),
            max: MAX_WIRE_JOINTS,
        });
    }

    let count = count as usize;
    let total = header + count * DOUBLE_LEN;
    require(bytes, total)?;

    let values = (0..count)
        .map(|index| decode_double(bytes, header + index * DOUBLE_LEN))
        .collect::<Result<Vec<_>, _>>()?;

    Ok((JointVector::new(values), total))
}

pub fn decode_matrix(bytes: &[u8]) -> Result<(Matrix2D, usize), CodecError> {
    let (rows, _) = decode_int(bytes)?;
    let (cols, _) = decode_int(&bytes[INT_LEN.min(bytes.len())..]).map_err(|_| {
        CodecError::Incomplete {
            needed: 2 * INT_LEN,
            available: bytes.len(),
        }
    })?;

    let invalid = || CodecError::InvalidShape {
        rows: i64::from(rows),
        cols: i64::from(cols),
    };
    let rows = usize::try_from(rows).map_err(|_| invalid())?;
    let cols = usize::try_from(cols).map_err(|_| invalid())?;
    let count = rows
        .checked_mul(cols)
        .filter(|count| *count <= MAX_MATRIX_VALUES)
        .ok_or_else(invalid)?;
    let header = 2 * INT_LEN;
    let total = count
        .checked_mul(DOUBLE_LEN)
        .and_then(|len| len.checked_add(header))
        .ok_or_else(invalid)?;
    require(bytes, total)?;

    let values = (0..count)
        .map(|index| decode_double(bytes, header + index * DOUBLE_LEN))
        .collect::<Result<Vec<_>, _>>()?;

    let matrix = Matrix2D::from_column_major(rows, cols, values).ok_or_else(invalid)?;
    Ok((matrix, total))
}

/// Decodes one `\n`-terminated line; `<br>` is left as-is.
pub fn decode_line(bytes: &[u8]) -> Result<(String, usize), CodecError> {
    match bytes.iter().position(|byte| *byte == b'\n') {
        Some(end) if end < MAX_LINE_BYTES => {
            let text = String::from_utf8_lossy(&bytes[..end]).into_owned();
            Ok((text, end + 1))
        }
        Some(_) => Err(CodecError::LineTooLong {
            max: MAX_LINE_BYTES,
        }),
        None if bytes.len() >= MAX_LINE_BYTES => Err(CodecError::LineTooLong {
            max: MAX_LINE_BYTES,
        }),
        None => Err(CodecError::Incomplete {
            needed: bytes.len() + 1,
            available: bytes.len(),
        }),
    }
}

fn decode_double(bytes: &[u8], offset: usize) -> Result<f64, CodecError> {
    let raw = take::<DOUBLE_LEN>(bytes, offset)?;
    Ok(f64::from_bits(u64::from_be_bytes(raw)))
}

fn require(bytes: &[u8], needed: usize) -> Result<(), CodecError> {
    if bytes.len() < needed {
        return Err(CodecError::Incomplete {
            needed,
            available: bytes.len(),
        });
    }

    Ok(())
}

fn take<const N: usize>(bytes: &[u8], offset: usize) -> Result<[u8; N], CodecError> {
    require(bytes, offset + N)?;
    let mut raw = [0u8; N];
    raw.copy_from_slice(&bytes[offset..offset + N]);
    Ok(raw)
}
