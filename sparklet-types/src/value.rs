use paste::paste;
use thiserror::Error;

use crate::Metric;

/// The version independent set of datatypes a metric value can take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float,
    Double,
    Boolean,
    String,
    Bytes,
    DataSet,
    Template,
}

impl DataType {
    /// Returns true if values of this type can be stored in a [DataSet] cell
    pub fn is_dataset_cell(&self) -> bool {
        !matches!(self, DataType::Bytes | DataType::DataSet | DataType::Template)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ValueError {
    #[error("Expected a value of type {expected:?} but found {found:?}")]
    Incompatible { expected: DataType, found: DataType },
    #[error("DataSet row has {found} values but the dataset has {expected} columns")]
    RowLength { expected: usize, found: usize },
    #[error("DataSet columns cannot hold values of type {0:?}")]
    UnsupportedCellType(DataType),
}

/// A tabular value made up of typed columns
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataSet {
    columns: Vec<String>,
    types: Vec<DataType>,
    rows: Vec<Vec<MetricValue>>,
}

impl DataSet {
    /// Create an empty dataset with the given column names and types
    pub fn new<S: Into<String>>(columns: Vec<(S, DataType)>) -> Result<Self, ValueError> {
        let mut names = Vec::with_capacity(columns.len());
        let mut types = Vec::with_capacity(columns.len());
        for (name, datatype) in columns {
            if !datatype.is_dataset_cell() {
                return Err(ValueError::UnsupportedCellType(datatype));
            }
            names.push(name.into());
            types.push(datatype);
        }
        Ok(Self {
            columns: names,
            types,
            rows: Vec::new(),
        })
    }

    /// Append a row. Every value must match the type of its column.
    pub fn push_row(&mut self, row: Vec<MetricValue>) -> Result<(), ValueError> {
        if row.len() != self.types.len() {
            return Err(ValueError::RowLength {
                expected: self.types.len(),
                found: row.len(),
            });
        }
        for (value, expected) in row.iter().zip(self.types.iter()) {
            let found = value.datatype();
            if found != *expected {
                return Err(ValueError::Incompatible {
                    expected: *expected,
                    found,
                });
            }
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn types(&self) -> &[DataType] {
        &self.types
    }

    pub fn rows(&self) -> &[Vec<MetricValue>] {
        &self.rows
    }
}

/// A template definition or instance.
///
/// Templates are carried as opaque nested metric collections, no definition registry is kept.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    pub version: Option<String>,
    pub template_ref: Option<String>,
    pub is_definition: bool,
    pub metrics: Vec<Metric>,
}

/// The value of a metric
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    String(String),
    Bytes(Vec<u8>),
    DataSet(DataSet),
    Template(Template),
}

impl MetricValue {
    /// Get the [DataType] of the value
    pub fn datatype(&self) -> DataType {
        match self {
            MetricValue::Int32(_) => DataType::Int32,
            MetricValue::Int64(_) => DataType::Int64,
            MetricValue::UInt32(_) => DataType::UInt32,
            MetricValue::UInt64(_) => DataType::UInt64,
            MetricValue::Float(_) => DataType::Float,
            MetricValue::Double(_) => DataType::Double,
            MetricValue::Boolean(_) => DataType::Boolean,
            MetricValue::String(_) => DataType::String,
            MetricValue::Bytes(_) => DataType::Bytes,
            MetricValue::DataSet(_) => DataType::DataSet,
            MetricValue::Template(_) => DataType::Template,
        }
    }

    /// Reinterpret the value as `target`.
    ///
    /// Wire formats do not always distinguish signed and unsigned integers of the same width, so
    /// the bits of an `Int32` may be reinterpreted as a `UInt32` (and `Int64` as `UInt64`) and vice versa.
    /// Any other change of type is an error.
    pub fn reinterpret(self, target: DataType) -> Result<Self, ValueError> {
        let found = self.datatype();
        if found == target {
            return Ok(self);
        }
        match (self, target) {
            (MetricValue::Int32(v), DataType::UInt32) => Ok(MetricValue::UInt32(v as u32)),
            (MetricValue::UInt32(v), DataType::Int32) => Ok(MetricValue::Int32(v as i32)),
            (MetricValue::Int64(v), DataType::UInt64) => Ok(MetricValue::UInt64(v as u64)),
            (MetricValue::UInt64(v), DataType::Int64) => Ok(MetricValue::Int64(v as i64)),
            _ => Err(ValueError::Incompatible {
                expected: target,
                found,
            }),
        }
    }

    /// Interpret an integer value as an unsigned session counter
    pub fn as_counter(&self) -> Option<u64> {
        match self {
            MetricValue::Int32(v) => u64::try_from(*v).ok(),
            MetricValue::Int64(v) => u64::try_from(*v).ok(),
            MetricValue::UInt32(v) => Some(*v as u64),
            MetricValue::UInt64(v) => Some(*v),
            _ => None,
        }
    }
}

macro_rules! impl_value_conversions {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for MetricValue {
                fn from(value: $ty) -> Self {
                    MetricValue::$variant(value)
                }
            }

            impl TryFrom<MetricValue> for $ty {
                type Error = ValueError;

                fn try_from(value: MetricValue) -> Result<Self, Self::Error> {
                    match value {
                        MetricValue::$variant(v) => Ok(v),
                        other => Err(ValueError::Incompatible {
                            expected: DataType::$variant,
                            found: other.datatype(),
                        }),
                    }
                }
            }

            paste! {
                impl MetricValue {
                    #[doc = "Borrow the inner value if it is a `" $variant "`"]
                    pub fn [<as_ $variant:lower>](&self) -> Option<&$ty> {
                        match self {
                            MetricValue::$variant(v) => Some(v),
                            _ => None,
                        }
                    }
                }
            }
        )*
    };
}

impl_value_conversions!(
    i32 => Int32,
    i64 => Int64,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
    bool => Boolean,
    String => String,
    Vec<u8> => Bytes,
    DataSet => DataSet,
    Template => Template,
);

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::String(value.to_string())
    }
}
