use std::sync::Arc;

use prost::Message;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    constants::{SEQ, SPAV10, SPBV10},
    generated::{
        kura_payload::{
            kura_payload::{kura_metric::ValueType, KuraMetric},
            KuraPayload,
        },
        sparkplug_payload::{
            self as spb,
            payload::{data_set, metric::Value as WireValue},
        },
    },
    utils::timestamp,
    DataSet, DataType, Metric, MetricValue, Template, ValueError,
};

/// Protocol revision. Selects the topic namespace and the wire payload encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Revision {
    A,
    #[default]
    B,
}

impl Revision {
    pub fn namespace(&self) -> &'static str {
        match self {
            Revision::A => SPAV10,
            Revision::B => SPBV10,
        }
    }

    pub fn from_namespace(namespace: &str) -> Option<Self> {
        match namespace {
            SPAV10 => Some(Revision::A),
            SPBV10 => Some(Revision::B),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Malformed payload: {0}")]
    Malformed(#[from] prost::DecodeError),
    #[error("Metric {metric} declares type {declared:?} but carries an incompatible value")]
    TypeMismatch { metric: String, declared: DataType },
    #[error("Unknown datatype {0}")]
    UnknownDataType(u32),
    #[error("Metric has neither a name nor an alias")]
    MissingIdentifier,
    #[error("Type {0:?} cannot be carried by revision {1:?}")]
    UnsupportedType(DataType, Revision),
    #[error("Metric {0} has no value and is not marked null")]
    MissingValue(String),
    #[error("Metric {0} is null and revision A has no null representation")]
    NullUnsupported(String),
    #[error("Metric name {0} is reserved")]
    ReservedName(String),
    #[error("Sequence number {0} is out of range")]
    SequenceOutOfRange(u64),
    #[error("Invalid dataset: {0}")]
    InvalidDataSet(#[from] ValueError),
}

/// Payload level information that accompanies a set of metrics
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SessionMeta {
    /// Payload timestamp. The current time is used when encoding if not set.
    pub timestamp: Option<u64>,
    pub seq: Option<u8>,
}

impl SessionMeta {
    pub fn new(seq: Option<u8>) -> Self {
        Self {
            timestamp: None,
            seq,
        }
    }
}

/// Converts between version independent metrics and the wire payload of a protocol revision.
pub trait PayloadCodec: Send + Sync {
    fn revision(&self) -> Revision;
    fn encode(&self, metrics: &[Metric], meta: &SessionMeta) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<(Vec<Metric>, SessionMeta), CodecError>;
}

/// Get the codec for a protocol revision
pub fn codec_for(revision: Revision) -> Arc<dyn PayloadCodec> {
    match revision {
        Revision::A => Arc::new(SparkplugA),
        Revision::B => Arc::new(SparkplugB),
    }
}

fn check_declared(metric: &Metric) -> Result<(), CodecError> {
    match &metric.value {
        Some(value) if value.datatype() != metric.datatype => Err(CodecError::TypeMismatch {
            metric: metric.display_id(),
            declared: metric.datatype,
        }),
        _ => Ok(()),
    }
}

fn seq_from_wire(seq: u64) -> Result<u8, CodecError> {
    u8::try_from(seq).map_err(|_| CodecError::SequenceOutOfRange(seq))
}

/// Sparkplug B
#[derive(Debug, Clone, Copy, Default)]
pub struct SparkplugB;

impl SparkplugB {
    fn to_wire_type(datatype: DataType) -> spb::DataType {
        match datatype {
            DataType::Int32 => spb::DataType::Int32,
            DataType::Int64 => spb::DataType::Int64,
            DataType::UInt32 => spb::DataType::UInt32,
            DataType::UInt64 => spb::DataType::UInt64,
            DataType::Float => spb::DataType::Float,
            DataType::Double => spb::DataType::Double,
            DataType::Boolean => spb::DataType::Boolean,
            DataType::String => spb::DataType::String,
            DataType::Bytes => spb::DataType::Bytes,
            DataType::DataSet => spb::DataType::DataSet,
            DataType::Template => spb::DataType::Template,
        }
    }

    fn from_wire_type(id: u32) -> Result<DataType, CodecError> {
        let wire = i32::try_from(id)
            .ok()
            .and_then(|v| spb::DataType::try_from(v).ok())
            .ok_or(CodecError::UnknownDataType(id))?;
        let datatype = match wire {
            spb::DataType::Int8 | spb::DataType::Int16 | spb::DataType::Int32 => DataType::Int32,
            spb::DataType::Int64 => DataType::Int64,
            spb::DataType::UInt8 | spb::DataType::UInt16 | spb::DataType::UInt32 => {
                DataType::UInt32
            }
            spb::DataType::UInt64 | spb::DataType::DateTime => DataType::UInt64,
            spb::DataType::Float => DataType::Float,
            spb::DataType::Double => DataType::Double,
            spb::DataType::Boolean => DataType::Boolean,
            spb::DataType::String | spb::DataType::Text | spb::DataType::Uuid => DataType::String,
            spb::DataType::Bytes | spb::DataType::File => DataType::Bytes,
            spb::DataType::DataSet => DataType::DataSet,
            spb::DataType::Template => DataType::Template,
            spb::DataType::Unknown => return Err(CodecError::UnknownDataType(id)),
        };
        Ok(datatype)
    }

    fn infer_type(value: &WireValue) -> DataType {
        match value {
            WireValue::IntValue(_) => DataType::Int32,
            WireValue::LongValue(_) => DataType::Int64,
            WireValue::FloatValue(_) => DataType::Float,
            WireValue::DoubleValue(_) => DataType::Double,
            WireValue::BooleanValue(_) => DataType::Boolean,
            WireValue::StringValue(_) => DataType::String,
            WireValue::BytesValue(_) => DataType::Bytes,
            WireValue::DatasetValue(_) => DataType::DataSet,
            WireValue::TemplateValue(_) => DataType::Template,
        }
    }

    fn encode_value(value: &MetricValue) -> Result<WireValue, CodecError> {
        let wire = match value {
            MetricValue::Int32(v) => WireValue::IntValue(*v as u32),
            MetricValue::Int64(v) => WireValue::LongValue(*v as u64),
            MetricValue::UInt32(v) => WireValue::IntValue(*v),
            MetricValue::UInt64(v) => WireValue::LongValue(*v),
            MetricValue::Float(v) => WireValue::FloatValue(*v),
            MetricValue::Double(v) => WireValue::DoubleValue(*v),
            MetricValue::Boolean(v) => WireValue::BooleanValue(*v),
            MetricValue::String(v) => WireValue::StringValue(v.clone()),
            MetricValue::Bytes(v) => WireValue::BytesValue(v.clone()),
            MetricValue::DataSet(ds) => WireValue::DatasetValue(Self::encode_dataset(ds)),
            MetricValue::Template(t) => WireValue::TemplateValue(Self::encode_template(t)?),
        };
        Ok(wire)
    }

    fn decode_value(
        name: &str,
        declared: DataType,
        value: WireValue,
    ) -> Result<MetricValue, CodecError> {
        let value = match (declared, value) {
            (DataType::Int32, WireValue::IntValue(v)) => MetricValue::Int32(v as i32),
            (DataType::UInt32, WireValue::IntValue(v)) => MetricValue::UInt32(v),
            (DataType::Int64, WireValue::LongValue(v)) => MetricValue::Int64(v as i64),
            (DataType::UInt64, WireValue::LongValue(v)) => MetricValue::UInt64(v),
            (DataType::Float, WireValue::FloatValue(v)) => MetricValue::Float(v),
            (DataType::Double, WireValue::DoubleValue(v)) => MetricValue::Double(v),
            (DataType::Boolean, WireValue::BooleanValue(v)) => MetricValue::Boolean(v),
            (DataType::String, WireValue::StringValue(v)) => MetricValue::String(v),
            (DataType::Bytes, WireValue::BytesValue(v)) => MetricValue::Bytes(v),
            (DataType::DataSet, WireValue::DatasetValue(ds)) => {
                MetricValue::DataSet(Self::decode_dataset(name, ds)?)
            }
            (DataType::Template, WireValue::TemplateValue(t)) => {
                MetricValue::Template(Self::decode_template(t)?)
            }
            (declared, _) => {
                return Err(CodecError::TypeMismatch {
                    metric: name.to_string(),
                    declared,
                })
            }
        };
        Ok(value)
    }

    fn encode_dataset(ds: &DataSet) -> spb::payload::DataSet {
        use data_set::data_set_value::Value as Cell;
        let rows = ds
            .rows()
            .iter()
            .map(|row| data_set::Row {
                elements: row
                    .iter()
                    .map(|v| data_set::DataSetValue {
                        value: match v {
                            MetricValue::Int32(v) => Some(Cell::IntValue(*v as u32)),
                            MetricValue::UInt32(v) => Some(Cell::IntValue(*v)),
                            MetricValue::Int64(v) => Some(Cell::LongValue(*v as u64)),
                            MetricValue::UInt64(v) => Some(Cell::LongValue(*v)),
                            MetricValue::Float(v) => Some(Cell::FloatValue(*v)),
                            MetricValue::Double(v) => Some(Cell::DoubleValue(*v)),
                            MetricValue::Boolean(v) => Some(Cell::BooleanValue(*v)),
                            MetricValue::String(v) => Some(Cell::StringValue(v.clone())),
                            // rejected by DataSet::push_row
                            MetricValue::Bytes(_)
                            | MetricValue::DataSet(_)
                            | MetricValue::Template(_) => None,
                        },
                    })
                    .collect(),
            })
            .collect();
        spb::payload::DataSet {
            num_of_columns: Some(ds.columns().len() as u64),
            columns: ds.columns().to_vec(),
            types: ds
                .types()
                .iter()
                .map(|t| Self::to_wire_type(*t) as u32)
                .collect(),
            rows,
        }
    }

    fn decode_dataset(name: &str, ds: spb::payload::DataSet) -> Result<DataSet, CodecError> {
        use data_set::data_set_value::Value as Cell;
        if ds.columns.len() != ds.types.len() {
            return Err(ValueError::RowLength {
                expected: ds.columns.len(),
                found: ds.types.len(),
            }
            .into());
        }
        let types = ds
            .types
            .iter()
            .map(|t| Self::from_wire_type(*t))
            .collect::<Result<Vec<_>, _>>()?;
        let mut dataset = DataSet::new(
            ds.columns
                .into_iter()
                .zip(types.iter().copied())
                .collect::<Vec<_>>(),
        )?;
        for row in ds.rows {
            if row.elements.len() != types.len() {
                return Err(ValueError::RowLength {
                    expected: types.len(),
                    found: row.elements.len(),
                }
                .into());
            }
            let mut values = Vec::with_capacity(types.len());
            for (cell, declared) in row.elements.into_iter().zip(types.iter()) {
                let value = match (declared, cell.value) {
                    (DataType::Int32, Some(Cell::IntValue(v))) => MetricValue::Int32(v as i32),
                    (DataType::UInt32, Some(Cell::IntValue(v))) => MetricValue::UInt32(v),
                    (DataType::Int64, Some(Cell::LongValue(v))) => MetricValue::Int64(v as i64),
                    (DataType::UInt64, Some(Cell::LongValue(v))) => MetricValue::UInt64(v),
                    (DataType::Float, Some(Cell::FloatValue(v))) => MetricValue::Float(v),
                    (DataType::Double, Some(Cell::DoubleValue(v))) => MetricValue::Double(v),
                    (DataType::Boolean, Some(Cell::BooleanValue(v))) => MetricValue::Boolean(v),
                    (DataType::String, Some(Cell::StringValue(v))) => MetricValue::String(v),
                    (declared, _) => {
                        return Err(CodecError::TypeMismatch {
                            metric: name.to_string(),
                            declared: *declared,
                        })
                    }
                };
                values.push(value);
            }
            dataset.push_row(values)?;
        }
        Ok(dataset)
    }

    fn encode_template(template: &Template) -> Result<spb::payload::Template, CodecError> {
        Ok(spb::payload::Template {
            version: template.version.clone(),
            metrics: template
                .metrics
                .iter()
                .map(Self::encode_metric)
                .collect::<Result<_, _>>()?,
            template_ref: template.template_ref.clone(),
            is_definition: Some(template.is_definition),
        })
    }

    fn decode_template(template: spb::payload::Template) -> Result<Template, CodecError> {
        Ok(Template {
            version: template.version,
            template_ref: template.template_ref,
            is_definition: template.is_definition.unwrap_or(false),
            metrics: template
                .metrics
                .into_iter()
                .map(|m| Self::decode_metric(m, 0))
                .collect::<Result<_, _>>()?,
        })
    }

    fn encode_metric(metric: &Metric) -> Result<spb::payload::Metric, CodecError> {
        if metric.name.is_none() && metric.alias.is_none() {
            return Err(CodecError::MissingIdentifier);
        }
        check_declared(metric)?;
        let value = metric.value.as_ref().map(Self::encode_value).transpose()?;
        Ok(spb::payload::Metric {
            name: metric.name.clone(),
            alias: metric.alias,
            timestamp: Some(metric.timestamp),
            datatype: Some(Self::to_wire_type(metric.datatype) as u32),
            is_historical: metric.is_historical.then_some(true),
            is_transient: metric.is_transient.then_some(true),
            is_null: value.is_none().then_some(true),
            value,
        })
    }

    fn decode_metric(
        metric: spb::payload::Metric,
        payload_timestamp: u64,
    ) -> Result<Metric, CodecError> {
        if metric.name.is_none() && metric.alias.is_none() {
            return Err(CodecError::MissingIdentifier);
        }
        let display = match (&metric.name, metric.alias) {
            (Some(name), _) => name.clone(),
            (None, Some(alias)) => format!("alias:{alias}"),
            (None, None) => String::new(),
        };
        let is_null = metric.is_null.unwrap_or(false);
        let datatype = match (metric.datatype, &metric.value) {
            (Some(id), _) => Self::from_wire_type(id)?,
            (None, Some(value)) => Self::infer_type(value),
            (None, None) => return Err(CodecError::MissingValue(display)),
        };
        let value = match (is_null, metric.value) {
            (true, _) => None,
            (false, Some(value)) => Some(Self::decode_value(&display, datatype, value)?),
            (false, None) => return Err(CodecError::MissingValue(display)),
        };
        Ok(Metric {
            name: metric.name,
            alias: metric.alias,
            timestamp: metric.timestamp.unwrap_or(payload_timestamp),
            datatype,
            value,
            is_historical: metric.is_historical.unwrap_or(false),
            is_transient: metric.is_transient.unwrap_or(false),
        })
    }
}

impl PayloadCodec for SparkplugB {
    fn revision(&self) -> Revision {
        Revision::B
    }

    fn encode(&self, metrics: &[Metric], meta: &SessionMeta) -> Result<Vec<u8>, CodecError> {
        let payload = spb::Payload {
            timestamp: Some(meta.timestamp.unwrap_or_else(timestamp)),
            metrics: metrics
                .iter()
                .map(Self::encode_metric)
                .collect::<Result<_, _>>()?,
            seq: meta.seq.map(u64::from),
            uuid: None,
            body: None,
        };
        Ok(payload.encode_to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<(Vec<Metric>, SessionMeta), CodecError> {
        let payload = spb::Payload::decode(bytes)?;
        let seq = payload.seq.map(seq_from_wire).transpose()?;
        let payload_timestamp = payload.timestamp.unwrap_or(0);
        let metrics = payload
            .metrics
            .into_iter()
            .map(|m| Self::decode_metric(m, payload_timestamp))
            .collect::<Result<_, _>>()?;
        Ok((
            metrics,
            SessionMeta {
                timestamp: payload.timestamp,
                seq,
            },
        ))
    }
}

/// Sparkplug A.
///
/// The Kura payload has no sequence field so the sequence number is carried by the reserved `seq` metric.
/// Metric timestamps and aliases are not representable; decoded metrics take the payload timestamp.
#[derive(Debug, Clone, Copy, Default)]
pub struct SparkplugA;

impl SparkplugA {
    fn encode_metric(metric: &Metric) -> Result<KuraMetric, CodecError> {
        let name = metric.name.clone().ok_or(CodecError::MissingIdentifier)?;
        if name == SEQ {
            return Err(CodecError::ReservedName(name));
        }
        check_declared(metric)?;
        let value = metric
            .value
            .as_ref()
            .ok_or_else(|| CodecError::NullUnsupported(name.clone()))?;
        let mut kura = KuraMetric {
            name,
            ..Default::default()
        };
        let value_type = match value {
            MetricValue::Double(v) => {
                kura.double_value = Some(*v);
                ValueType::Double
            }
            MetricValue::Float(v) => {
                kura.float_value = Some(*v);
                ValueType::Float
            }
            MetricValue::Int64(v) => {
                kura.long_value = Some(*v);
                ValueType::Int64
            }
            MetricValue::Int32(v) => {
                kura.int_value = Some(*v);
                ValueType::Int32
            }
            MetricValue::Boolean(v) => {
                kura.bool_value = Some(*v);
                ValueType::Bool
            }
            MetricValue::String(v) => {
                kura.string_value = Some(v.clone());
                ValueType::String
            }
            MetricValue::Bytes(v) => {
                kura.bytes_value = Some(v.clone());
                ValueType::Bytes
            }
            other => return Err(CodecError::UnsupportedType(other.datatype(), Revision::A)),
        };
        kura.r#type = value_type as i32;
        Ok(kura)
    }

    fn decode_metric(metric: KuraMetric, timestamp: u64) -> Result<Metric, CodecError> {
        let value_type = ValueType::try_from(metric.r#type)
            .map_err(|_| CodecError::UnknownDataType(metric.r#type as u32))?;
        let (declared, value) = match value_type {
            ValueType::Double => (DataType::Double, metric.double_value.map(MetricValue::Double)),
            ValueType::Float => (DataType::Float, metric.float_value.map(MetricValue::Float)),
            ValueType::Int64 => (DataType::Int64, metric.long_value.map(MetricValue::Int64)),
            ValueType::Int32 => (DataType::Int32, metric.int_value.map(MetricValue::Int32)),
            ValueType::Bool => (DataType::Boolean, metric.bool_value.map(MetricValue::Boolean)),
            ValueType::String => (DataType::String, metric.string_value.map(MetricValue::String)),
            ValueType::Bytes => (DataType::Bytes, metric.bytes_value.map(MetricValue::Bytes)),
        };
        let value = value.ok_or_else(|| CodecError::TypeMismatch {
            metric: metric.name.clone(),
            declared,
        })?;
        Ok(Metric {
            name: Some(metric.name),
            alias: None,
            timestamp,
            datatype: declared,
            value: Some(value),
            is_historical: false,
            is_transient: false,
        })
    }
}

impl PayloadCodec for SparkplugA {
    fn revision(&self) -> Revision {
        Revision::A
    }

    fn encode(&self, metrics: &[Metric], meta: &SessionMeta) -> Result<Vec<u8>, CodecError> {
        let mut kura_metrics = metrics
            .iter()
            .map(Self::encode_metric)
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(seq) = meta.seq {
            kura_metrics.push(KuraMetric {
                name: SEQ.to_string(),
                r#type: ValueType::Int64 as i32,
                long_value: Some(seq as i64),
                ..Default::default()
            });
        }
        let payload = KuraPayload {
            timestamp: Some(meta.timestamp.unwrap_or_else(timestamp) as i64),
            metric: kura_metrics,
            body: None,
        };
        Ok(payload.encode_to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<(Vec<Metric>, SessionMeta), CodecError> {
        let payload = KuraPayload::decode(bytes)?;
        let payload_timestamp = payload.timestamp.and_then(|t| u64::try_from(t).ok());
        let mut seq = None;
        let mut metrics = Vec::with_capacity(payload.metric.len());
        for kura in payload.metric {
            if kura.name == SEQ {
                let raw = match (kura.long_value, kura.int_value) {
                    (Some(v), _) => v,
                    (None, Some(v)) => v as i64,
                    (None, None) => {
                        return Err(CodecError::TypeMismatch {
                            metric: SEQ.to_string(),
                            declared: DataType::Int64,
                        })
                    }
                };
                let raw = u64::try_from(raw).map_err(|_| CodecError::SequenceOutOfRange(raw as u64))?;
                seq = Some(seq_from_wire(raw)?);
                continue;
            }
            metrics.push(Self::decode_metric(kura, payload_timestamp.unwrap_or(0))?);
        }
        Ok((
            metrics,
            SessionMeta {
                timestamp: payload_timestamp,
                seq,
            },
        ))
    }
}
