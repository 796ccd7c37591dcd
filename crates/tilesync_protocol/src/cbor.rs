//! Small helpers over `ciborium::Value` maps.

use crate::error::{ProtocolError, ProtocolResult};
use ciborium::value::{Integer, Value};
use tilesync_core::{DimensionId, TileCoord};

pub(crate) type Pairs = Vec<(Value, Value)>;

pub(crate) fn key(name: &str) -> Value {
    Value::Text(name.to_string())
}

pub(crate) fn int<T: Into<Integer>>(value: T) -> Value {
    Value::Integer(value.into())
}

pub(crate) fn to_bytes(value: &Value) -> ProtocolResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf).map_err(|e| ProtocolError::EncodingFailed {
        message: e.to_string(),
    })?;
    Ok(buf)
}

pub(crate) fn from_bytes(bytes: &[u8]) -> ProtocolResult<Value> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::DecodingFailed {
        message: e.to_string(),
    })
}

pub(crate) fn as_map(value: &Value) -> ProtocolResult<&[(Value, Value)]> {
    value
        .as_map()
        .map(Vec::as_slice)
        .ok_or_else(|| ProtocolError::invalid_structure("expected map"))
}

pub(crate) fn get_field<'a>(map: &'a [(Value, Value)], name: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.as_text() == Some(name))
        .map(|(_, v)| v)
}

pub(crate) fn required<'a>(map: &'a [(Value, Value)], name: &str) -> ProtocolResult<&'a Value> {
    get_field(map, name).ok_or_else(|| ProtocolError::missing_field(name))
}

pub(crate) fn int_field<T: TryFrom<i128>>(map: &[(Value, Value)], name: &str) -> ProtocolResult<T> {
    required(map, name)?
        .as_integer()
        .and_then(|i| T::try_from(i128::from(i)).ok())
        .ok_or_else(|| ProtocolError::missing_field(name))
}

pub(crate) fn bool_field(map: &[(Value, Value)], name: &str) -> ProtocolResult<bool> {
    required(map, name)?
        .as_bool()
        .ok_or_else(|| ProtocolError::missing_field(name))
}

pub(crate) fn text_field<'a>(map: &'a [(Value, Value)], name: &str) -> ProtocolResult<&'a str> {
    required(map, name)?
        .as_text()
        .ok_or_else(|| ProtocolError::missing_field(name))
}

pub(crate) fn bytes_field<'a>(map: &'a [(Value, Value)], name: &str) -> ProtocolResult<&'a [u8]> {
    required(map, name)?
        .as_bytes()
        .map(Vec::as_slice)
        .ok_or_else(|| ProtocolError::missing_field(name))
}

/// Absent arrays decode as empty.
pub(crate) fn array_field<'a>(
    map: &'a [(Value, Value)],
    name: &str,
) -> ProtocolResult<&'a [Value]> {
    match get_field(map, name) {
        None => Ok(&[]),
        Some(v) => v
            .as_array()
            .map(Vec::as_slice)
            .ok_or_else(|| ProtocolError::missing_field(name)),
    }
}

pub(crate) fn push_coord(pairs: &mut Pairs, coord: &TileCoord) {
    pairs.push((key("dimension"), Value::Text(coord.dimension.to_string())));
    pairs.push((key("x"), int(coord.x)));
    pairs.push((key("z"), int(coord.z)));
}

pub(crate) fn coord_field(map: &[(Value, Value)]) -> ProtocolResult<TileCoord> {
    let dimension = DimensionId::parse(text_field(map, "dimension")?)?;
    Ok(TileCoord::new(
        dimension,
        int_field(map, "x")?,
        int_field(map, "z")?,
    ))
}

pub(crate) fn dimension_list(dimensions: &[DimensionId]) -> Value {
    Value::Array(
        dimensions
            .iter()
            .map(|d| Value::Text(d.to_string()))
            .collect(),
    )
}

pub(crate) fn dimension_list_field(
    map: &[(Value, Value)],
    name: &str,
) -> ProtocolResult<Vec<DimensionId>> {
    array_field(map, name)?
        .iter()
        .map(|v| {
            let text = v.as_text().ok_or_else(|| ProtocolError::missing_field(name))?;
            Ok(DimensionId::parse(text)?)
        })
        .collect()
}
