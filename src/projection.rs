//! Projection of caller data into the [`Dict`] tree the template engine walks.
//!
//! Any `serde::Serialize` type projects: structs and maps become dictionaries,
//! sequences become [`Value::Seq`], and scalars are carried through. Image and
//! markup values are recognised by private newtype-struct names, so they survive
//! the trip through serde without being flattened into bytes.

use std::fmt;
use std::path::Path;

use serde::ser::{self, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::images::{self, InlineImage, IMAGE_TOKEN};
use crate::value::{Dict, Markup, Value, MARKUP_TOKEN};

/// Project caller data into a dictionary.
///
/// `None`/unit input is [`Error::NoData`]; anything that is not a record or a
/// map is [`Error::NotARecord`].
pub fn project<T: Serialize + ?Sized>(data: &T) -> Result<Dict> {
    match to_value(data)? {
        Value::Null => Err(Error::NoData),
        Value::Dict(dict) => Ok(dict),
        other => Err(Error::NotARecord { kind: other.kind() }),
    }
}

/// Convert any serializable value into a [`Value`].
pub fn to_value<T: Serialize + ?Sized>(data: &T) -> Result<Value> {
    data.serialize(ValueSerializer)
        .map_err(|e| Error::Serialize(e.0))
}

/// Replace image-valued entries with injected drawing markup, in place.
///
/// Strings naming an existing `.png`/`.jpg`/`.jpeg` file are loaded and injected;
/// explicit [`InlineImage`] values are always injected. Everything else is left
/// for the evaluator.
pub fn resolve_tag_values<F>(dict: &mut Dict, inject: &mut F) -> Result<()>
where
    F: FnMut(&InlineImage) -> Result<Markup>,
{
    for (key, value) in dict.iter_mut() {
        resolve_value(key, value, inject)?;
    }
    Ok(())
}

fn resolve_value<F>(key: &str, value: &mut Value, inject: &mut F) -> Result<()>
where
    F: FnMut(&InlineImage) -> Result<Markup>,
{
    match value {
        Value::String(s) => {
            if images::is_image_path(Path::new(s.as_str()))? {
                debug!("Resolving {} as image file {}", key, s);
                let image = InlineImage::from_path(s.as_str())?;
                *value = Value::Markup(inject(&image)?);
            }
        }
        Value::Image(image) => {
            debug!("Resolving {} as inline image", key);
            let markup = inject(image)?;
            *value = Value::Markup(markup);
        }
        Value::Dict(dict) => resolve_tag_values(dict, inject)?,
        Value::Seq(items) => {
            for item in items.iter_mut() {
                resolve_value(key, item, inject)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[derive(Debug)]
pub(crate) struct SerializeError(String);

impl fmt::Display for SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for SerializeError {}

impl ser::Error for SerializeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        SerializeError(msg.to_string())
    }
}

type SerResult<T> = std::result::Result<T, SerializeError>;

pub(crate) struct ValueSerializer;

impl ser::Serializer for ValueSerializer {
    type Ok = Value;
    type Error = SerializeError;

    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = VariantSeqBuilder;
    type SerializeMap = MapBuilder;
    type SerializeStruct = MapBuilder;
    type SerializeStructVariant = VariantMapBuilder;

    fn serialize_bool(self, v: bool) -> SerResult<Value> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> SerResult<Value> {
        Ok(Value::Int(v.into()))
    }

    fn serialize_i16(self, v: i16) -> SerResult<Value> {
        Ok(Value::Int(v.into()))
    }

    fn serialize_i32(self, v: i32) -> SerResult<Value> {
        Ok(Value::Int(v.into()))
    }

    fn serialize_i64(self, v: i64) -> SerResult<Value> {
        Ok(Value::Int(v))
    }

    fn serialize_u8(self, v: u8) -> SerResult<Value> {
        Ok(Value::Uint(v.into()))
    }

    fn serialize_u16(self, v: u16) -> SerResult<Value> {
        Ok(Value::Uint(v.into()))
    }

    fn serialize_u32(self, v: u32) -> SerResult<Value> {
        Ok(Value::Uint(v.into()))
    }

    fn serialize_u64(self, v: u64) -> SerResult<Value> {
        Ok(Value::Uint(v))
    }

    fn serialize_f32(self, v: f32) -> SerResult<Value> {
        Ok(Value::Float(v.into()))
    }

    fn serialize_f64(self, v: f64) -> SerResult<Value> {
        Ok(Value::Float(v))
    }

    fn serialize_char(self, v: char) -> SerResult<Value> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> SerResult<Value> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> SerResult<Value> {
        Ok(Value::Bytes(v.to_vec()))
    }

    fn serialize_none(self) -> SerResult<Value> {
        Ok(Value::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> SerResult<Value> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> SerResult<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> SerResult<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> SerResult<Value> {
        Ok(Value::String(variant.to_string()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        value: &T,
    ) -> SerResult<Value> {
        match name {
            MARKUP_TOKEN => match value.serialize(self)? {
                Value::String(markup) => Ok(Value::Markup(Markup::raw(markup))),
                other => Err(SerializeError(format!(
                    "markup must be a string, got {}",
                    other.kind()
                ))),
            },
            IMAGE_TOKEN => match value.serialize(self)? {
                Value::Seq(parts) => match <[Value; 2]>::try_from(parts) {
                    Ok([Value::String(ext), Value::Bytes(data)]) => {
                        Ok(Value::Image(InlineImage::from_bytes(data, &ext)))
                    }
                    _ => Err(SerializeError("malformed inline image".to_string())),
                },
                _ => Err(SerializeError("malformed inline image".to_string())),
            },
            _ => value.serialize(self),
        }
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> SerResult<Value> {
        let mut dict = Dict::new();
        dict.insert(variant.to_string(), value.serialize(ValueSerializer)?);
        Ok(Value::Dict(dict))
    }

    fn serialize_seq(self, len: Option<usize>) -> SerResult<SeqBuilder> {
        Ok(SeqBuilder {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> SerResult<SeqBuilder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> SerResult<SeqBuilder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> SerResult<VariantSeqBuilder> {
        Ok(VariantSeqBuilder {
            variant,
            items: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> SerResult<MapBuilder> {
        Ok(MapBuilder::default())
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> SerResult<MapBuilder> {
        Ok(MapBuilder::default())
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> SerResult<VariantMapBuilder> {
        Ok(VariantMapBuilder {
            variant,
            dict: Dict::new(),
        })
    }
}

pub(crate) struct SeqBuilder {
    items: Vec<Value>,
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = Value;
    type Error = SerializeError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> SerResult<()> {
        self.items.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> SerResult<Value> {
        Ok(Value::Seq(self.items))
    }
}

impl ser::SerializeTuple for SeqBuilder {
    type Ok = Value;
    type Error = SerializeError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> SerResult<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> SerResult<Value> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SeqBuilder {
    type Ok = Value;
    type Error = SerializeError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> SerResult<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> SerResult<Value> {
        ser::SerializeSeq::end(self)
    }
}

pub(crate) struct VariantSeqBuilder {
    variant: &'static str,
    items: Vec<Value>,
}

impl ser::SerializeTupleVariant for VariantSeqBuilder {
    type Ok = Value;
    type Error = SerializeError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> SerResult<()> {
        self.items.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> SerResult<Value> {
        let mut dict = Dict::new();
        dict.insert(self.variant.to_string(), Value::Seq(self.items));
        Ok(Value::Dict(dict))
    }
}

#[derive(Default)]
pub(crate) struct MapBuilder {
    dict: Dict,
    pending_key: Option<String>,
}

fn key_to_string(key: Value) -> SerResult<String> {
    match key {
        Value::String(s) => Ok(s),
        Value::Bool(_) | Value::Int(_) | Value::Uint(_) | Value::Float(_) => key
            .as_text()
            .map(|text| text.into_owned())
            .ok_or_else(|| SerializeError("unrepresentable map key".to_string())),
        other => Err(SerializeError(format!(
            "map keys must be strings, got {}",
            other.kind()
        ))),
    }
}

impl ser::SerializeMap for MapBuilder {
    type Ok = Value;
    type Error = SerializeError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> SerResult<()> {
        self.pending_key = Some(key_to_string(key.serialize(ValueSerializer)?)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> SerResult<()> {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| SerializeError("map value without a key".to_string()))?;
        self.dict.insert(key, value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> SerResult<Value> {
        Ok(Value::Dict(self.dict))
    }
}

impl ser::SerializeStruct for MapBuilder {
    type Ok = Value;
    type Error = SerializeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> SerResult<()> {
        self.dict
            .insert(key.to_string(), value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> SerResult<Value> {
        Ok(Value::Dict(self.dict))
    }
}

pub(crate) struct VariantMapBuilder {
    variant: &'static str,
    dict: Dict,
}

impl ser::SerializeStructVariant for VariantMapBuilder {
    type Ok = Value;
    type Error = SerializeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> SerResult<()> {
        self.dict
            .insert(key.to_string(), value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> SerResult<Value> {
        let mut outer = Dict::new();
        outer.insert(self.variant.to_string(), Value::Dict(self.dict));
        Ok(Value::Dict(outer))
    }
}
