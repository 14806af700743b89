//! Parameter binding: mapping application values to wire types.
//!
//! Every value a statement can send is a [`ParamValue`]. Its wire type comes
//! from a fixed table ([`ParamValue::param_type`]):
//!
//! | Rust value                 | Wire type    | Length          |
//! |----------------------------|--------------|-----------------|
//! | `i8` / `u8`                | TINY         | 1               |
//! | `i16` / `u16`              | SHORT        | 2               |
//! | `i32` / `u32`              | LONG         | 4               |
//! | `i64` / `u64`              | LONGLONG     | 8               |
//! | `isize` / `usize`          | pointer width                  ||
//! | `f32` / `f64`              | FLOAT/DOUBLE | 4 / 8           |
//! | `String` / `&str`          | STRING       | length-prefixed |
//! | `Vec<u8>`                  | VAR_STRING   | length-prefixed |
//! | [`Blob`]                   | BLOB         | length-prefixed |
//! | `Time`                     | TIME         | length-prefixed |
//! | `Date`/`Datetime`/`Timestamp` | DATE/DATETIME/TIMESTAMP | length-prefixed |
//! | [`Raw`]                    | caller's tag | caller's bytes  |
//!
//! Unsigned kinds set the 0x80 bit in the parameter flags byte.
//!
//! A parameter is bound either by snapshot ([`Binding::BySnapshot`]), which
//! freezes the value at bind time, or by reference ([`Binding::ByReference`]),
//! which re-reads caller storage on every execute. An empty reference sends
//! NULL.

#![allow(clippy::cast_possible_truncation)]

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use mywire_core::error::{BindError, BindErrorKind};
use mywire_core::{Date, Datetime, Error, Result, Time, Timestamp};

use crate::protocol::PacketWriter;
use crate::types::{FieldType, encode_date, encode_datetime, encode_time};

/// Unsigned marker in a [`Raw`] type tag.
pub const RAW_UNSIGNED_MASK: u16 = 0x8000;

/// How a parameter's value is laid out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthCode {
    /// Exactly this many bytes
    Fixed(u8),
    /// Self-describing: length-encoded, or a temporal length byte
    Variable,
}

/// The wire type of one bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamType {
    pub field_type: FieldType,
    pub unsigned: bool,
    pub length: LengthCode,
    /// Set for [`Raw`] values, whose payload bypasses encoding.
    pub raw: bool,
}

impl ParamType {
    pub const NULL: ParamType = ParamType::fixed(FieldType::Null, false, 0);

    const fn fixed(field_type: FieldType, unsigned: bool, width: u8) -> Self {
        Self {
            field_type,
            unsigned,
            length: LengthCode::Fixed(width),
            raw: false,
        }
    }

    const fn variable(field_type: FieldType) -> Self {
        Self {
            field_type,
            unsigned: false,
            length: LengthCode::Variable,
            raw: false,
        }
    }

    /// The flags byte sent after the type byte in COM_STMT_EXECUTE.
    pub const fn wire_flags(&self) -> u8 {
        if self.unsigned { 0x80 } else { 0x00 }
    }
}

/// Marks a byte vector to be sent as BLOB rather than VAR_STRING.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blob(pub Vec<u8>);

/// A value with an explicit wire type and pre-encoded payload.
///
/// The low byte of `type_tag` is the wire type; [`RAW_UNSIGNED_MASK`] marks
/// it unsigned. `payload` is sent verbatim, so it must already be in the
/// binary protocol layout for that type (including any length prefix).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raw {
    pub type_tag: u16,
    pub payload: Vec<u8>,
}

impl Raw {
    pub fn new(type_tag: u16, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            type_tag,
            payload: payload.into(),
        }
    }
}

/// A parameter value ready to be encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    /// Exact numeric in textual form, sent as NEWDECIMAL
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    Blob(Vec<u8>),
    Time(Time),
    Date(Date),
    Datetime(Datetime),
    Timestamp(Timestamp),
    Raw(Raw),
}

impl ParamValue {
    pub const fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }

    /// NULL or a zero-length string or byte value: nothing to send inline.
    pub fn is_empty(&self) -> bool {
        match self {
            ParamValue::Null => true,
            ParamValue::Text(s) => s.is_empty(),
            ParamValue::Bytes(b) | ParamValue::Blob(b) => b.is_empty(),
            _ => false,
        }
    }

    /// Look up the wire type for this value.
    ///
    /// Fails only for a [`Raw`] tag that names no known wire type.
    #[allow(clippy::result_large_err)]
    pub fn param_type(&self) -> Result<ParamType> {
        Ok(match self {
            ParamValue::Null => ParamType::NULL,
            ParamValue::Int8(_) => ParamType::fixed(FieldType::Tiny, false, 1),
            ParamValue::UInt8(_) => ParamType::fixed(FieldType::Tiny, true, 1),
            ParamValue::Int16(_) => ParamType::fixed(FieldType::Short, false, 2),
            ParamValue::UInt16(_) => ParamType::fixed(FieldType::Short, true, 2),
            ParamValue::Int32(_) => ParamType::fixed(FieldType::Long, false, 4),
            ParamValue::UInt32(_) => ParamType::fixed(FieldType::Long, true, 4),
            ParamValue::Int64(_) => ParamType::fixed(FieldType::LongLong, false, 8),
            ParamValue::UInt64(_) => ParamType::fixed(FieldType::LongLong, true, 8),
            ParamValue::Float(_) => ParamType::fixed(FieldType::Float, false, 4),
            ParamValue::Double(_) => ParamType::fixed(FieldType::Double, false, 8),
            ParamValue::Decimal(_) => ParamType::variable(FieldType::NewDecimal),
            ParamValue::Text(_) => ParamType::variable(FieldType::String),
            ParamValue::Bytes(_) => ParamType::variable(FieldType::VarString),
            ParamValue::Blob(_) => ParamType::variable(FieldType::Blob),
            ParamValue::Time(_) => ParamType::variable(FieldType::Time),
            ParamValue::Date(_) => ParamType::variable(FieldType::Date),
            ParamValue::Datetime(_) => ParamType::variable(FieldType::DateTime),
            ParamValue::Timestamp(_) => ParamType::variable(FieldType::Timestamp),
            ParamValue::Raw(raw) => {
                let field_type =
                    FieldType::from_wire((raw.type_tag & 0xFF) as u8).ok_or_else(|| {
                        unsupported(format!("unknown wire type tag {:#06x}", raw.type_tag))
                    })?;
                ParamType {
                    field_type,
                    unsigned: raw.type_tag & RAW_UNSIGNED_MASK != 0,
                    length: LengthCode::Variable,
                    raw: true,
                }
            }
        })
    }

    /// Append the binary-protocol encoding of this value. NULL writes nothing.
    pub fn encode(&self, out: &mut PacketWriter) {
        match self {
            ParamValue::Null => {}
            ParamValue::Int8(v) => out.write_u8(*v as u8),
            ParamValue::UInt8(v) => out.write_u8(*v),
            ParamValue::Int16(v) => out.write_u16_le(*v as u16),
            ParamValue::UInt16(v) => out.write_u16_le(*v),
            ParamValue::Int32(v) => out.write_u32_le(*v as u32),
            ParamValue::UInt32(v) => out.write_u32_le(*v),
            ParamValue::Int64(v) => out.write_u64_le(*v as u64),
            ParamValue::UInt64(v) => out.write_u64_le(*v),
            ParamValue::Float(v) => out.write_f32_le(*v),
            ParamValue::Double(v) => out.write_f64_le(*v),
            ParamValue::Decimal(s) | ParamValue::Text(s) => out.write_lenenc_string(s),
            ParamValue::Bytes(b) | ParamValue::Blob(b) => out.write_lenenc_bytes(b),
            ParamValue::Time(t) => encode_time(out, *t),
            ParamValue::Date(d) => encode_date(out, *d),
            ParamValue::Datetime(dt) => encode_datetime(out, *dt),
            ParamValue::Timestamp(ts) => encode_datetime(out, ts.0),
            ParamValue::Raw(raw) => out.write_bytes(&raw.payload),
        }
    }
}

fn unsupported(message: String) -> Error {
    Error::Bind(BindError {
        kind: BindErrorKind::UnsupportedType,
        position: None,
        message,
    })
}

/// A Rust type that can be bound as a statement parameter.
pub trait Bindable: Send + 'static {
    /// Wire type used when a reference to this type is empty.
    fn static_type() -> Option<ParamType>
    where
        Self: Sized,
    {
        None
    }

    fn to_param(&self) -> ParamValue;
}

macro_rules! bindable {
    ($($t:ty => $variant:ident;)*) => {
        $(
            impl Bindable for $t {
                fn static_type() -> Option<ParamType> {
                    ParamValue::$variant(Default::default()).param_type().ok()
                }

                fn to_param(&self) -> ParamValue {
                    ParamValue::$variant(self.clone())
                }
            }

            impl From<$t> for ParamValue {
                fn from(v: $t) -> Self {
                    ParamValue::$variant(v)
                }
            }
        )*
    };
}

bindable! {
    i8 => Int8;
    i16 => Int16;
    i32 => Int32;
    i64 => Int64;
    u8 => UInt8;
    u16 => UInt16;
    u32 => UInt32;
    u64 => UInt64;
    f32 => Float;
    f64 => Double;
    String => Text;
    Vec<u8> => Bytes;
    Time => Time;
    Date => Date;
    Datetime => Datetime;
    Timestamp => Timestamp;
}

#[cfg(target_pointer_width = "64")]
impl From<isize> for ParamValue {
    fn from(v: isize) -> Self {
        ParamValue::Int64(v as i64)
    }
}

#[cfg(target_pointer_width = "64")]
impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::UInt64(v as u64)
    }
}

#[cfg(not(target_pointer_width = "64"))]
impl From<isize> for ParamValue {
    fn from(v: isize) -> Self {
        ParamValue::Int32(v as i32)
    }
}

#[cfg(not(target_pointer_width = "64"))]
impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::UInt32(v as u32)
    }
}

impl Bindable for isize {
    fn static_type() -> Option<ParamType> {
        ParamValue::from(0isize).param_type().ok()
    }

    fn to_param(&self) -> ParamValue {
        ParamValue::from(*self)
    }
}

impl Bindable for usize {
    fn static_type() -> Option<ParamType> {
        ParamValue::from(0usize).param_type().ok()
    }

    fn to_param(&self) -> ParamValue {
        ParamValue::from(*self)
    }
}

impl Bindable for &'static str {
    fn static_type() -> Option<ParamType> {
        Some(ParamType::variable(FieldType::String))
    }

    fn to_param(&self) -> ParamValue {
        ParamValue::Text((*self).to_string())
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<&[u8]> for ParamValue {
    fn from(v: &[u8]) -> Self {
        ParamValue::Bytes(v.to_vec())
    }
}

impl Bindable for Blob {
    fn static_type() -> Option<ParamType> {
        Some(ParamType::variable(FieldType::Blob))
    }

    fn to_param(&self) -> ParamValue {
        ParamValue::Blob(self.0.clone())
    }
}

impl From<Blob> for ParamValue {
    fn from(v: Blob) -> Self {
        ParamValue::Blob(v.0)
    }
}

impl Bindable for Raw {
    fn static_type() -> Option<ParamType> {
        None
    }

    fn to_param(&self) -> ParamValue {
        ParamValue::Raw(self.clone())
    }
}

impl From<Raw> for ParamValue {
    fn from(v: Raw) -> Self {
        ParamValue::Raw(v)
    }
}

impl<T: Bindable> Bindable for Option<T> {
    fn static_type() -> Option<ParamType> {
        T::static_type()
    }

    fn to_param(&self) -> ParamValue {
        self.as_ref().map_or(ParamValue::Null, Bindable::to_param)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(ParamValue::Null, Into::into)
    }
}

/// Caller storage a by-reference binding reads at execute time.
pub trait ParamSource: Send + Sync {
    /// The value to send now; NULL when the storage is empty.
    fn current(&self) -> ParamValue;

    /// Wire type to announce while the storage is empty.
    fn declared_type(&self) -> Option<ParamType>;
}

impl<T: Bindable> ParamSource for Mutex<Option<T>> {
    fn current(&self) -> ParamValue {
        let guard = self.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map_or(ParamValue::Null, Bindable::to_param)
    }

    fn declared_type(&self) -> Option<ParamType> {
        T::static_type()
    }
}

/// Shared, mutable storage for a parameter bound by reference.
///
/// Clones share the same slot, so a value set through one handle is what
/// the next execute sends.
#[derive(Debug)]
pub struct ParamRef<T> {
    slot: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for ParamRef<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Bindable> ParamRef<T> {
    pub fn new(value: T) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(value))),
        }
    }

    /// An empty reference; it sends NULL until a value is set.
    pub fn null() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set(&self, value: T) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }

    pub fn clear(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn get(&self) -> Option<T>
    where
        T: Clone,
    {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// A binding that reads this storage at every execute.
    pub fn binding(&self) -> Binding {
        Binding::ByReference(Arc::clone(&self.slot) as Arc<dyn ParamSource>)
    }
}

impl<T: Bindable> From<&ParamRef<T>> for Binding {
    fn from(r: &ParamRef<T>) -> Self {
        r.binding()
    }
}

impl<T: Bindable> From<ParamRef<T>> for Binding {
    fn from(r: ParamRef<T>) -> Self {
        r.binding()
    }
}

/// How a parameter slot obtains its value.
#[derive(Clone)]
pub enum Binding {
    /// Re-read from caller storage at every execute
    ByReference(Arc<dyn ParamSource>),
    /// Frozen at bind time
    BySnapshot(ParamValue),
}

impl Binding {
    pub fn value(v: impl Into<ParamValue>) -> Self {
        Binding::BySnapshot(v.into())
    }

    pub fn null() -> Self {
        Binding::BySnapshot(ParamValue::Null)
    }

    pub fn reference<T: Bindable>(r: &ParamRef<T>) -> Self {
        r.binding()
    }

    /// The value this binding would send right now.
    pub fn current(&self) -> ParamValue {
        match self {
            Binding::ByReference(src) => src.current(),
            Binding::BySnapshot(v) => v.clone(),
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::ByReference(src) => f
                .debug_tuple("ByReference")
                .field(&src.current())
                .finish(),
            Binding::BySnapshot(v) => f.debug_tuple("BySnapshot").field(v).finish(),
        }
    }
}

impl From<ParamValue> for Binding {
    fn from(v: ParamValue) -> Self {
        Binding::BySnapshot(v)
    }
}

/// A record whose fields bind, in order, to a statement's parameters.
///
/// Fields held as [`ParamRef`]s stay bound by reference, so a record bound
/// once can be updated in place between executes.
///
/// ```rust,ignore
/// struct Doc {
///     id: ParamRef<i64>,
///     title: ParamRef<String>,
/// }
///
/// impl Params for Doc {
///     fn bindings(&self) -> Vec<Binding> {
///         vec![self.id.binding(), self.title.binding()]
///     }
/// }
/// ```
pub trait Params {
    /// One binding per parameter, in placeholder order.
    fn bindings(&self) -> Vec<Binding>;
}

impl Params for [Binding] {
    fn bindings(&self) -> Vec<Binding> {
        self.to_vec()
    }
}

impl Params for Vec<Binding> {
    fn bindings(&self) -> Vec<Binding> {
        self.clone()
    }
}

macro_rules! tuple_params {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name),+> Params for ($($name,)+)
        where
            $($name: Clone + Into<Binding>),+
        {
            fn bindings(&self) -> Vec<Binding> {
                vec![$(self.$idx.clone().into()),+]
            }
        }
    };
}

tuple_params!(A: 0);
tuple_params!(A: 0, B: 1);
tuple_params!(A: 0, B: 1, C: 2);
tuple_params!(A: 0, B: 1, C: 2, D: 3);
tuple_params!(A: 0, B: 1, C: 2, D: 3, E: 4);
tuple_params!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
tuple_params!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
tuple_params!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);

/// One bound parameter slot: its binding plus the type inferred at bind time.
#[derive(Debug, Clone)]
pub struct BoundParam {
    binding: Binding,
    param_type: ParamType,
}

impl BoundParam {
    /// Infer the wire type for a binding.
    ///
    /// An empty reference takes its type from the referenced Rust type, or
    /// NULL when that type has no fixed mapping.
    #[allow(clippy::result_large_err)]
    pub fn bind(binding: Binding) -> Result<Self> {
        let param_type = match &binding {
            Binding::BySnapshot(v) => v.param_type()?,
            Binding::ByReference(src) => match src.current() {
                ParamValue::Null => src.declared_type().unwrap_or(ParamType::NULL),
                v => v.param_type()?,
            },
        };
        Ok(Self {
            binding,
            param_type,
        })
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    /// Type inferred at bind time.
    pub fn param_type(&self) -> ParamType {
        self.param_type
    }

    /// Read the value to send now, with its wire type.
    ///
    /// NULL keeps the bind-time type so the server sees a stable tag.
    #[allow(clippy::result_large_err)]
    pub fn resolve(&self) -> Result<(ParamValue, ParamType)> {
        let value = self.binding.current();
        let param_type = match (&self.binding, &value) {
            (_, ParamValue::Null) | (Binding::BySnapshot(_), _) => self.param_type,
            (Binding::ByReference(_), v) => v.param_type()?,
        };
        Ok((value, param_type))
    }
}

/// Bind a whole parameter list, attaching the position to any failure.
#[allow(clippy::result_large_err)]
pub fn bind_all<I>(bindings: I) -> Result<Vec<BoundParam>>
where
    I: IntoIterator<Item = Binding>,
{
    bindings
        .into_iter()
        .enumerate()
        .map(|(i, b)| BoundParam::bind(b).map_err(|e| with_position(e, i)))
        .collect()
}

pub(crate) fn with_position(err: Error, position: usize) -> Error {
    match err {
        Error::Bind(mut be) => {
            be.position = Some(position);
            Error::Bind(be)
        }
        other => other,
    }
}
