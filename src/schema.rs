//! Declarative request schemas and the decoded records they produce.
//!
//! A [`Schema`] is an ordered list of named fields, each described by a closed [`TypeSpec`]
//! tree built once when the handler is defined. [`Schema::decode`] walks an untyped
//! [`Value`] against that tree (see [`validate`]) and returns a [`DecodedRecord`] only when
//! every field checks out. Coercion (`allow_cast`) never mutates the input; the coerced
//! values live in the returned record.

pub mod params;
pub mod validate;

pub use params::*;
pub use validate::*;

pub use crate::error::TypeCheckError;

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::_prelude::*;

/// Primitive kinds checked by runtime type identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
	/// Whole number (`i64`/`u64` range).
	Integer,
	/// Fractional number.
	Float,
	/// UTF-8 string.
	String,
	/// `true`/`false`.
	Boolean,
	/// Explicit absent marker (`null`).
	Null,
}
impl PrimitiveKind {
	/// Stable type name used in diagnostics.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Integer => "integer",
			Self::Float => "float",
			Self::String => "string",
			Self::Boolean => "boolean",
			Self::Null => "null",
		}
	}
}
impl Display for PrimitiveKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Expected shape of a value.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeSpec {
	/// Accepts anything.
	Any,
	/// Single primitive kind.
	Primitive(PrimitiveKind),
	/// `inner` or the absent marker.
	Optional(Box<TypeSpec>),
	/// First alternative (in declaration order) that accepts the value wins.
	Union(Vec<TypeSpec>),
	/// Homogeneous list.
	List(Box<TypeSpec>),
	/// Homogeneous set; list-shaped input is accepted and deduplicated.
	Set(Box<TypeSpec>),
	/// String-keyed map; keys and values are checked independently.
	Dict(Box<TypeSpec>, Box<TypeSpec>),
	/// Nested record checked with the exact-arity rule.
	Record(Schema),
}
impl TypeSpec {
	/// [`TypeSpec::Any`].
	pub const fn any() -> Self {
		Self::Any
	}

	/// [`PrimitiveKind::Integer`].
	pub const fn integer() -> Self {
		Self::Primitive(PrimitiveKind::Integer)
	}

	/// [`PrimitiveKind::Float`].
	pub const fn float() -> Self {
		Self::Primitive(PrimitiveKind::Float)
	}

	/// [`PrimitiveKind::String`].
	pub const fn string() -> Self {
		Self::Primitive(PrimitiveKind::String)
	}

	/// [`PrimitiveKind::Boolean`].
	pub const fn boolean() -> Self {
		Self::Primitive(PrimitiveKind::Boolean)
	}

	/// [`PrimitiveKind::Null`].
	pub const fn null() -> Self {
		Self::Primitive(PrimitiveKind::Null)
	}

	/// `inner` or `null`.
	pub fn optional(inner: TypeSpec) -> Self {
		Self::Optional(Box::new(inner))
	}

	/// Ordered alternatives.
	pub fn union<I>(alternatives: I) -> Self
	where
		I: IntoIterator<Item = TypeSpec>,
	{
		Self::Union(alternatives.into_iter().collect())
	}

	/// List of `elem`.
	pub fn list(elem: TypeSpec) -> Self {
		Self::List(Box::new(elem))
	}

	/// Set of `elem`.
	pub fn set(elem: TypeSpec) -> Self {
		Self::Set(Box::new(elem))
	}

	/// Map from `key` to `value`.
	pub fn dict(key: TypeSpec, value: TypeSpec) -> Self {
		Self::Dict(Box::new(key), Box::new(value))
	}

	/// Nested record.
	pub fn record(schema: Schema) -> Self {
		Self::Record(schema)
	}

	/// Checks (and, with `allow_cast`, coerces) `value` against this spec.
	pub fn validate(&self, value: &Value, allow_cast: bool) -> Result<Value, TypeCheckError> {
		validate::validate(value, self, allow_cast)
	}
}
impl Display for TypeSpec {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Any => f.write_str("any"),
			Self::Primitive(kind) => Display::fmt(kind, f),
			Self::Optional(inner) => write!(f, "Optional[{inner}]"),
			Self::Union(alternatives) => {
				f.write_str("Union[")?;

				for (idx, alt) in alternatives.iter().enumerate() {
					if idx > 0 {
						f.write_str(", ")?;
					}

					Display::fmt(alt, f)?;
				}

				f.write_str("]")
			},
			Self::List(elem) => write!(f, "List[{elem}]"),
			Self::Set(elem) => write!(f, "Set[{elem}]"),
			Self::Dict(key, value) => write!(f, "Dict[{key}, {value}]"),
			Self::Record(schema) => f.write_str(&schema.name),
		}
	}
}
impl From<PrimitiveKind> for TypeSpec {
	fn from(kind: PrimitiveKind) -> Self {
		Self::Primitive(kind)
	}
}

/// Named, ordered field list. Order only affects diagnostics.
#[derive(Clone, Debug, PartialEq)]
pub struct Schema {
	/// Model name reported in arity diagnostics.
	pub name: String,
	fields: Vec<(String, TypeSpec)>,
}
impl Schema {
	/// Creates an empty schema called `name`.
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into(), fields: Vec::new() }
	}

	/// Declares (or redeclares) a field.
	pub fn field(mut self, name: impl Into<String>, spec: impl Into<TypeSpec>) -> Self {
		let name = name.into();
		let spec = spec.into();

		match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
			Some(slot) => slot.1 = spec,
			None => self.fields.push((name, spec)),
		}

		self
	}

	/// Spec declared for `name`, if any.
	pub fn get(&self, name: &str) -> Option<&TypeSpec> {
		self.fields.iter().find(|(field, _)| field == name).map(|(_, spec)| spec)
	}

	/// Declared fields in declaration order.
	pub fn fields(&self) -> impl Iterator<Item = (&str, &TypeSpec)> {
		self.fields.iter().map(|(name, spec)| (name.as_str(), spec))
	}

	/// Number of declared fields.
	pub fn len(&self) -> usize {
		self.fields.len()
	}

	/// Returns `true` when no fields are declared.
	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}

	/// Field → type name mapping used in diagnostics.
	pub fn type_names(&self) -> BTreeMap<String, String> {
		self.fields.iter().map(|(name, spec)| (name.clone(), spec.to_string())).collect()
	}

	/// Validates `value` against the exact-arity rule and every field spec.
	pub fn decode(&self, value: &Value, allow_cast: bool) -> Result<DecodedRecord, TypeCheckError> {
		validate::validate_record(value, self, allow_cast)
	}
}

/// Validated (and possibly coerced) parameters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedRecord(JsonMap<String, Value>);
impl DecodedRecord {
	pub(crate) fn new(fields: JsonMap<String, Value>) -> Self {
		Self(fields)
	}

	/// Value for `field`, if present.
	pub fn get(&self, field: &str) -> Option<&Value> {
		self.0.get(field)
	}

	/// String view of `field`.
	pub fn get_str(&self, field: &str) -> Option<&str> {
		self.get(field).and_then(Value::as_str)
	}

	/// Integer view of `field`.
	pub fn get_i64(&self, field: &str) -> Option<i64> {
		self.get(field).and_then(Value::as_i64)
	}

	/// Iterator over decoded fields.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
		self.0.iter().map(|(key, value)| (key.as_str(), value))
	}

	/// Number of decoded fields.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when the record holds no fields.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Consumes the record and returns the underlying map.
	pub fn into_inner(self) -> JsonMap<String, Value> {
		self.0
	}

	/// Deserializes the record into a typed struct, reporting the failing field path.
	pub fn deserialize<T>(&self) -> Result<T, serde_path_to_error::Error<serde_json::Error>>
	where
		T: DeserializeOwned,
	{
		let value = Value::Object(self.0.clone());

		serde_path_to_error::deserialize(value)
	}
}
