//! Recursive descent over [`TypeSpec`] trees.

// self
use crate::{
	_prelude::*,
	error::TypeCheckError,
	schema::{DecodedRecord, PrimitiveKind, Schema, TypeSpec},
};

/// Checks `value` against `spec`, returning the (possibly coerced) value.
///
/// Coercion is only attempted for primitives, and only when `allow_cast` is set. The flag
/// reaches union and optional alternatives; collection elements, map entries and nested
/// records are always checked strictly.
pub fn validate(value: &Value, spec: &TypeSpec, allow_cast: bool) -> Result<Value, TypeCheckError> {
	match spec {
		TypeSpec::Any => Ok(value.clone()),
		TypeSpec::Union(alternatives) => validate_union(value, spec, alternatives, allow_cast),
		TypeSpec::Optional(inner) => validate_union(
			value,
			spec,
			[inner.as_ref(), &TypeSpec::null()].into_iter(),
			allow_cast,
		),
		TypeSpec::List(elem) => validate_collection(value, spec, elem, false),
		TypeSpec::Set(elem) => validate_collection(value, spec, elem, true),
		TypeSpec::Dict(key, entry) => validate_dict(value, spec, key, entry),
		TypeSpec::Record(schema) =>
			validate_record(value, schema, false).map(|record| Value::Object(record.into_inner())),
		TypeSpec::Primitive(kind) => validate_primitive(value, *kind, allow_cast),
	}
}

/// Applies the exact-arity rule, then validates each field against `schema`.
pub fn validate_record(
	value: &Value,
	schema: &Schema,
	allow_cast: bool,
) -> Result<DecodedRecord, TypeCheckError> {
	let Value::Object(fields) = value else {
		return Err(mismatch(&schema.name, value));
	};
	let arity_mismatch = || TypeCheckError::ArityMismatch {
		model: schema.name.clone(),
		expected: schema.type_names(),
		got: fields.iter().map(|(key, value)| (key.clone(), type_name(value).to_owned())).collect(),
	};

	if fields.len() != schema.len() {
		return Err(arity_mismatch());
	}

	let mut decoded = JsonMap::new();

	for (field, raw) in fields {
		let spec = schema.get(field).ok_or_else(arity_mismatch)?;

		decoded.insert(field.clone(), validate(raw, spec, allow_cast)?);
	}

	Ok(DecodedRecord::new(decoded))
}

/// Runtime type name of a JSON value, as reported in diagnostics.
pub fn type_name(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "boolean",
		Value::Number(number) if number.is_f64() => "float",
		Value::Number(_) => "integer",
		Value::String(_) => "string",
		Value::Array(_) => "list",
		Value::Object(_) => "dict",
	}
}

fn validate_union<'a, I>(
	value: &Value,
	spec: &TypeSpec,
	alternatives: I,
	allow_cast: bool,
) -> Result<Value, TypeCheckError>
where
	I: IntoIterator<Item = &'a TypeSpec>,
{
	// Per-alternative failures are discarded; only the union as a whole is reported.
	alternatives
		.into_iter()
		.find_map(|alternative| validate(value, alternative, allow_cast).ok())
		.ok_or_else(|| mismatch(spec, value))
}

fn validate_collection(
	value: &Value,
	spec: &TypeSpec,
	elem: &TypeSpec,
	dedup: bool,
) -> Result<Value, TypeCheckError> {
	// An empty query value stands for an empty collection of any element type.
	if matches!(value, Value::String(s) if s.is_empty()) {
		return Ok(Value::Array(Vec::new()));
	}

	let Value::Array(items) = value else {
		return Err(mismatch(spec, value));
	};
	let mut out = Vec::with_capacity(items.len());

	for item in items {
		let checked = validate(item, elem, false)?;

		if !dedup || !out.contains(&checked) {
			out.push(checked);
		}
	}

	Ok(Value::Array(out))
}

fn validate_dict(
	value: &Value,
	spec: &TypeSpec,
	key: &TypeSpec,
	entry: &TypeSpec,
) -> Result<Value, TypeCheckError> {
	let Value::Object(map) = value else {
		return Err(mismatch(spec, value));
	};
	let mut out = JsonMap::new();

	for (raw_key, raw_value) in map {
		validate(&Value::String(raw_key.clone()), key, false)?;
		out.insert(raw_key.clone(), validate(raw_value, entry, false)?);
	}

	Ok(Value::Object(out))
}

fn validate_primitive(
	value: &Value,
	kind: PrimitiveKind,
	allow_cast: bool,
) -> Result<Value, TypeCheckError> {
	if is_kind(value, kind) {
		return Ok(value.clone());
	}
	if !allow_cast {
		return Err(mismatch(kind, value));
	}

	cast(value, kind)
		.ok_or_else(|| TypeCheckError::CastFailure { target: kind.as_str(), value: display(value) })
}

fn is_kind(value: &Value, kind: PrimitiveKind) -> bool {
	match kind {
		PrimitiveKind::Integer => value.is_i64() || value.is_u64(),
		PrimitiveKind::Float => value.is_f64(),
		PrimitiveKind::String => value.is_string(),
		PrimitiveKind::Boolean => value.is_boolean(),
		PrimitiveKind::Null => value.is_null(),
	}
}

// Narrower than a best-effort constructor call: fractional floats never truncate to integers
// and `null` never renders as a string.
fn cast(value: &Value, kind: PrimitiveKind) -> Option<Value> {
	match (kind, value) {
		(PrimitiveKind::Integer, Value::String(s)) => {
			let s = s.trim();

			s.parse::<i64>()
				.map(Value::from)
				.or_else(|_| s.parse::<u64>().map(Value::from))
				.ok()
		},
		(PrimitiveKind::Integer, Value::Number(n)) => n
			.as_f64()
			.filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
			.map(|f| Value::from(f as i64)),
		(PrimitiveKind::Integer, Value::Bool(b)) => Some(Value::from(i64::from(*b))),
		(PrimitiveKind::Float, Value::String(s)) =>
			s.trim().parse::<f64>().ok().and_then(serde_json::Number::from_f64).map(Value::Number),
		(PrimitiveKind::Float, Value::Number(n)) =>
			n.as_f64().and_then(serde_json::Number::from_f64).map(Value::Number),
		(PrimitiveKind::Float, Value::Bool(b)) =>
			serde_json::Number::from_f64(if *b { 1.0 } else { 0.0 }).map(Value::Number),
		(PrimitiveKind::String, Value::Number(n)) => Some(Value::String(n.to_string())),
		(PrimitiveKind::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
		(PrimitiveKind::Boolean, Value::String(s)) => parse_bool(s).map(Value::Bool),
		(PrimitiveKind::Boolean, Value::Number(n)) => n.as_f64().map(|f| Value::Bool(f != 0.0)),
		_ => None,
	}
}

fn parse_bool(raw: &str) -> Option<bool> {
	match raw.trim().to_ascii_lowercase().as_str() {
		"true" | "1" | "yes" | "on" => Some(true),
		"false" | "0" | "no" | "off" => Some(false),
		_ => None,
	}
}

fn mismatch(expected: impl Display, value: &Value) -> TypeCheckError {
	TypeCheckError::TypeMismatch {
		expected: expected.to_string(),
		actual: type_name(value),
		value: value.to_string(),
	}
}

fn display(value: &Value) -> String {
	match value {
		Value::String(s) => s.clone(),
		other => other.to_string(),
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	fn point() -> Schema {
		Schema::new("Point").field("a", TypeSpec::integer()).field("b", TypeSpec::string())
	}

	#[test]
	fn primitives_match_by_runtime_type() {
		assert_eq!(validate(&json!(1), &TypeSpec::integer(), false), Ok(json!(1)));
		assert_eq!(validate(&json!(""), &TypeSpec::string(), false), Ok(json!("")));
		assert_eq!(validate(&json!(1.5), &TypeSpec::float(), false), Ok(json!(1.5)));
		assert_eq!(validate(&json!(true), &TypeSpec::boolean(), false), Ok(json!(true)));

		let err = validate(&json!(5), &TypeSpec::string(), false)
			.expect_err("Integers are not strings without casting.");

		assert_eq!(err.to_string(), "Typecheck failure: string, given integer (5)");
	}

	#[test]
	fn casting_converts_wire_strings() {
		assert_eq!(validate(&json!("1"), &TypeSpec::integer(), true), Ok(json!(1)));
		assert_eq!(validate(&json!(" 42 "), &TypeSpec::integer(), true), Ok(json!(42)));
		assert_eq!(validate(&json!("2.5"), &TypeSpec::float(), true), Ok(json!(2.5)));
		assert_eq!(validate(&json!(3), &TypeSpec::float(), true), Ok(json!(3.0)));
		assert_eq!(validate(&json!("Yes"), &TypeSpec::boolean(), true), Ok(json!(true)));
		assert_eq!(validate(&json!("off"), &TypeSpec::boolean(), true), Ok(json!(false)));
		assert_eq!(validate(&json!(7), &TypeSpec::string(), true), Ok(json!("7")));
		assert_eq!(validate(&json!(4.0), &TypeSpec::integer(), true), Ok(json!(4)));

		assert!(matches!(
			validate(&json!("1"), &TypeSpec::integer(), false),
			Err(TypeCheckError::TypeMismatch { actual: "string", .. })
		));
	}

	#[test]
	fn failed_casts_name_target_and_value() {
		let err = validate(&json!("abc"), &TypeSpec::integer(), true)
			.expect_err("Non-numeric strings cannot become integers.");

		assert_eq!(err, TypeCheckError::CastFailure { target: "integer", value: "abc".into() });
		assert_eq!(
			validate(&json!(1.5), &TypeSpec::integer(), true),
			Err(TypeCheckError::CastFailure { target: "integer", value: "1.5".into() })
		);
		assert!(validate(&json!("maybe"), &TypeSpec::boolean(), true).is_err());
		assert!(validate(&json!(null), &TypeSpec::string(), true).is_err());
		assert!(validate(&json!("x"), &TypeSpec::null(), true).is_err());
	}

	#[test]
	fn empty_wire_string_is_an_empty_collection() {
		for elem in [TypeSpec::integer(), TypeSpec::list(TypeSpec::string()), TypeSpec::any()] {
			assert_eq!(validate(&json!(""), &TypeSpec::list(elem.clone()), false), Ok(json!([])));
			assert_eq!(validate(&json!(""), &TypeSpec::set(elem), true), Ok(json!([])));
		}

		let err = validate(&json!("x"), &TypeSpec::list(TypeSpec::integer()), false)
			.expect_err("Only the empty string is lenient.");

		assert_eq!(err.to_string(), "Typecheck failure: List[integer], given string (\"x\")");
	}

	#[test]
	fn collections_check_every_element() {
		let nested = TypeSpec::list(TypeSpec::list(TypeSpec::integer()));

		assert!(validate(&json!([1, 2, 3]), &TypeSpec::list(TypeSpec::integer()), false).is_ok());
		assert!(validate(&json!(["", "foo"]), &TypeSpec::list(TypeSpec::string()), false).is_ok());
		assert!(validate(&json!([[1], [], [2, 3]]), &nested, false).is_ok());
		assert!(validate(&json!([1, 2, 3]), &TypeSpec::list(TypeSpec::string()), false).is_err());
		assert!(validate(&json!([[1], [[]], [2, 3]]), &nested, false).is_err());
	}

	#[test]
	fn casting_stops_at_the_top_level() {
		let ints = TypeSpec::list(TypeSpec::integer());

		assert!(matches!(
			validate(&json!(["1", "2"]), &ints, true),
			Err(TypeCheckError::TypeMismatch { actual: "string", .. })
		));
		assert!(
			validate(&json!({ "a": "1" }), &TypeSpec::dict(TypeSpec::string(), TypeSpec::integer()), true)
				.is_err()
		);
		assert!(
			validate(&json!({ "1": 1 }), &TypeSpec::dict(TypeSpec::integer(), TypeSpec::any()), true)
				.is_err()
		);
		assert_eq!(
			validate(&json!("1"), &TypeSpec::optional(TypeSpec::integer()), true),
			Ok(json!(1))
		);
	}

	#[test]
	fn sets_accept_lists_and_drop_duplicates() {
		assert_eq!(
			validate(&json!(["a", "b", "a"]), &TypeSpec::set(TypeSpec::string()), false),
			Ok(json!(["a", "b"]))
		);
		assert!(validate(&json!({ "a": 1 }), &TypeSpec::set(TypeSpec::string()), false).is_err());
	}

	#[test]
	fn dicts_check_keys_and_values() {
		let any_values = TypeSpec::dict(TypeSpec::string(), TypeSpec::any());
		let mixed = TypeSpec::dict(
			TypeSpec::string(),
			TypeSpec::union([TypeSpec::integer(), TypeSpec::string()]),
		);

		assert!(validate(&json!({}), &TypeSpec::dict(TypeSpec::any(), TypeSpec::any()), false).is_ok());
		assert!(validate(&json!({ "1": "" }), &any_values, false).is_ok());
		assert!(validate(&json!({ "1": "", "2": 4 }), &mixed, false).is_ok());
		assert!(validate(&json!({ "": 2 }), &TypeSpec::dict(TypeSpec::string(), TypeSpec::integer()), false).is_ok());
		assert!(
			validate(&json!({ "x": 1 }), &TypeSpec::dict(TypeSpec::integer(), TypeSpec::any()), false)
				.is_err()
		);
		assert!(
			validate(&json!({ "2": [1] }), &TypeSpec::dict(TypeSpec::string(), TypeSpec::integer()), false)
				.is_err()
		);
		assert!(validate(&json!([]), &any_values, false).is_err());
	}

	#[test]
	fn unions_follow_declaration_order() {
		let int_first = TypeSpec::union([TypeSpec::integer(), TypeSpec::string()]);
		let str_first = TypeSpec::union([TypeSpec::string(), TypeSpec::integer()]);

		assert_eq!(validate(&json!(1), &int_first, false), Ok(json!(1)));
		assert_eq!(validate(&json!("1"), &int_first, false), Ok(json!("1")));
		assert_eq!(validate(&json!("1"), &int_first, true), Ok(json!(1)));
		assert_eq!(validate(&json!("1"), &str_first, true), Ok(json!("1")));

		let err = validate(&json!(""), &TypeSpec::union([TypeSpec::integer(), TypeSpec::null()]), false)
			.expect_err("An empty string is neither an integer nor null.");

		assert_eq!(err.to_string(), "Typecheck failure: Union[integer, null], given string (\"\")");
	}

	#[test]
	fn optionals_accept_null() {
		let maybe_int = TypeSpec::optional(TypeSpec::integer());

		assert!(validate(&json!(1), &maybe_int, false).is_ok());
		assert!(validate(&json!(null), &maybe_int, false).is_ok());
		assert!(validate(&json!(""), &maybe_int, false).is_err());
		assert!(validate(&json!(""), &maybe_int, true).is_err());
		assert!(
			validate(&json!({ "": null }), &TypeSpec::dict(TypeSpec::string(), maybe_int.clone()), false)
				.is_ok()
		);
		assert!(
			validate(&json!({ "": 3 }), &TypeSpec::dict(TypeSpec::string(), maybe_int), false).is_ok()
		);
	}

	#[test]
	fn records_require_exact_arity() {
		let schema = point();

		assert!(validate_record(&json!({ "a": 1, "b": "" }), &schema, false).is_ok());
		assert!(validate_record(&json!({ "a": 1, "b": 2 }), &schema, false).is_err());
		assert!(validate_record(&json!({ "a": 1, "b": [] }), &schema, false).is_err());

		let err = validate_record(&json!({ "a": 1, "b": "x", "c": true }), &schema, false)
			.expect_err("Extra fields must be rejected.");
		let TypeCheckError::ArityMismatch { model, expected, got } = err else {
			panic!("Expected an arity mismatch.");
		};

		assert_eq!(model, "Point");
		assert_eq!(expected.get("a").map(String::as_str), Some("integer"));
		assert_eq!(expected.len(), 2);
		assert_eq!(got.get("c").map(String::as_str), Some("boolean"));
		assert_eq!(got.len(), 3);

		assert!(matches!(
			validate_record(&json!({ "a": 1 }), &schema, false),
			Err(TypeCheckError::ArityMismatch { .. })
		));
		assert!(matches!(
			validate_record(&json!({ "a": 1, "z": "" }), &schema, false),
			Err(TypeCheckError::ArityMismatch { .. })
		));
	}

	#[test]
	fn nested_records_use_the_same_rule() {
		let outer = Schema::new("Outer")
			.field("point", TypeSpec::record(point()))
			.field("tags", TypeSpec::set(TypeSpec::string()));
		let record = validate_record(
			&json!({ "point": { "a": 3, "b": "x" }, "tags": "" }),
			&outer,
			true,
		)
		.expect("Nested values should validate.");

		assert_eq!(record.get("point"), Some(&json!({ "a": 3, "b": "x" })));
		assert_eq!(record.get("tags"), Some(&json!([])));
		assert!(
			validate_record(&json!({ "point": { "a": "3", "b": "x" }, "tags": [] }), &outer, true)
				.is_err(),
			"Nested records are not coerced."
		);
		assert!(matches!(
			validate_record(&json!({ "point": { "a": 3 }, "tags": [] }), &outer, false),
			Err(TypeCheckError::ArityMismatch { .. })
		));
	}

	#[test]
	fn casting_never_touches_the_input() {
		let input = json!({ "a": "7", "b": "x" });
		let record = validate_record(&input, &point(), true).expect("Casting should succeed.");

		assert_eq!(record.get("a"), Some(&json!(7)));
		assert_eq!(input["a"], json!("7"));
	}
}
