//! Conversion of application values into plain JSON values.
//!
//! Anything implementing [`Serialize`] can be written through a proxy. The
//! conversion runs before the translator builds a single operation, so a
//! value that cannot be represented aborts the statement with nothing
//! emitted.

use serde::Serialize;
use serde_json::Value;

use crate::error::DocError;

/// Convert `value` into a plain JSON value.
///
/// Fails with [`DocError::UnsupportedValueType`] when the value has no JSON
/// form, e.g. a map keyed by tuples or a type whose `Serialize` impl errors.
pub fn to_plain<T: Serialize + ?Sized>(value: &T) -> Result<Value, DocError> {
    serde_json::to_value(value).map_err(|err| DocError::UnsupportedValueType(err.to_string()))
}
