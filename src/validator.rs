/*
 * Copyright (C) 2026 Mark Wells Dev
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Structural validation of untrusted analyzer responses.
//!
//! The analyzer's native type system silently substitutes a zero for a
//! missing field. Left unchecked, a missing array surfaces as the number
//! `0` deep inside caller code. These assertions catch that at the
//! boundary, before a result is handed back to the caller.

use serde_json::Value;

use crate::error::BridgeError;

/// A single structural check against one field of a response's `result`.
pub struct FieldAssertion {
    /// Path to the field within `result`, e.g. `"include_paths"`.
    pub field: &'static str,
    /// The kind of value expected at that field.
    pub expected: ExpectedShape,
}

/// The shapes a [`FieldAssertion`] can check for.
#[derive(Debug, Clone, Copy)]
pub enum ExpectedShape {
    /// A JSON object.
    Object,
    /// A JSON array (of any element type).
    Array,
    /// A JSON string.
    String,
    /// A JSON number.
    Number,
    /// A JSON boolean.
    Boolean,
    /// A JSON array in which every element is a string.
    StringArray,
}

impl ExpectedShape {
    fn describe(self) -> &'static str {
        match self {
            ExpectedShape::Object => "object",
            ExpectedShape::Array => "array",
            ExpectedShape::String => "string",
            ExpectedShape::Number => "number",
            ExpectedShape::Boolean => "boolean",
            ExpectedShape::StringArray => "array of strings",
        }
    }
}

/// A validator bound to a particular method, applied to the `result` field
/// of a [`crate::protocol::ResponseEnvelope`] before it reaches the caller.
pub struct Validator {
    method: &'static str,
    assertions: Vec<FieldAssertion>,
}

impl Validator {
    /// Builds a validator for `method` checking the given field assertions.
    #[must_use]
    pub fn new(method: &'static str, assertions: Vec<FieldAssertion>) -> Self {
        Self { method, assertions }
    }

    /// Checks `result` against every assertion, returning the first
    /// violation found.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::BridgeResponseError`] naming the offending
    /// field, the expected shape, and a bounded rendering of the actual
    /// value.
    pub fn validate(&self, result: &Value) -> Result<(), BridgeError> {
        for assertion in &self.assertions {
            let Some(value) = result.get(assertion.field) else {
                return Err(BridgeError::response_shape(
                    self.method,
                    assertion.field,
                    assertion.expected.describe(),
                    &Value::Null,
                ));
            };
            if !matches_shape(value, assertion.expected) {
                return Err(BridgeError::response_shape(
                    self.method,
                    assertion.field,
                    assertion.expected.describe(),
                    value,
                ));
            }
        }
        Ok(())
    }
}

fn matches_shape(value: &Value, expected: ExpectedShape) -> bool {
    match expected {
        ExpectedShape::Object => value.is_object(),
        ExpectedShape::Array => value.is_array(),
        ExpectedShape::String => value.is_string(),
        ExpectedShape::Number => value.is_number(),
        ExpectedShape::Boolean => value.is_boolean(),
        ExpectedShape::StringArray => value
            .as_array()
            .is_some_and(|items| items.iter().all(Value::is_string)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paths_validator() -> Validator {
        Validator::new(
            "get_pike_paths",
            vec![
                FieldAssertion {
                    field: "include_paths",
                    expected: ExpectedShape::StringArray,
                },
                FieldAssertion {
                    field: "module_paths",
                    expected: ExpectedShape::StringArray,
                },
            ],
        )
    }

    #[test]
    fn passes_on_well_formed_result() {
        let result = json!({"include_paths": ["/a"], "module_paths": ["/b"]});
        assert!(paths_validator().validate(&result).is_ok());
    }

    #[test]
    fn catches_field_substituted_with_a_number() {
        let result = json!({"include_paths": 0, "module_paths": 0});
        let err = paths_validator().validate(&result).unwrap_err();
        match err {
            BridgeError::BridgeResponseError { field, expected, .. } => {
                assert_eq!(field, "include_paths");
                assert_eq!(expected, "array of strings");
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[test]
    fn catches_missing_field() {
        let result = json!({"include_paths": ["/a"]});
        let err = paths_validator().validate(&result).unwrap_err();
        match err {
            BridgeError::BridgeResponseError { field, .. } => assert_eq!(field, "module_paths"),
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[test]
    fn catches_non_string_element_in_array() {
        let result = json!({"include_paths": ["/a", 5], "module_paths": []});
        let err = paths_validator().validate(&result).unwrap_err();
        match err {
            BridgeError::BridgeResponseError { field, .. } => assert_eq!(field, "include_paths"),
            other => panic!("unexpected error variant: {other:?}"),
        }
    }
}
