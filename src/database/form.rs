use serde_json::{Map, Value};

use super::{
    error::{ApiError, FieldErrors, NON_FIELD_ERRORS},
    schema::Id,
};

pub const REQUIRED: &str = "This field is required";

/// A JSON object body read field by field. Every getter records its own
/// type errors so one pass reports all broken fields.
pub struct Form {
    inner: Map<String, Value>,
}

impl Form {
    pub fn from_value(value: Value) -> Result<Self, ApiError> {
        match value {
            Value::Object(inner) => Ok(Self { inner }),
            _ => Err(ApiError::field(NON_FIELD_ERRORS, "Expected a JSON object")),
        }
    }

    fn present(&self, key: &str) -> Option<&Value> {
        self.inner.get(key).filter(|value| !value.is_null())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.present(key).is_some()
    }

    pub fn get_str(&self, key: &str, errors: &mut FieldErrors) -> Option<String> {
        match self.present(key) {
            Some(_) => self.get_optional_str(key, errors),
            None => {
                errors.add(key, REQUIRED);
                None
            }
        }
    }

    /// Like [`Form::get_str`], but a missing key is not an error.
    pub fn get_optional_str(&self, key: &str, errors: &mut FieldErrors) -> Option<String> {
        match self.present(key)? {
            Value::String(value) => Some(value.to_owned()),
            _ => {
                errors.add(key, "Expected a string");
                None
            }
        }
    }

    /// Accepts JSON numbers and numeric strings.
    pub fn get_number<T>(&self, key: &str, errors: &mut FieldErrors) -> Option<T>
    where
        T: TryFrom<i64>,
    {
        match self.present(key) {
            Some(value) => {
                let number = integer_from_value(value);
                if number.is_none() {
                    errors.add(key, "A valid integer is required");
                }
                number
            }
            None => {
                errors.add(key, REQUIRED);
                None
            }
        }
    }

    pub fn get_list(&self, key: &str, errors: &mut FieldErrors) -> Option<&Vec<Value>> {
        match self.present(key) {
            Some(Value::Array(values)) => Some(values),
            Some(_) => {
                errors.add(key, "Expected a list of items");
                None
            }
            None => {
                errors.add(key, REQUIRED);
                None
            }
        }
    }

    pub fn get_id_list(&self, key: &str, errors: &mut FieldErrors) -> Option<Vec<Id>> {
        let values = self.get_list(key, errors)?;
        let ids: Option<Vec<Id>> = values.iter().map(integer_from_value::<Id>).collect();
        if ids.is_none() {
            errors.add(key, "Expected a list of integer ids");
        }
        ids
    }
}

pub fn integer_from_value<T>(value: &Value) -> Option<T>
where
    T: TryFrom<i64>,
{
    let number = match value {
        Value::Number(number) => number.as_i64(),
        Value::String(value) => value.trim().parse::<i64>().ok(),
        _ => None,
    }?;

    T::try_from(number).ok()
}
