//! Deep merge of JSON values.

use serde_json::Value;

/// Flags controlling [`merge`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Keep existing left values instead of overwriting them.
    pub preserve: bool,
    /// Only merge object keys that already exist on the left.
    pub ignore_new_props: bool,
}

impl MergeOptions {
    pub fn preserving() -> Self {
        Self {
            preserve: true,
            ..Self::default()
        }
    }
}

/// Deep-merge `right` into `left` and return the result.
///
/// `left` is consumed; the returned value reuses its allocations.
///
/// - arrays merge index-wise; indices only present on the right are appended
///   unless `preserve` is set
/// - objects merge key-wise, recursing into keys present on both sides
/// - anything else: the right value wins, unless `preserve` is set and the
///   left value is not null
pub fn merge(left: Value, right: Value, options: MergeOptions) -> Value {
    match (left, right) {
        (Value::Array(mut left), Value::Array(right)) => {
            for (i, right_value) in right.into_iter().enumerate() {
                if i < left.len() {
                    let left_value = std::mem::take(&mut left[i]);
                    left[i] = merge(left_value, right_value, options);
                } else if !options.preserve {
                    left.push(right_value);
                }
            }
            Value::Array(left)
        }
        (Value::Object(mut left), Value::Object(right)) => {
            for (key, right_value) in right {
                match left.get_mut(&key) {
                    Some(left_value) => {
                        let existing = std::mem::take(left_value);
                        *left_value = merge(existing, right_value, options);
                    }
                    None if !options.ignore_new_props => {
                        left.insert(key, right_value);
                    }
                    None => {}
                }
            }
            Value::Object(left)
        }
        (left, right) => {
            if !options.preserve || left.is_null() {
                right
            } else {
                left
            }
        }
    }
}
