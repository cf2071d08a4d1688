//! Small reusable validators for configuration and operator input.
use std::ops::RangeInclusive;

/// Validates if a given value is within a specified numeric range.
///
/// # Arguments
///
/// * `value` - The value to validate.
/// * `range` - The inclusive range to validate against.
///
/// # Returns
///
/// * `Ok(())` if the value is within the range.
/// * `Err(&'static str)` if the value is outside the range.
pub fn is_in_range<T: PartialOrd>(value: T, range: RangeInclusive<T>) -> Result<(), &'static str> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err("Value is outside the specified range")
    }
}

/// Validates if a given string is not empty (after trimming whitespace).
///
/// # Arguments
///
/// * `value` - The string to validate.
///
/// # Returns
///
/// * `Ok(())` if the string has visible content.
/// * `Err(&'static str)` if the string is empty or blank.
pub fn is_not_empty(value: &str) -> Result<(), &'static str> {
    if !value.trim().is_empty() {
        Ok(())
    } else {
        Err("Value cannot be empty")
    }
}

/// Validates that a name can be used verbatim as a SQL column name.
///
/// Accepted names start with a lowercase ASCII letter and continue with
/// lowercase letters, digits or underscores.
pub fn is_valid_identifier(name: &str) -> Result<(), &'static str> {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        Some(_) => return Err("Identifier must start with a lowercase letter"),
        None => return Err("Identifier cannot be empty"),
    }
    if chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
        Ok(())
    } else {
        Err("Identifier may only contain lowercase letters, digits and underscores")
    }
}

/// Validates a `(low, high)` bound pair: both finite and `low <= high`.
pub fn is_ordered_bound(low: f64, high: f64) -> Result<(), &'static str> {
    if !low.is_finite() || !high.is_finite() {
        return Err("Bound values must be finite");
    }
    if low > high {
        return Err("Lower bound is greater than upper bound");
    }
    Ok(())
}
