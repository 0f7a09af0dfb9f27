//! Column decoding helpers.
//!
//! Enum and timestamp columns are stored as text. A value that does not parse
//! is reported as [`CorruptValue`] so the caller sees which table and column
//! held it.

use std::str::FromStr;

use bizpass_types::{Timestamp, format_timestamp, parse_timestamp};
use rusqlite::Row;
use rusqlite::types::Type;

use crate::error::CorruptValue;

fn corrupt(table: &'static str, column: &'static str, value: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        Type::Text,
        Box::new(CorruptValue {
            table,
            column,
            value,
        }),
    )
}

pub(crate) fn parsed<T: FromStr>(
    row: &Row<'_>,
    table: &'static str,
    column: &'static str,
) -> rusqlite::Result<T> {
    let raw: String = row.get(column)?;
    raw.parse().map_err(|_| corrupt(table, column, raw))
}

pub(crate) fn parsed_opt<T: FromStr>(
    row: &Row<'_>,
    table: &'static str,
    column: &'static str,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|raw| raw.parse().map_err(|_| corrupt(table, column, raw)))
        .transpose()
}

pub(crate) fn timestamp(
    row: &Row<'_>,
    table: &'static str,
    column: &'static str,
) -> rusqlite::Result<Timestamp> {
    let raw: String = row.get(column)?;
    parse_timestamp(&raw).ok_or_else(|| corrupt(table, column, raw))
}

pub(crate) fn timestamp_opt(
    row: &Row<'_>,
    table: &'static str,
    column: &'static str,
) -> rusqlite::Result<Option<Timestamp>> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|raw| parse_timestamp(&raw).ok_or_else(|| corrupt(table, column, raw)))
        .transpose()
}

pub(crate) fn ts(value: Timestamp) -> String {
    format_timestamp(value)
}

pub(crate) fn ts_opt(value: Option<Timestamp>) -> Option<String> {
    value.map(format_timestamp)
}
