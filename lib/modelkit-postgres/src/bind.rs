//! Conversion between modelkit values and PostgreSQL arguments and rows.

use modelkit::{ModelError, Row, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Arguments, Column, Row as _, TypeInfo};

/// Build arguments for one bound parameter set.
pub fn bind_params(params: &[Value]) -> Result<PgArguments, ModelError> {
    let mut args = PgArguments::default();
    for value in params {
        bind_value(&mut args, value)?;
    }
    Ok(args)
}

/// Bind a Value to PgArguments.
pub fn bind_value(args: &mut PgArguments, value: &Value) -> Result<(), ModelError> {
    match value {
        Value::String(s) => args.add(s.as_str()),
        Value::Int(n) => args.add(*n),
        // PostgreSQL doesn't have unsigned, use i64
        Value::UInt(n) => args.add(i64::try_from(*n).map_err(|_| {
            ModelError::UnexpectedValue(format!("{} does not fit a BIGINT", n))
        })?),
        Value::Float(n) => args.add(*n),
        Value::Bool(b) => args.add(*b),
        Value::Strings(v) => args.add(v.as_slice()),
        Value::Datetime(dt) => args.add(*dt),
        Value::Json(json) => args.add(json.clone()),
        Value::Null => args.add(None::<String>),
    }
    .map_err(|e| ModelError::session(e.to_string()))
}

/// Convert a PostgreSQL row into an ordered column/value map.
pub fn decode_row(row: &PgRow) -> Result<Row, ModelError> {
    let mut decoded = Row::new();
    for idx in 0..row.columns().len() {
        let name = row.columns()[idx].name().to_string();
        decoded.insert(name, column_value(row, idx)?);
    }
    Ok(decoded)
}

/// Decode the first column, as returned by `SELECT COUNT(*)` or `RETURNING`.
pub fn first_column(row: &PgRow) -> Result<Value, ModelError> {
    if row.columns().is_empty() {
        return Err(ModelError::UnexpectedValue(
            "row has no columns".to_string(),
        ));
    }
    column_value(row, 0)
}

fn get<'r, T>(row: &'r PgRow, idx: usize) -> Result<Option<T>, ModelError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get::<Option<T>, _>(idx)
        .map_err(|e| ModelError::session(e.to_string()))
}

/// Extract a column value by its PostgreSQL type.
fn column_value(row: &PgRow, idx: usize) -> Result<Value, ModelError> {
    let type_name = row.columns()[idx].type_info().name();

    let value: Value = match type_name {
        "BOOL" => get::<bool>(row, idx)?.into(),
        "INT2" => get::<i16>(row, idx)?.map(i64::from).into(),
        "INT4" => get::<i32>(row, idx)?.map(i64::from).into(),
        "INT8" => get::<i64>(row, idx)?.into(),
        "FLOAT4" => get::<f32>(row, idx)?.map(f64::from).into(),
        "FLOAT8" => get::<f64>(row, idx)?.into(),
        "TIMESTAMPTZ" => get::<chrono::DateTime<chrono::Utc>>(row, idx)?.into(),
        "TIMESTAMP" => get::<chrono::NaiveDateTime>(row, idx)?
            .map(|dt| dt.and_utc())
            .into(),
        "JSON" | "JSONB" => get::<serde_json::Value>(row, idx)?.into(),
        "TEXT[]" | "VARCHAR[]" => get::<Vec<String>>(row, idx)?.into(),
        // VARCHAR, TEXT, CHAR, NAME and anything else readable as text
        _ => get::<String>(row, idx)?.into(),
    };

    Ok(value)
}
