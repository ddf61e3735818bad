use serde_json::{Map, Number, Value};
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

/// One row keyed by column name, in the order the server returned the columns.
pub type Record = Map<String, Value>;

pub type ResultSet = Vec<Record>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Signed,
    Unsigned,
    Float,
    Json,
    Binary,
    Text,
}

fn column_kind(type_name: &str) -> ColumnKind {
    let upper = type_name.to_ascii_uppercase();
    let unsigned = upper.ends_with(" UNSIGNED");
    let base = upper.split_whitespace().next().unwrap_or_default();

    match base {
        "BOOLEAN" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            if unsigned {
                ColumnKind::Unsigned
            } else {
                ColumnKind::Signed
            }
        }
        "FLOAT" | "DOUBLE" => ColumnKind::Float,
        "JSON" => ColumnKind::Json,
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => ColumnKind::Binary,
        // DECIMAL, temporal types and all character types keep their text form
        _ => ColumnKind::Text,
    }
}

// Rows arrive over the text protocol, so decoding is driven by the column's
// declared type rather than sqlx's compile-time compatibility checks.
fn decode(row: &MySqlRow, index: usize, kind: ColumnKind) -> Result<Value, sqlx::Error> {
    let value = match kind {
        ColumnKind::Signed => Value::from(row.try_get_unchecked::<i64, _>(index)?),
        ColumnKind::Unsigned => Value::from(row.try_get_unchecked::<u64, _>(index)?),
        ColumnKind::Float => {
            let v = row.try_get_unchecked::<f64, _>(index)?;
            Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
        }
        ColumnKind::Json => {
            let text = row.try_get_unchecked::<String, _>(index)?;
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        }
        ColumnKind::Binary => {
            let bytes = row.try_get_unchecked::<Vec<u8>, _>(index)?;
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        }
        ColumnKind::Text => Value::String(row.try_get_unchecked::<String, _>(index)?),
    };
    Ok(value)
}

pub fn row_to_record(row: &MySqlRow) -> Result<Record, sqlx::Error> {
    let mut record = Record::new();

    for column in row.columns() {
        let index = column.ordinal();
        let value = if row.try_get_raw(index)?.is_null() {
            Value::Null
        } else {
            decode(row, index, column_kind(column.type_info().name()))?
        };
        insert_unique(&mut record, column.name(), value);
    }

    Ok(record)
}

// Joins can repeat a column name; later ones become `name_2`, `name_3`, ...
fn insert_unique(record: &mut Record, name: &str, value: Value) {
    if !record.contains_key(name) {
        record.insert(name.to_string(), value);
        return;
    }

    let mut n = 2;
    loop {
        let candidate = format!("{}_{}", name, n);
        if !record.contains_key(&candidate) {
            record.insert(candidate, value);
            return;
        }
        n += 1;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn integer_types_respect_signedness() {
        assert_eq!(column_kind("INT"), ColumnKind::Signed);
        assert_eq!(column_kind("BIGINT UNSIGNED"), ColumnKind::Unsigned);
        assert_eq!(column_kind("BOOLEAN"), ColumnKind::Signed);
        assert_eq!(column_kind("tinyint"), ColumnKind::Signed);
    }

    #[test]
    fn decimal_and_temporal_types_stay_text() {
        for name in ["DECIMAL", "DATE", "DATETIME", "TIMESTAMP", "TIME", "VARCHAR", "CHAR", "TEXT", "ENUM"] {
            assert_eq!(column_kind(name), ColumnKind::Text, "{name}");
        }
    }

    #[test]
    fn binary_json_and_float_types() {
        assert_eq!(column_kind("VARBINARY"), ColumnKind::Binary);
        assert_eq!(column_kind("LONGBLOB"), ColumnKind::Binary);
        assert_eq!(column_kind("JSON"), ColumnKind::Json);
        assert_eq!(column_kind("DOUBLE"), ColumnKind::Float);
    }

    fn record_from_pairs(pairs: &[(&str, Value)]) -> Record {
        let mut record = Record::new();
        for (name, value) in pairs {
            insert_unique(&mut record, name, value.clone());
        }
        record
    }

    #[test]
    fn repeated_column_names_keep_every_value() {
        let record = record_from_pairs(&[
            ("id", Value::from(1)),
            ("name", Value::from("Li Lei")),
            ("id", Value::from(7)),
            ("id", Value::from(9)),
        ]);

        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"id":1,"name":"Li Lei","id_2":7,"id_3":9}"#
        );
    }

    #[test]
    fn suffix_skips_names_already_taken() {
        let record = record_from_pairs(&[
            ("id", Value::from(1)),
            ("id_2", Value::from("real column")),
            ("id", Value::from(3)),
        ]);

        assert_eq!(record["id_2"], "real column");
        assert_eq!(record["id_3"], 3);
        assert_eq!(record.len(), 3);
    }

    #[test]
    fn record_keeps_column_order() {
        let mut record = Record::new();
        record.insert("name".to_string(), Value::from("Li Lei"));
        record.insert("id".to_string(), Value::from(7));

        let keys: Vec<&str> = record.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["name", "id"]);
        assert_eq!(serde_json::to_string(&record).unwrap(), r#"{"name":"Li Lei","id":7}"#);
    }
}
