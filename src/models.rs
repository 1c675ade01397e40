use crate::error::RecordError;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;

/// One flat key/value record, as read from an input file or produced by a query.
pub type Record = Map<String, Value>;

// ===== Entities =====

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Student {
    pub id: i32,
    pub name: String,
    pub sex: String,
    pub birthday: NaiveDateTime,
    #[serde(rename = "room")]
    pub room_id: i32,
}

/// Student as it appears in input files, before the birthday is parsed.
#[derive(Deserialize)]
struct StudentInput {
    id: i32,
    name: String,
    sex: String,
    birthday: String,
    /// Input files carry the room reference under `room`.
    #[serde(rename = "room")]
    room_id: i32,
}

fn require_name(name: &str) -> Result<(), RecordError> {
    if name.trim().is_empty() {
        return Err(RecordError::EmptyName);
    }
    Ok(())
}

impl TryFrom<Record> for Room {
    type Error = RecordError;

    fn try_from(record: Record) -> Result<Self, Self::Error> {
        let room: Room = serde_json::from_value(Value::Object(record))?;
        require_name(&room.name)?;
        Ok(room)
    }
}

impl TryFrom<Record> for Student {
    type Error = RecordError;

    fn try_from(record: Record) -> Result<Self, Self::Error> {
        let input: StudentInput = serde_json::from_value(Value::Object(record))?;
        require_name(&input.name)?;
        let birthday =
            parse_birthday(&input.birthday).ok_or(RecordError::Birthday(input.birthday))?;

        Ok(Student {
            id: input.id,
            name: input.name,
            sex: input.sex,
            birthday,
            room_id: input.room_id,
        })
    }
}

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a date of birth. Time-of-day is kept when present; offsets are dropped.
pub fn parse_birthday(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }

    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|parsed| parsed.naive_utc())
}

// ===== Aggregate rows =====

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RoomStudentCount {
    pub room_id: i32,
    pub room_name: String,
    pub student_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RoomSummary {
    pub room_id: i32,
    pub room_name: String,
}

/// Convert a serializable row into a flat record, keeping field declaration order.
pub fn to_record<T: Serialize>(row: &T) -> Result<Record, serde_json::Error> {
    match serde_json::to_value(row)? {
        Value::Object(map) => Ok(map),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            Ok(map)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().expect("object literal")
    }

    #[test]
    fn student_maps_room_field_to_room_id() {
        let student = Student::try_from(record(json!({
            "id": 7,
            "name": "Peggy Ward",
            "sex": "F",
            "birthday": "2011-08-22T00:00:00.000000",
            "room": 473
        })))
        .expect("valid student");

        assert_eq!(student.room_id, 473);
        assert_eq!(student.birthday.to_string(), "2011-08-22 00:00:00");
    }

    #[test]
    fn birthday_accepts_common_layouts() {
        for raw in [
            "2004-01-07T00:00:00.000000",
            "2004-01-07 00:00:00",
            "2004-01-07",
            "2004-01-07T00:00:00Z",
        ] {
            let parsed = parse_birthday(raw).unwrap_or_else(|| panic!("{raw} should parse"));
            assert_eq!(parsed.date().to_string(), "2004-01-07");
        }
        assert!(parse_birthday("07/01/2004").is_none());
    }

    #[test]
    fn student_with_bad_birthday_is_rejected() {
        let err = Student::try_from(record(json!({
            "id": 1,
            "name": "A",
            "sex": "M",
            "birthday": "yesterday",
            "room": 1
        })))
        .unwrap_err();
        assert!(matches!(err, RecordError::Birthday(_)));
    }

    #[test]
    fn room_missing_name_is_rejected() {
        let err = Room::try_from(record(json!({ "id": 1 }))).unwrap_err();
        assert!(matches!(err, RecordError::Shape(_)));
    }

    #[test]
    fn blank_names_are_rejected() {
        let room = Room::try_from(record(json!({ "id": 50, "name": "" }))).unwrap_err();
        assert!(matches!(room, RecordError::EmptyName));

        let student = Student::try_from(record(json!({
            "id": 1,
            "name": "   ",
            "sex": "F",
            "birthday": "2004-01-07",
            "room": 1
        })))
        .unwrap_err();
        assert!(matches!(student, RecordError::EmptyName));
    }

    #[test]
    fn non_string_birthday_is_a_shape_error() {
        let err = Student::try_from(record(json!({
            "id": 1,
            "name": "A",
            "sex": "M",
            "birthday": 20040107,
            "room": 1
        })))
        .unwrap_err();
        assert!(matches!(err, RecordError::Shape(_)));
    }

    #[test]
    fn to_record_keeps_field_order() {
        let row = RoomStudentCount {
            room_id: 3,
            room_name: "Room #3".to_string(),
            student_count: 9,
        };
        let record = to_record(&row).expect("serializable");
        let keys: Vec<&str> = record.keys().map(String::as_str).collect();
        assert_eq!(keys, ["room_id", "room_name", "student_count"]);
    }
}
