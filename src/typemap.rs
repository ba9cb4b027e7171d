//! Maps server-declared MonetDB type names to host SQL type codes.
//!
//! The interval families are a special case: MonetDB reports all thirteen
//! SQL interval subtypes as one of three wire type names
//! (`day_interval`, `month_interval`, `sec_interval`) and distinguishes the
//! subtype only by the descriptor's `digits`/`scale` precision pair.

use crate::constant::SqlType;

/// The thirteen SQL interval subtypes, distinguished by the server's
/// `digits` value on a `*_interval` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalKind {
    Year,
    Month,
    YearToMonth,
    Day,
    Hour,
    Minute,
    Second,
    DayToHour,
    DayToMinute,
    DayToSecond,
    HourToMinute,
    HourToSecond,
    MinuteToSecond,
}

impl IntervalKind {
    pub fn display_name(self) -> &'static str {
        match self {
            IntervalKind::Year => "INTERVAL YEAR",
            IntervalKind::Month => "INTERVAL MONTH",
            IntervalKind::YearToMonth => "INTERVAL YEAR TO MONTH",
            IntervalKind::Day => "INTERVAL DAY",
            IntervalKind::Hour => "INTERVAL HOUR",
            IntervalKind::Minute => "INTERVAL MINUTE",
            IntervalKind::Second => "INTERVAL SECOND",
            IntervalKind::DayToHour => "INTERVAL DAY TO HOUR",
            IntervalKind::DayToMinute => "INTERVAL DAY TO MINUTE",
            IntervalKind::DayToSecond => "INTERVAL DAY TO SECOND",
            IntervalKind::HourToMinute => "INTERVAL HOUR TO MINUTE",
            IntervalKind::HourToSecond => "INTERVAL HOUR TO SECOND",
            IntervalKind::MinuteToSecond => "INTERVAL MINUTE TO SECOND",
        }
    }

    /// MonetDB encodes the interval subtype in the descriptor's `digits`
    /// field, following the JDBC driver's `MonetDriver` subtype table.
    fn from_month_digits(digits: i64) -> Self {
        match digits {
            1 => IntervalKind::Year,
            2 => IntervalKind::Month,
            _ => IntervalKind::YearToMonth,
        }
    }

    fn from_sec_digits(digits: i64) -> Self {
        match digits {
            3 => IntervalKind::Day,
            4 => IntervalKind::Hour,
            5 => IntervalKind::Minute,
            6 => IntervalKind::Second,
            7 => IntervalKind::DayToHour,
            8 => IntervalKind::DayToMinute,
            9 => IntervalKind::DayToSecond,
            10 => IntervalKind::HourToMinute,
            11 => IntervalKind::HourToSecond,
            12 => IntervalKind::MinuteToSecond,
            _ => IntervalKind::DayToSecond,
        }
    }
}

/// Resolved host-API type info for a server-declared column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostType {
    pub sql_type: SqlType,
    pub interval: Option<IntervalKind>,
}

impl HostType {
    fn plain(sql_type: SqlType) -> Self {
        Self {
            sql_type,
            interval: None,
        }
    }
}

/// Maps a server type name (as reported in a `%...#type` header line) plus
/// its precision (`digits`) to a host SQL type.
///
/// `treat_blob_as_binary` / `treat_clob_as_varchar` mirror the identically
/// named connection options: they steer `blob`→`BINARY` and
/// `clob`→`VARCHAR` instead of the LOB codes, matching drivers that want to
/// avoid the stream-based LOB accessor path for small values.
pub fn map_server_type(
    name: &str,
    digits: i64,
    treat_blob_as_binary: bool,
    treat_clob_as_varchar: bool,
) -> HostType {
    match name {
        "char" => HostType::plain(SqlType::CHAR),
        "varchar" => HostType::plain(SqlType::VARCHAR),
        "clob" | "str" => HostType::plain(if treat_clob_as_varchar {
            SqlType::VARCHAR
        } else {
            SqlType::CLOB
        }),
        "boolean" => HostType::plain(SqlType::BOOLEAN),
        "tinyint" => HostType::plain(SqlType::TINYINT),
        "smallint" => HostType::plain(SqlType::SMALLINT),
        "int" | "mediumint" => HostType::plain(SqlType::INTEGER),
        "bigint" | "hugeint" | "serial" => HostType::plain(SqlType::BIGINT),
        "real" => HostType::plain(SqlType::REAL),
        "float" => HostType::plain(SqlType::FLOAT),
        "double" => HostType::plain(SqlType::DOUBLE),
        "decimal" => HostType::plain(SqlType::DECIMAL),
        "numeric" => HostType::plain(SqlType::NUMERIC),
        "date" => HostType::plain(SqlType::DATE),
        "time" => HostType::plain(SqlType::TIME),
        "timetz" => HostType::plain(SqlType::TIME_WITH_TIMEZONE),
        "timestamp" => HostType::plain(SqlType::TIMESTAMP),
        "timestamptz" => HostType::plain(SqlType::TIMESTAMP_WITH_TIMEZONE),
        "blob" => HostType::plain(if treat_blob_as_binary {
            SqlType::BINARY
        } else {
            SqlType::BLOB
        }),
        "month_interval" => HostType {
            sql_type: SqlType::INTEGER,
            interval: Some(IntervalKind::from_month_digits(digits)),
        },
        "sec_interval" | "day_interval" => HostType {
            sql_type: SqlType::DECIMAL,
            interval: Some(IntervalKind::from_sec_digits(digits)),
        },
        "inet" | "url" | "uuid" | "json" | "xml" => HostType::plain(SqlType::OTHER),
        _ => HostType::plain(SqlType::OTHER),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_common_scalar_types() {
        assert_eq!(
            map_server_type("int", 0, false, false).sql_type,
            SqlType::INTEGER
        );
        assert_eq!(
            map_server_type("varchar", 0, false, false).sql_type,
            SqlType::VARCHAR
        );
        assert_eq!(
            map_server_type("timestamptz", 0, false, false).sql_type,
            SqlType::TIMESTAMP_WITH_TIMEZONE
        );
    }

    #[test]
    fn blob_and_clob_options_retarget_type() {
        assert_eq!(
            map_server_type("blob", 0, true, false).sql_type,
            SqlType::BINARY
        );
        assert_eq!(
            map_server_type("blob", 0, false, false).sql_type,
            SqlType::BLOB
        );
        assert_eq!(
            map_server_type("clob", 0, false, true).sql_type,
            SqlType::VARCHAR
        );
        assert_eq!(
            map_server_type("clob", 0, false, false).sql_type,
            SqlType::CLOB
        );
    }

    #[test]
    fn month_interval_digits_pick_subtype() {
        let t = map_server_type("month_interval", 2, false, false);
        assert_eq!(t.interval, Some(IntervalKind::Month));
        assert_eq!(t.interval.unwrap().display_name(), "INTERVAL MONTH");
    }

    #[test]
    fn sec_interval_digits_pick_subtype() {
        let t = map_server_type("sec_interval", 9, false, false);
        assert_eq!(t.interval, Some(IntervalKind::DayToSecond));
    }

    #[test]
    fn unknown_type_name_falls_back_to_other() {
        assert_eq!(
            map_server_type("geometry", 0, false, false).sql_type,
            SqlType::OTHER
        );
    }
}
