// Время и форматирование отметок времени

use chrono::{DateTime, Local, TimeZone, Utc};

/// Текущий Unix timestamp в секундах
pub fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Текущее время в RFC 3339 для исходящих кадров
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Отобразить время сообщения как `HH:MM` в локальной зоне.
///
/// Принимает RFC 3339 строку; если разобрать не удалось, возвращает исходную строку.
pub fn display_from_rfc3339(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => parsed.with_timezone(&Local).format("%H:%M").to_string(),
        Err(_) => raw.to_string(),
    }
}

/// То же самое для Unix timestamp в миллисекундах
pub fn display_from_millis(millis: i64) -> String {
    match Utc.timestamp_millis_opt(millis).single() {
        Some(parsed) => parsed.with_timezone(&Local).format("%H:%M").to_string(),
        None => millis.to_string(),
    }
}

pub fn display_now() -> String {
    Local::now().format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formats() {
        let shown = display_from_rfc3339("2024-05-01T10:15:00Z");
        assert_eq!(shown.len(), 5);
        assert_eq!(&shown[2..3], ":");

        assert_eq!(display_from_rfc3339("yesterday"), "yesterday");
        assert_eq!(display_from_millis(1_714_558_500_000).len(), 5);
    }
}
