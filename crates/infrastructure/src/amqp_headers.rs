//! AMQP 消息头与领域 `MessageHeaders` 之间的转换

use lapin::types::{AMQPValue, FieldTable};

use feeder_domain::MessageHeaders;

const X_DEATH: &str = "x-death";

/// 将字符串类型的头部转换为领域头部，非字符串值（如 `x-death`）被忽略
pub fn string_headers(table: &FieldTable) -> MessageHeaders {
    table
        .inner()
        .iter()
        .filter_map(|(key, value)| {
            value_as_str(value).map(|text| (key.as_str().to_string(), text.to_string()))
        })
        .collect()
}

/// 构建发布用的头部表
pub fn field_table(headers: &MessageHeaders) -> FieldTable {
    let mut table = FieldTable::default();
    for (key, value) in headers {
        table.insert(
            key.clone().into(),
            AMQPValue::LongString(value.clone().into()),
        );
    }
    table
}

/// 从 `x-death` 头部读取死信次数
///
/// 优先选择 queue 为 `queue` 且 reason 为 `rejected` 的条目，否则退回到第一条。
/// 没有 `x-death` 头部时返回 `None`。
pub fn death_count(table: &FieldTable, queue: &str) -> Option<u32> {
    let deaths = match table
        .inner()
        .iter()
        .find(|(key, _)| key.as_str() == X_DEATH)
        .map(|(_, value)| value)?
    {
        AMQPValue::FieldArray(array) => array,
        _ => return None,
    };

    let entries: Vec<&FieldTable> = deaths
        .as_slice()
        .iter()
        .filter_map(|value| match value {
            AMQPValue::FieldTable(entry) => Some(entry),
            _ => None,
        })
        .collect();

    let chosen = entries
        .iter()
        .find(|entry| {
            field_str(entry, "queue") == Some(queue)
                && field_str(entry, "reason") == Some("rejected")
        })
        .or_else(|| entries.first())?;

    field_int(chosen, "count").and_then(|count| u32::try_from(count).ok())
}

fn field<'a>(table: &'a FieldTable, name: &str) -> Option<&'a AMQPValue> {
    table
        .inner()
        .iter()
        .find(|(key, _)| key.as_str() == name)
        .map(|(_, value)| value)
}

fn field_str<'a>(table: &'a FieldTable, name: &str) -> Option<&'a str> {
    field(table, name).and_then(value_as_str)
}

fn field_int(table: &FieldTable, name: &str) -> Option<i64> {
    match field(table, name)? {
        AMQPValue::LongLongInt(value) => Some(*value),
        AMQPValue::LongInt(value) => Some(i64::from(*value)),
        AMQPValue::LongUInt(value) => Some(i64::from(*value)),
        AMQPValue::ShortInt(value) => Some(i64::from(*value)),
        AMQPValue::ShortUInt(value) => Some(i64::from(*value)),
        AMQPValue::ShortShortInt(value) => Some(i64::from(*value)),
        AMQPValue::ShortShortUInt(value) => Some(i64::from(*value)),
        _ => None,
    }
}

fn value_as_str(value: &AMQPValue) -> Option<&str> {
    match value {
        AMQPValue::ShortString(text) => Some(text.as_str()),
        AMQPValue::LongString(text) => std::str::from_utf8(text.as_bytes()).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use lapin::types::{FieldArray, ShortString};

    use super::*;

    fn death_entry(queue: &str, reason: &str, count: i64) -> AMQPValue {
        let mut entry = FieldTable::default();
        entry.insert(
            ShortString::from("queue"),
            AMQPValue::LongString(queue.into()),
        );
        entry.insert(
            ShortString::from("reason"),
            AMQPValue::LongString(reason.into()),
        );
        entry.insert(ShortString::from("count"), AMQPValue::LongLongInt(count));
        AMQPValue::FieldTable(entry)
    }

    fn with_deaths(entries: Vec<AMQPValue>) -> FieldTable {
        let mut array = FieldArray::default();
        for entry in entries {
            array.push(entry);
        }
        let mut table = FieldTable::default();
        table.insert(ShortString::from(X_DEATH), AMQPValue::FieldArray(array));
        table
    }

    #[test]
    fn test_death_count_absent() {
        assert_eq!(death_count(&FieldTable::default(), "node-feeder"), None);
    }

    #[test]
    fn test_death_count_prefers_rejected_entry_for_queue() {
        let table = with_deaths(vec![
            death_entry("node-feeder.waiting", "expired", 7),
            death_entry("node-feeder", "rejected", 2),
        ]);
        assert_eq!(death_count(&table, "node-feeder"), Some(2));
    }

    #[test]
    fn test_death_count_falls_back_to_first_entry() {
        let table = with_deaths(vec![
            death_entry("other", "expired", 4),
            death_entry("another", "rejected", 1),
        ]);
        assert_eq!(death_count(&table, "node-feeder"), Some(4));
    }

    #[test]
    fn test_string_headers_skip_non_strings() {
        let mut table = with_deaths(vec![death_entry("node-feeder", "rejected", 1)]);
        table.insert(
            ShortString::from("x-node-target"),
            AMQPValue::LongString("acme.*".into()),
        );

        let headers = string_headers(&table);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("x-node-target").map(String::as_str), Some("acme.*"));
    }

    #[test]
    fn test_field_table_carries_every_header() {
        let mut headers = MessageHeaders::new();
        headers.insert("x-node-target".to_string(), "acme.uk-sa2024-hnode-v1-0a3f".to_string());

        let table = field_table(&headers);
        assert_eq!(string_headers(&table), headers);
    }
}
