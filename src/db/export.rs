//! Flat CSV export of the whole store.

use std::io::Write;

use tracing::info;

use super::core::Store;
use super::news::encode_datetime;
use crate::error::StoreError;
use crate::TARGET_DB;

const EXPORT_PAGE_SIZE: i64 = 10_000;

const HEADER: &str = "id,title,text,topic,cluster,datetime,publisher";

/// Quote a field when it contains a delimiter, quote or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl Store {
    /// Stream every stored item into `sink` as CSV, one header row then one
    /// row per item, paged so arbitrarily large stores never load at once.
    pub async fn export_csv(&self, sink: &mut dyn Write) -> Result<u64, StoreError> {
        writeln!(sink, "{}", HEADER)?;

        let mut offset = 0i64;
        let mut exported = 0u64;
        loop {
            let page = self.fetch_page(EXPORT_PAGE_SIZE, offset).await?;
            if page.is_empty() {
                break;
            }
            for item in &page {
                let datetime = item
                    .published_at
                    .as_ref()
                    .map(encode_datetime)
                    .unwrap_or_default();
                writeln!(
                    sink,
                    "{},{},{},{},{},{},{}",
                    item.id,
                    csv_field(&item.title),
                    csv_field(&item.text),
                    csv_field(item.topic.as_deref().unwrap_or_default()),
                    csv_field(&item.cluster),
                    datetime,
                    csv_field(item.publisher.as_deref().unwrap_or_default()),
                )?;
            }
            exported += page.len() as u64;
            offset += EXPORT_PAGE_SIZE;
        }

        sink.flush()?;
        info!(target: TARGET_DB, "Exported {} items", exported);
        Ok(exported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnLimits, NewsItem};
    use chrono::NaiveDate;

    #[test]
    fn fields_are_quoted_only_when_needed() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[tokio::test]
    async fn export_writes_header_and_every_row() {
        let store = Store::open_in_memory(ColumnLimits::default()).await.unwrap();
        store
            .insert_items(&[
                NewsItem {
                    title: "Quiet day".to_string(),
                    text: "nothing happened".to_string(),
                    topic: None,
                    cluster: "Events, minor".to_string(),
                    published_at: NaiveDate::from_ymd_opt(2018, 3, 12)
                        .unwrap()
                        .and_hms_opt(22, 40, 0),
                    publisher: Some("wire".to_string()),
                },
                NewsItem {
                    title: "Second".to_string(),
                    text: "something else".to_string(),
                    topic: Some("world".to_string()),
                    cluster: "Other".to_string(),
                    published_at: None,
                    publisher: None,
                },
            ])
            .await
            .unwrap();

        let mut out: Vec<u8> = Vec::new();
        let exported = store.export_csv(&mut out).await.unwrap();
        assert_eq!(exported, 2);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "id,title,text,topic,cluster,datetime,publisher");
        assert_eq!(
            lines[1],
            "1,Quiet day,nothing happened,,\"Events, minor\",2018-03-12T22:40:00,wire"
        );
        assert_eq!(lines[2], "2,Second,something else,world,Other,,");
    }
}
