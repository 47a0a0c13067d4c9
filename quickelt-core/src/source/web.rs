//! Web page tables.
//!
//! Fetches a page and extracts the `table_index`-th `<table>`. The first row
//! becomes the header; cells are kept as text.

use super::{SourceInfo, SourceReader};
use crate::error::{PipelineError, Result, from_http, from_status};
use crate::table::{DataTable, unique_column_names};
use async_trait::async_trait;
use serde_json::Value;

pub struct WebPageSource {
    pub url: String,
    pub table_index: usize,
    client: reqwest::Client,
}

impl WebPageSource {
    pub fn new(url: String, table_index: usize, client: reqwest::Client) -> Self {
        Self {
            url,
            table_index,
            client,
        }
    }
}

#[async_trait]
impl SourceReader for WebPageSource {
    async fn read(&self) -> Result<DataTable> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| from_http("webscraping", &self.url, e))?;
        if !response.status().is_success() {
            return Err(from_status("webscraping", &self.url, response.status()));
        }
        let html = response
            .text()
            .await
            .map_err(|e| from_http("webscraping", &self.url, e))?;

        let tables = extract_tables(&html);
        let found = tables.len();
        let rows = tables.into_iter().nth(self.table_index).ok_or_else(|| {
            PipelineError::unreachable(
                "webscraping",
                &self.url,
                format!(
                    "no table at index {} (page has {found})",
                    self.table_index
                ),
            )
        })?;
        Ok(rows_to_table(rows))
    }

    fn info(&self) -> SourceInfo {
        SourceInfo {
            kind: "webscraping".to_string(),
            location: self.url.clone(),
            format: "webscraping".to_string(),
        }
    }
}

/// Header from the first row; short rows are padded with nulls, long rows
/// get generated column names.
fn rows_to_table(mut rows: Vec<Vec<String>>) -> DataTable {
    if rows.is_empty() {
        return DataTable::empty();
    }
    let header = rows.remove(0);
    let width = rows.iter().map(Vec::len).chain([header.len()]).max().unwrap_or(0);
    let columns = (0..width)
        .map(|i| match header.get(i) {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("column_{}", i + 1),
        })
        .collect();
    let rows = rows
        .into_iter()
        .map(|row| {
            (0..width)
                .map(|i| match row.get(i) {
                    Some(cell) if !cell.is_empty() => Value::String(cell.clone()),
                    _ => Value::Null,
                })
                .collect()
        })
        .collect();
    DataTable {
        columns: unique_column_names(columns),
        rows,
    }
}

/// Extract every `<table>` as rows of cell text. Nested tables are flattened
/// into their parent cell's text.
pub fn extract_tables(html: &str) -> Vec<Vec<Vec<String>>> {
    let mut tables: Vec<Vec<Vec<String>>> = Vec::new();
    let mut depth = 0usize;
    let mut current_rows: Vec<Vec<String>> = Vec::new();
    let mut current_row: Option<Vec<String>> = None;
    let mut current_cell: Option<String> = None;

    let mut in_tag = false;
    let mut tag = String::new();
    let mut skip_until: Option<&'static str> = None;

    for ch in html.chars() {
        if ch == '<' {
            in_tag = true;
            tag.clear();
            continue;
        }
        if in_tag {
            if ch != '>' {
                tag.push(ch);
                continue;
            }
            in_tag = false;
            let name = tag_name(&tag);

            if let Some(end) = skip_until {
                if name == end {
                    skip_until = None;
                }
                continue;
            }

            match name.as_str() {
                "script" => skip_until = Some("/script"),
                "style" => skip_until = Some("/style"),
                "table" => {
                    depth += 1;
                    if depth == 1 {
                        current_rows.clear();
                    }
                }
                "/table" if depth > 0 => {
                    depth -= 1;
                    if depth == 0 {
                        close_cell(&mut current_row, &mut current_cell);
                        close_row(&mut current_rows, &mut current_row);
                        tables.push(std::mem::take(&mut current_rows));
                    }
                }
                "tr" if depth == 1 => {
                    close_cell(&mut current_row, &mut current_cell);
                    close_row(&mut current_rows, &mut current_row);
                    current_row = Some(Vec::new());
                }
                "/tr" if depth == 1 => {
                    close_cell(&mut current_row, &mut current_cell);
                    close_row(&mut current_rows, &mut current_row);
                }
                "td" | "th" if depth == 1 => {
                    close_cell(&mut current_row, &mut current_cell);
                    if current_row.is_none() {
                        current_row = Some(Vec::new());
                    }
                    current_cell = Some(String::new());
                }
                "/td" | "/th" if depth == 1 => close_cell(&mut current_row, &mut current_cell),
                "br" => {
                    if let Some(cell) = current_cell.as_mut() {
                        cell.push(' ');
                    }
                }
                _ => {}
            }
            continue;
        }
        if skip_until.is_some() {
            continue;
        }
        if let Some(cell) = current_cell.as_mut() {
            cell.push(ch);
        }
    }

    tables
}

fn tag_name(tag: &str) -> String {
    let trimmed = tag.trim_start();
    let (prefix, rest) = match trimmed.strip_prefix('/') {
        Some(rest) => ("/", rest.trim_start()),
        None => ("", trimmed),
    };
    let name: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    format!("{prefix}{}", name.to_ascii_lowercase())
}

fn close_cell(row: &mut Option<Vec<String>>, cell: &mut Option<String>) {
    if let Some(text) = cell.take() {
        row.get_or_insert_with(Vec::new).push(clean_text(&text));
    }
}

fn close_row(rows: &mut Vec<Vec<String>>, row: &mut Option<Vec<String>>) {
    if let Some(cells) = row.take() {
        if !cells.is_empty() {
            rows.push(cells);
        }
    }
}

fn clean_text(raw: &str) -> String {
    let decoded = raw
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"
<html><head><style>td { color: red; }</style><script>var t = "<table>";</script></head>
<body>
  <table id="nav"><tr><td>menu</td></tr></table>
  <TABLE class="data">
    <thead><tr><th>Title</th><th>Price</th></tr></thead>
    <tbody>
      <tr><td> Rust &amp; You </td><td>10.5</td></tr>
      <tr><td><a href="/b">Data<br>Eng</a></td><td></td></tr>
      <tr><td>Solo</td></tr>
    </tbody>
  </TABLE>
</body></html>"#;

    #[test]
    fn test_extract_tables_skips_scripts_and_decodes() {
        let tables = extract_tables(PAGE);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0], vec![vec!["menu".to_string()]]);
        assert_eq!(tables[1][0], vec!["Title", "Price"]);
        assert_eq!(tables[1][1], vec!["Rust & You", "10.5"]);
        assert_eq!(tables[1][2], vec!["Data Eng", ""]);
    }

    #[test]
    fn test_rows_to_table_pads_short_rows() {
        let table = rows_to_table(extract_tables(PAGE).remove(1));
        assert_eq!(table.columns, vec!["Title", "Price"]);
        assert_eq!(table.rows[1], vec![json!("Data Eng"), Value::Null]);
        assert_eq!(table.rows[2], vec![json!("Solo"), Value::Null]);
    }

    #[tokio::test]
    async fn test_fetches_selected_table() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/catalog"))
            .and(header("user-agent", "QuickELT-test"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        let client =
            crate::source::http_client(Duration::from_secs(5), Some("QuickELT-test")).unwrap();
        let source = WebPageSource::new(format!("{}/catalog", server.uri()), 1, client.clone());
        let table = source.read().await.unwrap();
        assert_eq!(table.row_count(), 3);

        let missing = WebPageSource::new(format!("{}/catalog", server.uri()), 5, client);
        let err = missing.read().await.unwrap_err();
        assert!(err.to_string().contains("page has 2"));
    }
}
