use crate::NormalizeError;
use domain::MeterRecord;
use roxmltree::{Document, Node};

/// 解析一条原始电报为测量记录列表。
///
/// 预期结构：`<MBusData><DataRecord id="N">…</DataRecord>…</MBusData>`，
/// 每条记录携带 Function/StorageNumber/Unit/Value/Timestamp 子元素。
pub fn parse_telegram(payload: &[u8]) -> Result<Vec<MeterRecord>, NormalizeError> {
    let text = std::str::from_utf8(payload)
        .map_err(|err| NormalizeError::Parse(format!("telegram is not utf-8: {err}")))?;
    let doc = Document::parse(text).map_err(|err| NormalizeError::Parse(err.to_string()))?;
    let root = doc.root_element();
    if root.tag_name().name() != "MBusData" {
        return Err(NormalizeError::Parse(format!(
            "unexpected root element <{}>",
            root.tag_name().name()
        )));
    }

    let mut records = Vec::new();
    for node in root
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "DataRecord")
    {
        records.push(parse_record(node)?);
    }
    Ok(records)
}

fn parse_record(node: Node<'_, '_>) -> Result<MeterRecord, NormalizeError> {
    let id = node
        .attribute("id")
        .ok_or_else(|| NormalizeError::Parse("DataRecord without id attribute".to_string()))?;
    let id = id
        .parse::<u32>()
        .map_err(|err| NormalizeError::Parse(format!("DataRecord id {id:?}: {err}")))?;

    Ok(MeterRecord {
        id,
        function: child_text(node, "Function")?,
        storage_number: child_text(node, "StorageNumber")?,
        unit: child_text(node, "Unit")?,
        value: child_text(node, "Value")?,
        timestamp: child_text(node, "Timestamp")?,
    })
}

fn child_text(node: Node<'_, '_>, name: &str) -> Result<String, NormalizeError> {
    let child = node
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
        .ok_or_else(|| NormalizeError::Parse(format!("DataRecord missing <{name}>")))?;
    Ok(child.text().unwrap_or("").to_string())
}
