use mbus_normalize::{NormalizeError, parse_telegram};

const TELEGRAM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MBusData>
    <SlaveInformation>
        <Id>12345678</Id>
        <Manufacturer>KAM</Manufacturer>
    </SlaveInformation>
    <DataRecord id="0">
        <Function>Instantaneous value</Function>
        <StorageNumber>0</StorageNumber>
        <Unit>Energy (kWh)</Unit>
        <Value>1022</Value>
        <Timestamp>2023-02-12T08:45:37Z</Timestamp>
    </DataRecord>
    <DataRecord id="1">
        <Function>Maximum value</Function>
        <StorageNumber>0</StorageNumber>
        <Unit>Power (kW)</Unit>
        <Value>9</Value>
        <Timestamp>2023-02-12T08:45:37Z</Timestamp>
    </DataRecord>
</MBusData>
"#;

#[test]
fn parses_records_with_ids() {
    let records = parse_telegram(TELEGRAM.as_bytes()).expect("parse");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, 0);
    assert_eq!(records[0].function, "Instantaneous value");
    assert_eq!(records[0].unit, "Energy (kWh)");
    assert_eq!(records[0].value, "1022");
    assert_eq!(records[0].timestamp, "2023-02-12T08:45:37Z");
    assert_eq!(records[1].id, 1);
    assert_eq!(records[1].function, "Maximum value");
}

#[test]
fn empty_payload_is_parse_error() {
    let err = parse_telegram(b"").expect_err("parse failure");
    assert!(matches!(err, NormalizeError::Parse(_)));
}

#[test]
fn non_xml_payload_is_parse_error() {
    let err = parse_telegram(b"mbus-serial-request-data: connection failed").expect_err("parse failure");
    assert!(matches!(err, NormalizeError::Parse(_)));
}

#[test]
fn wrong_root_element_is_parse_error() {
    let err = parse_telegram(b"<Other/>").expect_err("parse failure");
    assert!(matches!(err, NormalizeError::Parse(_)));
}

#[test]
fn record_missing_field_is_parse_error() {
    let payload = br#"<MBusData><DataRecord id="0"><Function>Instantaneous value</Function></DataRecord></MBusData>"#;
    let err = parse_telegram(payload).expect_err("parse failure");
    assert!(matches!(err, NormalizeError::Parse(_)));
}

#[test]
fn telegram_without_records_is_empty() {
    let records = parse_telegram(b"<MBusData></MBusData>").expect("parse");
    assert!(records.is_empty());
}
