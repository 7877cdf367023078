//! HTTP/2 streams decoded through the full pipeline.

mod common;

use common::{ORDER, channel_pipeline, drain, http2_config};
use rstest::rstest;
use streamtap::{
    DecodedRecord,
    PipelineConfig,
    http2::{
        CLIENT_PREFACE,
        frame::{END_HEADERS, END_STREAM},
    },
    record::Http2Record,
};
use streamtap_testing::{
    http2::{FIRST_REQUEST_BLOCK, SECOND_REQUEST_BLOCK, frame},
    session_events,
};

fn http2(records: Vec<DecodedRecord>) -> Vec<Http2Record> {
    records
        .into_iter()
        .map(|record| match record {
            DecodedRecord::Http2(r) => r,
            DecodedRecord::Http1(r) => panic!("unexpected HTTP/1 record: {r:?}"),
        })
        .collect()
}

fn header<'a>(record: &'a Http2Record, name: &str) -> Option<&'a str> {
    record
        .header_pairs
        .as_ref()?
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

#[rstest]
#[tokio::test]
async fn header_table_carries_across_frames_and_writes(http2_config: PipelineConfig) {
    let (mut pipeline, rx) = channel_pipeline(http2_config);
    let mut wire = CLIENT_PREFACE.to_vec();
    wire.extend(frame(0x4, 0, 0, b""));
    wire.extend(frame(0x1, END_HEADERS, 1, FIRST_REQUEST_BLOCK));
    wire.extend(frame(0x1, END_HEADERS, 3, SECOND_REQUEST_BLOCK));
    wire.extend(frame(0x0, END_STREAM, 3, b"body"));

    // Split mid-frame so the second HEADERS straddles two writes.
    let (first, second) = wire.split_at(wire.len() - 20);
    for event in session_events(11, &[first, second], ORDER) {
        pipeline.apply(event).await.expect("apply");
    }
    pipeline.finish().await;

    let records = http2(drain(rx).await);
    let kinds: Vec<_> = records.iter().map(|r| r.frame_kind).collect();
    assert_eq!(kinds, ["SETTINGS", "HEADERS", "HEADERS", "DATA"]);
    assert_eq!(header(&records[1], ":authority"), Some("www.example.com"));
    assert_eq!(header(&records[2], ":authority"), Some("www.example.com"));
    assert_eq!(header(&records[2], "cache-control"), Some("no-cache"));
    assert_eq!(records[3].stream_id, 3);
    assert_eq!(records[3].data_len, Some(4));
}

#[rstest]
#[tokio::test]
async fn each_connection_gets_its_own_header_table(http2_config: PipelineConfig) {
    let (mut pipeline, rx) = channel_pipeline(http2_config);
    let first = frame(0x1, END_HEADERS, 1, FIRST_REQUEST_BLOCK);
    let second = frame(0x1, END_HEADERS, 1, SECOND_REQUEST_BLOCK);
    let mut events = session_events(1, &[&first], ORDER);
    events.extend(session_events(2, &[&second], ORDER));
    for event in events {
        pipeline.apply(event).await.expect("apply");
    }
    pipeline.finish().await;

    let records = http2(drain(rx).await);
    assert_eq!(records.len(), 1, "second connection cannot see the first's table");
    assert_eq!(records[0].conn_id.as_u32(), 1);
}

#[rstest]
#[tokio::test]
async fn frames_before_a_bad_block_are_still_published(http2_config: PipelineConfig) {
    let (mut pipeline, rx) = channel_pipeline(http2_config);
    let mut wire = frame(0x0, 0, 1, b"early");
    wire.extend(frame(0x1, END_HEADERS, 1, &[0x80]));
    wire.extend(frame(0x0, 0, 1, b"never"));
    for event in session_events(4, &[&wire], ORDER) {
        pipeline.apply(event).await.expect("apply");
    }
    pipeline.finish().await;

    let records = http2(drain(rx).await);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].data_len, Some(5));
}
