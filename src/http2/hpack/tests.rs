//! Header block vectors from RFC 7541 Appendix C.

use bytes::Bytes;
use rstest::rstest;

use super::*;

fn hex(s: &str) -> Bytes {
    let digits: Vec<u8> = s.bytes().filter(u8::is_ascii_hexdigit).collect();
    digits
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).expect("ascii digits");
            u8::from_str_radix(text, 16).expect("hex pair")
        })
        .collect::<Vec<u8>>()
        .into()
}

fn pairs(fields: &[HeaderField]) -> Vec<(String, String)> {
    fields
        .iter()
        .map(|f| {
            (
                String::from_utf8_lossy(f.name()).into_owned(),
                String::from_utf8_lossy(f.value()).into_owned(),
            )
        })
        .collect()
}

fn owned(expected: &[(&str, &str)]) -> Vec<(String, String)> {
    expected
        .iter()
        .map(|(n, v)| ((*n).to_owned(), (*v).to_owned()))
        .collect()
}

#[test]
fn request_sequence_without_huffman() {
    let mut decoder = HeaderDecoder::new(4096);

    let first = decoder
        .decode(hex("828684410f7777772e6578616d706c652e636f6d"))
        .expect("first block");
    assert_eq!(
        pairs(&first),
        owned(&[
            (":method", "GET"),
            (":scheme", "http"),
            (":path", "/"),
            (":authority", "www.example.com"),
        ])
    );
    assert_eq!(decoder.table_size(), 57);

    let second = decoder
        .decode(hex("828684be58086e6f2d6361636865"))
        .expect("second block");
    assert_eq!(
        pairs(&second),
        owned(&[
            (":method", "GET"),
            (":scheme", "http"),
            (":path", "/"),
            (":authority", "www.example.com"),
            ("cache-control", "no-cache"),
        ])
    );
    assert_eq!(decoder.table_size(), 110);

    let third = decoder
        .decode(hex(
            "828785bf400a637573746f6d2d6b65790c637573746f6d2d76616c7565",
        ))
        .expect("third block");
    assert_eq!(
        pairs(&third),
        owned(&[
            (":method", "GET"),
            (":scheme", "https"),
            (":path", "/index.html"),
            (":authority", "www.example.com"),
            ("custom-key", "custom-value"),
        ])
    );
    assert_eq!(decoder.table_size(), 164);
    assert_eq!(decoder.table_len(), 3);
}

#[test]
fn request_sequence_with_huffman() {
    let mut decoder = HeaderDecoder::new(4096);
    decoder
        .decode(hex("828684418cf1e3c2e5f23a6ba0ab90f4ff"))
        .expect("first block");
    assert_eq!(decoder.table_size(), 57);

    let second = decoder
        .decode(hex("828684be5886a8eb10649cbf"))
        .expect("second block");
    assert_eq!(
        pairs(&second).last(),
        Some(&("cache-control".to_owned(), "no-cache".to_owned()))
    );

    let third = decoder
        .decode(hex("828785bf408825a849e95ba97d7f8925a849e95bb8e8b4bf"))
        .expect("third block");
    assert_eq!(
        pairs(&third).last(),
        Some(&("custom-key".to_owned(), "custom-value".to_owned()))
    );
    assert_eq!(decoder.table_size(), 164);
}

#[test]
fn second_block_needs_first_blocks_table() {
    let mut fresh = HeaderDecoder::new(4096);
    assert_eq!(
        fresh.decode(hex("828684be5886a8eb10649cbf")),
        Err(HpackError::IndexNotFound(62))
    );
}

#[test]
fn response_sequence_evicts_at_bound() {
    let mut decoder = HeaderDecoder::new(256);
    decoder
        .decode(hex(
            "4803333032580770726976617465611d4d6f6e2c203231204f637420323031332032303a31333a3231\
             20474d546e1768747470733a2f2f7777772e6578616d706c652e636f6d",
        ))
        .expect("first response");
    assert_eq!(decoder.table_size(), 222);
    assert_eq!(decoder.table_len(), 4);

    let second = decoder
        .decode(hex("4803333037c1c0bf"))
        .expect("second response");
    assert_eq!(
        pairs(&second),
        owned(&[
            (":status", "307"),
            ("cache-control", "private"),
            ("date", "Mon, 21 Oct 2013 20:13:21 GMT"),
            ("location", "https://www.example.com"),
        ])
    );
    assert_eq!(decoder.table_size(), 222);
    let names: Vec<_> = decoder
        .table_fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    assert_eq!(
        names,
        vec![
            Bytes::from_static(b":status"),
            Bytes::from_static(b"location"),
            Bytes::from_static(b"date"),
            Bytes::from_static(b"cache-control"),
        ]
    );
}

#[test]
fn literal_without_indexing_leaves_table_alone() {
    let mut decoder = HeaderDecoder::default();
    let fields = decoder
        .decode(hex("040c2f73616d706c652f70617468"))
        .expect("literal");
    assert_eq!(pairs(&fields), owned(&[(":path", "/sample/path")]));
    assert_eq!(decoder.table_len(), 0);
}

#[test]
fn never_indexed_literal_with_new_name() {
    let mut decoder = HeaderDecoder::default();
    let fields = decoder
        .decode(hex("100870617373776f726406736563726574"))
        .expect("literal");
    assert_eq!(pairs(&fields), owned(&[("password", "secret")]));
    assert_eq!(decoder.table_len(), 0);
}

#[rstest]
#[case::zero_index("80", HpackError::ZeroIndex)]
#[case::static_overrun("be", HpackError::IndexNotFound(62))]
#[case::name_index_missing("7f00", HpackError::IndexNotFound(63))]
#[case::string_overrun("400a6375", HpackError::LengthMismatch { declared: 10, available: 2 })]
#[case::truncated_integer("ff", HpackError::UnexpectedEnd)]
#[case::integer_overflow("ffffffffffff7f", HpackError::IntegerOverflow)]
#[case::bad_huffman("4081ff0161", HpackError::Huffman)]
#[case::size_update_after_field("823f00", HpackError::MisplacedSizeUpdate)]
fn malformed_blocks_are_rejected(#[case] block: &str, #[case] expected: HpackError) {
    let mut decoder = HeaderDecoder::new(4096);
    assert_eq!(decoder.decode(hex(block)), Err(expected));
}

#[test]
fn size_update_above_bound_is_rejected() {
    // 0x3f e1 1f encodes 4096 with a five-bit prefix
    let mut decoder = HeaderDecoder::new(2048);
    assert_eq!(
        decoder.decode(hex("3fe11f")),
        Err(HpackError::SizeUpdateTooLarge {
            size: 4096,
            max: 2048,
        })
    );
}

#[test]
fn size_update_at_block_start_shrinks_table() {
    let mut decoder = HeaderDecoder::new(4096);
    decoder
        .decode(hex("828684410f7777772e6578616d706c652e636f6d"))
        .expect("populate");
    assert_eq!(decoder.table_len(), 1);

    let fields = decoder.decode(hex("2082")).expect("resize then index");
    assert_eq!(pairs(&fields), owned(&[(":method", "GET")]));
    assert_eq!(decoder.table_len(), 0);
}

#[test]
fn empty_block_yields_no_fields() {
    let mut decoder = HeaderDecoder::default();
    assert_eq!(decoder.decode(Bytes::new()), Ok(Vec::new()));
}
