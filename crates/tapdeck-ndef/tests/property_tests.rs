//! Property-based tests for the NDEF Text codec.
//!
//! These use proptest to verify the codec invariants over arbitrary valid
//! inputs rather than hand-picked vectors.

use proptest::prelude::*;

use tapdeck_ndef::{decode_text, encode_text, Alignment, MAX_TEXT_LEN};

/// Strategy for text payloads that fit a short record.
///
/// `prop::string::string_regex` counts characters, so the byte cap is
/// enforced with an explicit filter over the UTF-8 length.
fn short_text() -> impl Strategy<Value = String> {
    "\\PC{0,200}".prop_filter("must fit a short record", |s| s.len() <= MAX_TEXT_LEN)
}

fn any_alignment() -> impl Strategy<Value = Alignment> {
    prop_oneof![Just(Alignment::Page), Just(Alignment::Block)]
}

proptest! {
    /// decode(encode(s)) == s for any text that fits a short record.
    #[test]
    fn roundtrip(text in short_text(), alignment in any_alignment()) {
        let encoded = encode_text(&text, alignment).unwrap();
        prop_assert_eq!(decode_text(&encoded), text);
    }

    /// Encoded messages are always aligned and terminated.
    #[test]
    fn encoding_is_aligned(text in short_text()) {
        let page = encode_text(&text, Alignment::Page).unwrap();
        prop_assert_eq!(page.len() % 4, 0);

        let block = encode_text(&text, Alignment::Block).unwrap();
        prop_assert_eq!(block.len() % 16, 0);
        prop_assert!(block.contains(&0xFE));
    }

    /// Garbage prefixes never break decoding of a valid message.
    #[test]
    fn decode_survives_prefix(
        text in short_text(),
        // 0x03 is excluded so the prefix cannot open a TLV of its own and
        // swallow the real message as its value.
        prefix in prop::collection::vec(any::<u8>().prop_map(|b| if b == 0x03 { 0x00 } else { b }), 0..24),
    ) {
        let mut bytes = prefix;
        bytes.extend(encode_text(&text, Alignment::Page).unwrap());
        prop_assert_eq!(decode_text(&bytes), text);
    }

    /// Decoding arbitrary bytes never panics and never errors.
    #[test]
    fn decode_total(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = decode_text(&bytes);
    }
}
