//! Property tests: any payload of XML-valid characters survives the
//! produce → verify → extract round trip, in every cell of the matrix.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;

use xmlsink::writer::is_xml_char;
use xmlsink::{
    parse_document, run, Engine, Fixture, Mode, SinkDescriptor, SinkKind,
};

fn xml_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(any::<char>().prop_filter("XML Char", |&c| is_xml_char(c)), 0..64)
        .prop_map(|chars| chars.into_iter().collect())
}

proptest! {
    #[test]
    fn prop_byte_stream_round_trips(payload in xml_text()) {
        let engine = Engine::new();
        let fixture = Fixture::with_value(payload.clone());
        for mode in Mode::ALL {
            let report = run(
                &engine,
                mode,
                &SinkDescriptor::standard(SinkKind::ByteStream),
                &fixture,
            )
            .unwrap();
            let text = String::from_utf8(report.output).unwrap();
            let doc = parse_document(&text).unwrap();
            let value = doc.find_element("Value").unwrap();
            prop_assert_eq!(doc.text_content(value), payload.clone());
        }
    }

    #[test]
    fn prop_document_tree_round_trips(payload in xml_text()) {
        let engine = Engine::new();
        let fixture = Fixture::with_value(payload.clone());
        let report = run(
            &engine,
            Mode::Compiled,
            &SinkDescriptor::standard(SinkKind::DocumentTree),
            &fixture,
        )
        .unwrap();
        let text = String::from_utf8(report.output).unwrap();
        let doc = parse_document(&text).unwrap();
        let value = doc.find_element("Value").unwrap();
        prop_assert_eq!(doc.text_content(value), payload);
    }
}
