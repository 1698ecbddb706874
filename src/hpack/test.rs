//! RFC 7541 Appendix C decoding vectors and encoder/decoder agreement.
use bytes::{Bytes, BytesMut};

use super::{Decoder, Encoder, Huffman, Indexing};

fn decode_all(decoder: &mut Decoder, block: &[u8]) -> Vec<(String, String)> {
    decoder
        .decode_block(Bytes::copy_from_slice(block))
        .unwrap()
}

fn dynamic(decoder: &Decoder) -> Vec<(String, String)> {
    decoder
        .context()
        .dynamic()
        .map(|(n, v)| (n.to_owned(), v.to_owned()))
        .collect()
}

fn pairs(fields: &[(&str, &str)]) -> Vec<(String, String)> {
    fields
        .iter()
        .map(|&(n, v)| (n.to_owned(), v.to_owned()))
        .collect()
}

/// C.2.1. Literal Header Field with Indexing
#[test]
fn test_literal_with_indexing() {
    let mut decoder = Decoder::new();
    let block = [
        0x40, 0x0a, 0x63, 0x75, 0x73, 0x74, 0x6f, 0x6d, 0x2d, 0x6b, 0x65, 0x79, 0x0d, 0x63,
        0x75, 0x73, 0x74, 0x6f, 0x6d, 0x2d, 0x68, 0x65, 0x61, 0x64, 0x65, 0x72,
    ];

    let fields = decode_all(&mut decoder, &block);
    assert_eq!(fields, pairs(&[("custom-key", "custom-header")]));
    assert_eq!(decoder.context().size(), 55);
    assert_eq!(dynamic(&decoder), pairs(&[("custom-key", "custom-header")]));
}

/// C.2.2. Literal Header Field without Indexing
#[test]
fn test_literal_without_indexing() {
    let mut decoder = Decoder::new();
    let block = [
        0x04, 0x0c, 0x2f, 0x73, 0x61, 0x6d, 0x70, 0x6c, 0x65, 0x2f, 0x70, 0x61, 0x74, 0x68,
    ];

    let fields = decode_all(&mut decoder, &block);
    assert_eq!(fields, pairs(&[(":path", "/sample/path")]));
    assert_eq!(decoder.context().size(), 0);
}

/// C.2.3. Literal Header Field Never Indexed
#[test]
fn test_literal_never_indexed() {
    let mut decoder = Decoder::new();
    let block = [
        0x10, 0x08, 0x70, 0x61, 0x73, 0x73, 0x77, 0x6f, 0x72, 0x64, 0x06, 0x73, 0x65, 0x63,
        0x72, 0x65, 0x74,
    ];

    let fields = decode_all(&mut decoder, &block);
    assert_eq!(fields, pairs(&[("password", "secret")]));
    assert_eq!(decoder.context().size(), 0);
}

/// C.2.4. Indexed Header Field
#[test]
fn test_indexed_field() {
    let mut decoder = Decoder::new();
    let fields = decode_all(&mut decoder, &[0x82]);
    assert_eq!(fields, pairs(&[(":method", "GET")]));
    assert_eq!(decoder.context().size(), 0);
}

/// C.3. Request Examples without Huffman Coding
#[test]
fn test_request_vectors_raw() {
    const REQ1: [u8; 20] = [
        0x82, 0x86, 0x84, 0x41, 0x0f, 0x77, 0x77, 0x77, 0x2e, 0x65, 0x78, 0x61, 0x6d, 0x70,
        0x6c, 0x65, 0x2e, 0x63, 0x6f, 0x6d,
    ];
    const REQ2: [u8; 14] = [
        0x82, 0x86, 0x84, 0xbe, 0x58, 0x08, 0x6e, 0x6f, 0x2d, 0x63, 0x61, 0x63, 0x68, 0x65,
    ];
    const REQ3: [u8; 29] = [
        0x82, 0x87, 0x85, 0xbf, 0x40, 0x0a, 0x63, 0x75, 0x73, 0x74, 0x6f, 0x6d, 0x2d, 0x6b,
        0x65, 0x79, 0x0c, 0x63, 0x75, 0x73, 0x74, 0x6f, 0x6d, 0x2d, 0x76, 0x61, 0x6c, 0x75,
        0x65,
    ];
    run_request_vectors(&REQ1, &REQ2, &REQ3);
}

/// C.4. Request Examples with Huffman Coding
#[test]
fn test_request_vectors_huffman() {
    const REQ1: [u8; 17] = [
        0x82, 0x86, 0x84, 0x41, 0x8c, 0xf1, 0xe3, 0xc2, 0xe5, 0xf2, 0x3a, 0x6b, 0xa0, 0xab,
        0x90, 0xf4, 0xff,
    ];
    const REQ2: [u8; 12] = [
        0x82, 0x86, 0x84, 0xbe, 0x58, 0x86, 0xa8, 0xeb, 0x10, 0x64, 0x9c, 0xbf,
    ];
    const REQ3: [u8; 24] = [
        0x82, 0x87, 0x85, 0xbf, 0x40, 0x88, 0x25, 0xa8, 0x49, 0xe9, 0x5b, 0xa9, 0x7d, 0x7f,
        0x89, 0x25, 0xa8, 0x49, 0xe9, 0x5b, 0xb8, 0xe8, 0xb4, 0xbf,
    ];
    run_request_vectors(&REQ1, &REQ2, &REQ3);
}

fn run_request_vectors(req1: &[u8], req2: &[u8], req3: &[u8]) {
    let mut decoder = Decoder::new();

    let fields = decode_all(&mut decoder, req1);
    assert_eq!(
        fields,
        pairs(&[
            (":method", "GET"),
            (":scheme", "http"),
            (":path", "/"),
            (":authority", "www.example.com"),
        ])
    );
    assert_eq!(dynamic(&decoder), pairs(&[(":authority", "www.example.com")]));
    assert_eq!(decoder.context().size(), 57);

    let fields = decode_all(&mut decoder, req2);
    assert_eq!(
        fields,
        pairs(&[
            (":method", "GET"),
            (":scheme", "http"),
            (":path", "/"),
            (":authority", "www.example.com"),
            ("cache-control", "no-cache"),
        ])
    );
    assert_eq!(
        dynamic(&decoder),
        pairs(&[("cache-control", "no-cache"), (":authority", "www.example.com")])
    );
    assert_eq!(decoder.context().size(), 110);

    let fields = decode_all(&mut decoder, req3);
    assert_eq!(
        fields,
        pairs(&[
            (":method", "GET"),
            (":scheme", "https"),
            (":path", "/index.html"),
            (":authority", "www.example.com"),
            ("custom-key", "custom-value"),
        ])
    );
    assert_eq!(
        dynamic(&decoder),
        pairs(&[
            ("custom-key", "custom-value"),
            ("cache-control", "no-cache"),
            (":authority", "www.example.com"),
        ])
    );
    assert_eq!(decoder.context().size(), 164);
}

/// C.5. Response Examples without Huffman Coding, 256-byte table
#[test]
fn test_response_vectors_with_eviction() {
    const RES1: [u8; 70] = [
        0x48, 0x03, 0x33, 0x30, 0x32, 0x58, 0x07, 0x70, 0x72, 0x69, 0x76, 0x61, 0x74, 0x65,
        0x61, 0x1d, 0x4d, 0x6f, 0x6e, 0x2c, 0x20, 0x32, 0x31, 0x20, 0x4f, 0x63, 0x74, 0x20,
        0x32, 0x30, 0x31, 0x33, 0x20, 0x32, 0x30, 0x3a, 0x31, 0x33, 0x3a, 0x32, 0x31, 0x20,
        0x47, 0x4d, 0x54, 0x6e, 0x17, 0x68, 0x74, 0x74, 0x70, 0x73, 0x3a, 0x2f, 0x2f, 0x77,
        0x77, 0x77, 0x2e, 0x65, 0x78, 0x61, 0x6d, 0x70, 0x6c, 0x65, 0x2e, 0x63, 0x6f, 0x6d,
    ];
    const RES2: [u8; 8] = [0x48, 0x03, 0x33, 0x30, 0x37, 0xc1, 0xc0, 0xbf];

    let mut decoder = Decoder::with_limit(256);

    let fields = decode_all(&mut decoder, &RES1);
    assert_eq!(
        fields,
        pairs(&[
            (":status", "302"),
            ("cache-control", "private"),
            ("date", "Mon, 21 Oct 2013 20:13:21 GMT"),
            ("location", "https://www.example.com"),
        ])
    );
    assert_eq!(decoder.context().size(), 222);

    // the second response evicts (:status, 302) to make room for 307
    let fields = decode_all(&mut decoder, &RES2);
    assert_eq!(
        fields,
        pairs(&[
            (":status", "307"),
            ("cache-control", "private"),
            ("date", "Mon, 21 Oct 2013 20:13:21 GMT"),
            ("location", "https://www.example.com"),
        ])
    );
    assert_eq!(
        dynamic(&decoder),
        pairs(&[
            (":status", "307"),
            ("location", "https://www.example.com"),
            ("date", "Mon, 21 Oct 2013 20:13:21 GMT"),
            ("cache-control", "private"),
        ])
    );
    assert_eq!(decoder.context().size(), 222);
}

/// Encoder and decoder dynamic tables stay identical across a block.
#[test]
fn test_tables_stay_in_sync() {
    let fields = [
        (":method", "GET"),
        (":path", "/search"),
        ("x-trace", "abc123"),
        ("x-trace", "abc123"),
        ("user-agent", "tenon"),
    ];

    for huffman in [Huffman::Never, Huffman::Always, Huffman::Auto] {
        let mut encoder = Encoder::with_policies(Indexing::Incremental, huffman);
        let mut out = BytesMut::new();
        encoder.encode_block(fields, &mut out);

        let mut decoder = Decoder::new();
        let decoded = decoder.decode_block(out.freeze()).unwrap();
        assert_eq!(decoded, pairs(&fields));

        let enc_table: Vec<_> = encoder.context().dynamic().collect();
        let dec_table: Vec<_> = decoder.context().dynamic().collect();
        assert_eq!(enc_table, dec_table);
        assert_eq!(encoder.context().size(), decoder.context().size());
    }
}

/// Fully-indexed pairs are emitted as one-or-few-byte references.
#[test]
fn test_encoder_uses_full_index() {
    let mut encoder = Encoder::with_policies(Indexing::Never, Huffman::Never);
    let mut out = BytesMut::new();
    encoder.encode(":method", "GET", &mut out);
    assert_eq!(&out[..], &[0x82]);

    let mut out = BytesMut::new();
    encoder.encode(":path", "/index.html", &mut out);
    assert_eq!(&out[..], &[0x85]);
}

/// A size update at the head of a block shrinks the decoder table.
#[test]
fn test_size_update() {
    let mut decoder = Decoder::new();
    decode_all(
        &mut decoder,
        &[
            0x40, 0x03, 0x78, 0x2d, 0x61, 0x01, 0x31, // x-a: 1, indexed
        ],
    );
    assert_eq!(decoder.context().size(), 36);

    // 0x20 | 0 => table size update to zero
    let fields = decode_all(&mut decoder, &[0x20, 0x82]);
    assert_eq!(fields, pairs(&[(":method", "GET")]));
    assert_eq!(decoder.context().size(), 0);
    assert_eq!(dynamic(&decoder), pairs(&[]));
}

/// Never-indexed literals stay out of the dynamic table.
#[test]
fn test_never_indexed_not_stored() {
    let mut encoder = Encoder::with_policies(Indexing::Incremental, Huffman::Never);
    let mut decoder = Decoder::new();

    let mut out = BytesMut::new();
    encoder.encode("x-public", "yes", &mut out);
    let block = out.freeze();
    decoder.decode_block(block).unwrap();
    assert_eq!(decoder.context().size(), encoder.context().size());

    // hand-built never-indexed field
    let block = [
        0x10, 0x06, 0x73, 0x65, 0x63, 0x72, 0x65, 0x74, 0x03, 0x31, 0x32, 0x33,
    ];
    let before = decoder.context().size();
    let fields = decode_all(&mut decoder, &block);
    assert_eq!(fields, pairs(&[("secret", "123")]));
    assert_eq!(decoder.context().size(), before);
}
