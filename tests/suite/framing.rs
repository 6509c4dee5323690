//! Frame decoding across arbitrary read boundaries.

use tsbridge_client::codec::LineDecoder;
use tsbridge_client::protocol::{IncomingFrame, decode_line};

fn decode_all(chunks: &[&[u8]]) -> Vec<IncomingFrame> {
    let mut decoder = LineDecoder::new();
    chunks
        .iter()
        .flat_map(|chunk| decoder.push(chunk))
        .filter_map(|line| decode_line(&line))
        .map(Result::unwrap)
        .collect()
}

#[test]
fn frame_split_inside_type_key() {
    let frames = decode_all(&[
        br#"{"seq":1,"typ"#,
        b"e\":\"response\",\"request_seq\":1,\"success\":true,\"body\":{}}\n",
    ]);

    assert_eq!(frames.len(), 1);
    match &frames[0] {
        IncomingFrame::Response(r) => {
            assert_eq!(r.request_seq, 1);
            assert!(r.success);
        }
        IncomingFrame::Event(e) => panic!("expected response, got event {}", e.event),
    }
}

#[test]
fn any_two_way_split_decodes_like_the_whole() {
    let frame = "{\"seq\":0,\"type\":\"response\",\"request_seq\":4,\"success\":true,\
                 \"body\":{\"displayString\":\"const café: \u{2603} = 'ü'\"}}\n";
    let bytes = frame.as_bytes();

    let whole = LineDecoder::new().push(bytes);
    assert_eq!(whole.len(), 1);

    for at in 0..=bytes.len() {
        let mut decoder = LineDecoder::new();
        let mut lines = decoder.push(&bytes[..at]);
        lines.extend(decoder.push(&bytes[at..]));
        assert_eq!(lines, whole, "split at byte {at}");
        assert!(decode_line(&lines[0]).unwrap().is_ok());
    }
}

#[test]
fn noise_lines_are_not_frames() {
    let mut decoder = LineDecoder::new();
    let lines = decoder.push(b"Content-Length: 76\r\n\r\n{\"seq\":0,\"type\":\"event\",\"event\":\"typingsInstallerPid\",\"body\":{}}\n");

    let frames: Vec<_> = lines.iter().filter_map(|l| decode_line(l)).collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(frames.len(), 1);
}
