use appcore::http::parse::ResponseParser;
use appcore::http::url::{url_decode, url_encode};
use appcore::{Method, ParseError, Request};

#[test]
fn url_encode_preserves_target_structure() {
    assert_eq!(url_encode("/status"), "/status");
    assert_eq!(url_encode("/a b"), "/a%20b");
    assert_eq!(url_encode("/search?q=rust&page=2"), "/search?q=rust&page=2");
    // A valid triple passes through; a bare percent is escaped.
    assert_eq!(url_encode("/already%20done"), "/already%20done");
    assert_eq!(url_encode("/100%"), "/100%25");
    assert_eq!(url_encode("/na\u{ef}ve"), "/na%C3%AFve");
}

#[test]
fn url_decode_inverts_encoding() {
    assert_eq!(url_decode("/na%C3%AFve"), "/na\u{ef}ve");
    assert_eq!(url_decode("a+b"), "a b");
    assert_eq!(url_decode("%20"), " ");
    // A percent without two hex digits stays literal.
    assert_eq!(url_decode("100%"), "100%");
}

#[test]
fn request_encodes_head_and_body() {
    let mut request = Request::new(Method::Post, "/submit");
    request.set_header("Host", "example.com");
    request.set_header("Content-Type", "text/plain");
    request.set_header("Content-Length", "5");
    request.body = b"hello".to_vec();

    let wire = request.encode();
    let text = String::from_utf8(wire).expect("utf8");
    assert!(text.starts_with("POST /submit HTTP/1.1\r\n"));
    assert!(text.contains("Host: example.com\r\n"));
    assert!(text.contains("Content-Type: text/plain\r\n"));
    assert!(text.ends_with("\r\n\r\nhello"));
}

#[test]
fn set_header_replaces_case_insensitively() {
    let mut request = Request::new(Method::Get, "/");
    request.set_header("content-type", "a");
    request.set_header("Content-Type", "b");
    assert_eq!(request.header("CONTENT-TYPE"), Some("b"));
    assert_eq!(request.headers.len(), 1);
}

#[test]
fn parses_content_length_response_incrementally() {
    let mut parser = ResponseParser::new();
    parser.feed(b"HTTP/1.1 200 OK\r\nContent-Le");
    assert!(parser.try_complete().expect("parse").is_none());
    parser.feed(b"ngth: 5\r\n\r\nhel");
    assert!(parser.try_complete().expect("parse").is_none());
    parser.feed(b"lo");

    let response = parser.try_complete().expect("parse").expect("complete");
    assert_eq!(response.status, 200);
    assert_eq!(response.reason, "OK");
    assert_eq!(response.header("content-length"), Some("5"));
    assert_eq!(response.body, b"hello");
}

#[test]
fn leftover_bytes_stay_for_the_next_response() {
    let mut parser = ResponseParser::new();
    parser.feed(
        b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\naHTTP/1.1 204 No Content\r\n\r\n",
    );

    let first = parser.try_complete().expect("parse").expect("first");
    assert_eq!(first.status, 200);
    assert_eq!(first.body, b"a");

    let second = parser.try_complete().expect("parse").expect("second");
    assert_eq!(second.status, 204);
    assert!(second.body.is_empty());
}

#[test]
fn parses_chunked_response() {
    let mut parser = ResponseParser::new();
    parser.feed(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n");

    let response = parser.try_complete().expect("parse").expect("complete");
    assert_eq!(response.body, b"Wikipedia");
}

#[test]
fn head_responses_carry_no_body() {
    let mut parser = ResponseParser::new();
    parser.reset(true);
    parser.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n");

    let response = parser.try_complete().expect("parse").expect("complete");
    assert_eq!(response.status, 200);
    assert!(response.body.is_empty());
}

#[test]
fn close_delimited_body_completes_at_eof() {
    let mut parser = ResponseParser::new();
    parser.feed(b"HTTP/1.1 200 OK\r\n\r\npartial bo");
    assert!(parser.try_complete().expect("parse").is_none());
    parser.feed(b"dy");

    let response = parser.finish_eof().expect("parse").expect("complete");
    assert_eq!(response.body, b"partial body");
}

#[test]
fn truncated_length_framed_body_is_an_error_at_eof() {
    let mut parser = ResponseParser::new();
    parser.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort");

    assert!(matches!(
        parser.finish_eof(),
        Err(ParseError::UnexpectedEof)
    ));
}

#[test]
fn malformed_status_line_is_rejected() {
    let mut parser = ResponseParser::new();
    parser.feed(b"NOT-HTTP nonsense\r\n\r\n");
    assert!(matches!(
        parser.try_complete(),
        Err(ParseError::BadStatusLine)
    ));
}
