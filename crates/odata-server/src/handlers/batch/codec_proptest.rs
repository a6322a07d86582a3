//! Property-based tests for the batch codec.

use http::StatusCode;
use proptest::prelude::*;

use super::codec::{decode, decode_responses, encode};
use super::{BatchResponse, BatchResponseItem};
use crate::request::SubResponse;

fn response_strategy() -> impl Strategy<Value = SubResponse> {
    (
        prop::sample::select(vec![200u16, 201, 204, 400, 403, 404, 424, 500]),
        prop::collection::vec(any::<u8>(), 0..64),
        prop::option::of("[A-Za-z0-9-]{1,8}"),
    )
        .prop_map(|(status, body, content_id)| {
            let mut response = SubResponse::binary("application/octet-stream", body);
            response.status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
            response.with_content_id(content_id)
        })
}

fn item_strategy() -> impl Strategy<Value = BatchResponseItem> {
    prop_oneof![
        response_strategy().prop_map(BatchResponseItem::Single),
        prop::collection::vec(response_strategy(), 0..4).prop_map(BatchResponseItem::Changeset),
    ]
}

proptest! {
    #[test]
    fn test_decode_never_panics(body in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = decode("multipart/mixed; boundary=b", &body);
    }

    #[test]
    fn test_decode_never_panics_on_textual_input(
        body in "(--b(--)?\r?\n|Content-Type: (application/http|multipart/mixed; boundary=c)\r?\n|GET People HTTP/1.1\r?\n|--c(--)?\r?\n|\r?\n|[a-z ]{0,8}){0,16}"
    ) {
        let _ = decode("multipart/mixed; boundary=b", body.as_bytes());
    }

    #[test]
    fn test_encoded_responses_decode_to_the_same_responses(
        items in prop::collection::vec(item_strategy(), 0..6),
        request_boundary in "[a-z_0-9]{1,16}",
    ) {
        let response = BatchResponse { items };
        let encoded = encode(&response, &request_boundary);
        let decoded = decode_responses(&encoded.content_type, &encoded.body);
        prop_assert!(decoded.is_ok(), "decode failed: {:?}", decoded);
        prop_assert_eq!(decoded.unwrap(), response);
    }
}
