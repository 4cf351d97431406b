//! HTTPS request signing
//!
//! The camera authenticates each HTTPS request by recomputing
//! `HMAC-SHA256(shared_key, method || path || body)` and comparing it with the
//! base64url value in `Authorization: daydreamcamera <signature>`.

use hmac::{Hmac, Mac};
use mirage_keys::SharedKey;
use mirage_proto::ble::https::AUTH_SCHEME;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub fn sign(key: &SharedKey, method: &str, path: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(method.as_bytes());
    mac.update(path.as_bytes());
    mac.update(body);
    data_encoding::BASE64URL.encode(&mac.finalize().into_bytes())
}

pub fn authorization(signature: &str) -> String {
    format!("{AUTH_SCHEME} {signature}")
}
