pub mod dser;
pub mod password;
pub mod time;

use base64::prelude::Engine;
use rand::RngCore;

/// base64 url safe encode
pub fn base64_encode(input: impl AsRef<[u8]>) -> String {
    base64::prelude::BASE64_URL_SAFE_NO_PAD.encode(input)
}

/// base64 url safe decode
pub fn base64_decode(input: impl AsRef<[u8]>) -> Result<Vec<u8>, base64::DecodeError> {
    base64::prelude::BASE64_URL_SAFE_NO_PAD.decode(input)
}

/// Fresh row id.
pub fn gen_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// `len` random bytes, base64 url safe encoded.
pub fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64_encode(bytes)
}

/// 三目运算符，用宏简单实现
#[macro_export]
macro_rules! do_if {
    ($pat:expr => $suc:expr, $e:expr) => {
        if $pat {
            $suc
        } else {
            $e
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_tokens_decode_to_requested_length() {
        let token = random_token(32);
        assert_eq!(base64_decode(&token).unwrap().len(), 32);
        assert_ne!(token, random_token(32));
    }
}
