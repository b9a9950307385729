//! Decoders for the two payload kinds every game has: raw bytes and text.
use crate::Decoder;

/// Keeps the fetched bytes as they are.
#[derive(Debug, Default, Copy, Clone)]
pub struct BytesDecoder;

impl Decoder for BytesDecoder {
    type Output = Vec<u8>;
    type Error = std::convert::Infallible;

    fn decode(&self, _path: &str, bytes: Vec<u8>) -> Result<Vec<u8>, Self::Error> {
        Ok(bytes)
    }

    fn estimate_cost(&self, item: &Vec<u8>) -> Result<u64, Self::Error> {
        Ok(item.len() as u64)
    }
}

/// Decodes UTF-8 text.
#[derive(Debug, Default, Copy, Clone)]
pub struct TextDecoder;

impl Decoder for TextDecoder {
    type Output = String;
    type Error = std::string::FromUtf8Error;

    fn decode(&self, _path: &str, bytes: Vec<u8>) -> Result<String, Self::Error> {
        String::from_utf8(bytes)
    }

    fn estimate_cost(&self, item: &String) -> Result<u64, Self::Error> {
        Ok(item.len() as u64)
    }
}
