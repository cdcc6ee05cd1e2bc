//! JSON shapes exchanged between the editor and the export endpoint.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::PosterParameters;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSubmission {
    /// Accepted as a number or a numeric string.
    #[serde(default)]
    pub post_id: serde_json::Value,
    #[serde(default)]
    pub auth_token: String,
    #[serde(default)]
    pub parameters: PosterParameters,
    /// `data:image/jpeg;base64,...` when the client captured the canvas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ExportResponse {
    pub fn ok(url: String, message: impl Into<String>) -> Self {
        Self {
            success: true,
            url: Some(url),
            message: Some(message.into()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            url: None,
            message: Some(message.into()),
        }
    }
}

pub fn parse_post_id(value: &serde_json::Value) -> Result<u64, Error> {
    let id = match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    match id {
        Some(id) if id > 0 => Ok(id),
        _ => Err(Error::InvalidInput("Invalid post ID.".into())),
    }
}

pub fn encode_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Payload bytes of a base64 data URI. A bare base64 string is accepted too.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, Error> {
    let payload = match uri.strip_prefix("data:") {
        Some(rest) => {
            let (header, data) = rest
                .split_once(',')
                .ok_or_else(|| Error::InvalidInput("Malformed image data.".into()))?;
            if !header.ends_with(";base64") {
                return Err(Error::InvalidInput("Image data must be base64 encoded.".into()));
            }
            data
        }
        None => uri,
    };
    let cleaned: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| Error::InvalidInput(format!("Malformed image data: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn post_id_accepts_numbers_and_numeric_strings() {
        assert_eq!(parse_post_id(&json!(42)).unwrap(), 42);
        assert_eq!(parse_post_id(&json!("42")).unwrap(), 42);
        assert!(parse_post_id(&json!("42abc")).is_err());
        assert!(parse_post_id(&json!(0)).is_err());
        assert!(parse_post_id(&json!(-3)).is_err());
        assert!(parse_post_id(&serde_json::Value::Null).is_err());
    }

    #[test]
    fn data_uri_decodes_payload() {
        let uri = encode_data_uri("image/jpeg", &[0xFF, 0xD8, 0xFF]);
        assert!(uri.starts_with("data:image/jpeg;base64,"));
        assert_eq!(decode_data_uri(&uri).unwrap(), vec![0xFF, 0xD8, 0xFF]);
        assert!(decode_data_uri("data:image/jpeg,rawbytes").is_err());
        assert!(decode_data_uri("data:image/jpeg;base64,@@@").is_err());
    }

    #[test]
    fn submission_uses_camel_case() {
        let sub: ExportSubmission = serde_json::from_value(json!({
            "postId": "7",
            "authToken": "t",
            "parameters": { "title": "Sortida", "pageSize": "A3" },
            "imageData": "data:image/jpeg;base64,AAAA"
        }))
        .unwrap();
        assert_eq!(parse_post_id(&sub.post_id).unwrap(), 7);
        assert_eq!(sub.parameters.title, "Sortida");
        assert!(sub.image_data.is_some());

        let resp = serde_json::to_value(ExportResponse::failure("Post not found.")).unwrap();
        assert_eq!(resp, json!({ "success": false, "message": "Post not found." }));
    }
}
