//! Types shared by the Image Gallery API and its web client.
//!
//! The API serializes these on the wire and the client deserializes them, so
//! both sides agree on field names (snake_case) and on the title rules.

pub mod claims;
pub mod endpoints;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Longest title the API accepts
pub const MAX_TITLE_LEN: usize = 150;

/// An image as returned by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: Uuid,
    pub title: String,
    /// File name under the API's `/images/` path
    pub file_name: String,
}

/// Payload for `POST /api/images`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageForCreation {
    pub title: String,
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
}

/// Payload for `PUT /api/images/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageForUpdate {
    pub title: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TitleError {
    #[error("title is required")]
    Missing,

    #[error("title must be at most {MAX_TITLE_LEN} characters")]
    TooLong,
}

/// Check a user-supplied title
pub fn validate_title(title: &str) -> Result<(), TitleError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(TitleError::Missing);
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(TitleError::TooLong);
    }
    Ok(())
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_rules() {
        assert_eq!(validate_title("Sunset"), Ok(()));
        assert_eq!(validate_title("   "), Err(TitleError::Missing));
        assert_eq!(validate_title(&"x".repeat(151)), Err(TitleError::TooLong));
        assert_eq!(validate_title(&"x".repeat(150)), Ok(()));
    }

    #[test]
    fn test_creation_bytes_travel_as_base64() {
        let payload = ImageForCreation {
            title: "A".to_string(),
            bytes: vec![0xff, 0x00, 0x10],
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["bytes"], "/wAQ");

        let back: ImageForCreation = serde_json::from_value(json).unwrap();
        assert_eq!(back.bytes, vec![0xff, 0x00, 0x10]);
    }

    #[test]
    fn test_image_field_names() {
        let image = Image {
            id: Uuid::nil(),
            title: "t".to_string(),
            file_name: "f.jpg".to_string(),
        };
        let json = serde_json::to_value(&image).unwrap();
        assert!(json.get("file_name").is_some());
    }
}
