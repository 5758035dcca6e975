//! Turns backend payloads into the fields of a [`TurnResult`](crate::models::TurnResult).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::backend::{FetchedAsset, GenerateResponse, GroundingChunk, InlineData};
use crate::models::GroundingSource;

const DEFAULT_VIDEO_MIME: &str = "video/mp4";

/// Web and maps citations flattened to `{title?, uri}`. Chunks without a uri
/// carry nothing to link to and are dropped.
pub fn grounding_sources(chunks: &[GroundingChunk]) -> Vec<GroundingSource> {
    chunks
        .iter()
        .filter_map(|chunk| {
            let (title, uri) = match chunk {
                GroundingChunk::Web { title, uri } | GroundingChunk::Maps { title, uri } => (title, uri),
            };
            Some(GroundingSource {
                title: title.clone(),
                uri: uri.clone()?,
            })
        })
        .collect()
}

pub fn inline_data_url(data: &InlineData) -> String {
    format!("data:{};base64,{}", data.mime_type, data.data)
}

/// Data URL for the last media part of a response, if there is one.
pub fn media_url(response: &GenerateResponse) -> Option<String> {
    response.media.last().map(inline_data_url)
}

/// Non-empty response text, or `fallback`.
pub fn text_or(response: &GenerateResponse, fallback: &str) -> String {
    response
        .text
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/// Encodes downloaded asset bytes as a data URL. The MIME type comes from
/// the response, then the uri's extension, then a video default.
pub fn asset_data_url(asset: &FetchedAsset, uri: &str) -> String {
    let mime = asset
        .mime_type
        .clone()
        .filter(|m| !m.is_empty() && m != "application/octet-stream")
        .or_else(|| {
            let path = uri.split(['?', '#']).next().unwrap_or(uri);
            mime_guess::from_path(path).first().map(|m| m.to_string())
        })
        .unwrap_or_else(|| DEFAULT_VIDEO_MIME.to_string());
    format!("data:{};base64,{}", mime, STANDARD.encode(&asset.bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_grounding_sources_normalized() {
        let chunks = vec![
            GroundingChunk::Web {
                title: Some("Met Office".into()),
                uri: Some("https://metoffice.gov.uk".into()),
            },
            GroundingChunk::Maps {
                title: None,
                uri: Some("https://maps.google.com/?cid=1".into()),
            },
            GroundingChunk::Web {
                title: Some("dangling".into()),
                uri: None,
            },
        ];
        let sources = grounding_sources(&chunks);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].title.as_deref(), Some("Met Office"));
        assert_eq!(sources[1].title, None);
        assert_eq!(sources[1].uri, "https://maps.google.com/?cid=1");
    }

    #[test]
    fn test_media_url_uses_last_part() {
        let response = GenerateResponse {
            media: vec![
                InlineData {
                    mime_type: "image/png".into(),
                    data: "AAA".into(),
                },
                InlineData {
                    mime_type: "image/jpeg".into(),
                    data: "BBB".into(),
                },
            ],
            ..Default::default()
        };
        assert_eq!(media_url(&response).as_deref(), Some("data:image/jpeg;base64,BBB"));
        assert_eq!(media_url(&GenerateResponse::default()), None);
    }

    #[test]
    fn test_text_fallback() {
        assert_eq!(text_or(&GenerateResponse::from_text("hi"), "fb"), "hi");
        assert_eq!(text_or(&GenerateResponse::from_text("  "), "fb"), "fb");
        assert_eq!(text_or(&GenerateResponse::default(), "fb"), "fb");
    }

    #[test]
    fn test_asset_data_url_mime_resolution() {
        let asset = FetchedAsset {
            mime_type: None,
            bytes: Bytes::from_static(b"abc"),
        };
        assert_eq!(
            asset_data_url(&asset, "https://host/files/clip.webm?alt=media"),
            "data:video/webm;base64,YWJj"
        );
        assert_eq!(
            asset_data_url(&asset, "https://host/files/abc:download?alt=media"),
            "data:video/mp4;base64,YWJj"
        );

        let typed = FetchedAsset {
            mime_type: Some("video/quicktime".into()),
            bytes: Bytes::from_static(b"abc"),
        };
        assert_eq!(asset_data_url(&typed, "x"), "data:video/quicktime;base64,YWJj");
    }
}
