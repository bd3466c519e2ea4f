//! Page records stored by the pipeline.

use crate::content::ContentRecord;
use crate::error::{ErrorKind, Result};
use rvs_metadata::Record;
use rvs_storage::BackendKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Encoded image formats accepted as page content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Png,
    Tif,
    Tiff,
    Jpg,
    Jpeg,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Tif => "tif",
            ImageFormat::Tiff => "tiff",
            ImageFormat::Jpg => "jpg",
            ImageFormat::Jpeg => "jpeg",
        }
    }
}

impl Display for ImageFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFormat {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "tif" => Ok(ImageFormat::Tif),
            "tiff" => Ok(ImageFormat::Tiff),
            "jpg" => Ok(ImageFormat::Jpg),
            "jpeg" => Ok(ImageFormat::Jpeg),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Where a content blob lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LocationType {
    Gcs,
    Zarr,
    File,
    S3,
    Ssh,
}

impl From<BackendKind> for LocationType {
    fn from(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Local | BackendKind::Memory => LocationType::File,
            BackendKind::S3 => LocationType::S3,
            BackendKind::Ssh => LocationType::Ssh,
        }
    }
}

/// A scanned page together with its encoded image.
///
/// Only the metadata half ([`RawPageMetadataRecord`]) is ever stored in the
/// index; the image goes to content storage.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawPageRecord {
    pub id: String,
    pub page_id: Option<String>,
    pub page_hash: Option<String>,
    pub size: Option<u64>,
    pub image_format: Option<String>,
    pub image: Option<Vec<u8>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPageMetadataRecord {
    pub id: String,
    #[serde(default)]
    pub page_id: Option<String>,
    #[serde(default)]
    pub page_hash: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub image_format: Option<String>,
    #[serde(default)]
    pub location_type: Option<LocationType>,
    #[serde(default)]
    pub content_location: Option<String>,
}

impl Record for RawPageMetadataRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

impl ContentRecord for RawPageRecord {
    type Metadata = RawPageMetadataRecord;
    const CONTENT_FIELD: &'static str = "image";

    fn id(&self) -> &str {
        &self.id
    }

    fn format(&self) -> Option<&str> {
        self.image_format.as_deref()
    }

    fn content(&self) -> Option<&[u8]> {
        self.image.as_deref()
    }

    fn to_metadata(&self, format: &str, location: String, location_type: LocationType) -> RawPageMetadataRecord {
        RawPageMetadataRecord {
            id: self.id.clone(),
            page_id: self.page_id.clone(),
            page_hash: self.page_hash.clone(),
            size: self.size,
            image_format: Some(format.to_string()),
            location_type: Some(location_type),
            content_location: Some(location),
        }
    }

    fn content_location(metadata: &RawPageMetadataRecord) -> Option<&str> {
        metadata.content_location.as_deref()
    }

    fn from_metadata(metadata: RawPageMetadataRecord, content: Option<Vec<u8>>) -> Self {
        Self {
            id: metadata.id,
            page_id: metadata.page_id,
            page_hash: metadata.page_hash,
            size: metadata.size,
            image_format: metadata.image_format,
            image: content,
        }
    }
}

/// Model outputs computed for a page.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedPageRecord {
    pub id: String,
    #[serde(default)]
    pub page_id: Option<String>,
    #[serde(default)]
    pub page_hash: Option<String>,
    /// Stored as the hex string of the little-endian `f32` bytes.
    #[serde(default, alias = "yolo_v10_dla_e", with = "f32_hex")]
    pub layout_embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub fp_prob: Option<f64>,
    #[serde(default, alias = "gv_ocr")]
    pub ocr: Option<Value>,
    #[serde(default, alias = "reducto")]
    pub layout: Option<Value>,
}

impl Record for EnrichedPageRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    #[serde(default)]
    pub n_pages: Option<u32>,
    #[serde(default)]
    pub pages: Option<Vec<String>>,
}

impl Record for DocumentRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub id: String,
    #[serde(default)]
    pub n_pages: Option<u32>,
    #[serde(default)]
    pub pages: Option<Vec<String>>,
}

impl Record for PackageRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

mod f32_hex {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<f32>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(values) => {
                let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
                serializer.serialize_str(&hex::encode(bytes))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<f32>>, D::Error> {
        let Some(encoded) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let bytes = hex::decode(&encoded).map_err(D::Error::custom)?;
        if bytes.len() % 4 != 0 {
            return Err(D::Error::custom(format!("{} bytes is not a whole number of f32 values", bytes.len())));
        }
        Ok(Some(
            bytes
                .chunks_exact(4)
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("png", ImageFormat::Png)]
    #[case("PNG", ImageFormat::Png)]
    #[case("Tif", ImageFormat::Tif)]
    #[case("tiff", ImageFormat::Tiff)]
    #[case("JPG", ImageFormat::Jpg)]
    #[case("jpeg", ImageFormat::Jpeg)]
    fn test_image_format(#[case] input: &str, #[case] expected: ImageFormat) {
        assert_eq!(input.parse::<ImageFormat>().unwrap(), expected);
    }

    #[rstest]
    #[case("gif")]
    #[case("webp")]
    #[case("")]
    fn test_unsupported_format(#[case] input: &str) {
        let err = input.parse::<ImageFormat>().unwrap_err();
        assert_eq!(*err, ErrorKind::UnsupportedFormat(input.to_string()));
    }

    #[test]
    fn test_location_type_is_upper_case() {
        assert_eq!(serde_json::to_value(LocationType::Gcs).unwrap(), json!("GCS"));
        assert_eq!(serde_json::from_value::<LocationType>(json!("SSH")).unwrap(), LocationType::Ssh);
        assert_eq!(LocationType::from(BackendKind::Local), LocationType::File);
    }

    #[test]
    fn test_layout_embedding_is_hex() {
        let record = EnrichedPageRecord {
            id: "p1".to_string(),
            layout_embedding: Some(vec![1.0, -2.5]),
            fp_prob: Some(0.5),
            ..Default::default()
        };
        let document = record.to_document().unwrap();
        // 1.0f32 = 0x3f800000, -2.5f32 = 0xc0200000, little-endian.
        assert_eq!(document.get("layout_embedding"), Some(&json!("0000803f000020c0")));
        assert!(document.get("ocr").is_none());
        assert_eq!(EnrichedPageRecord::from_document(document).unwrap(), record);
    }

    #[test]
    fn test_enriched_page_reads_model_field_names() {
        let document = rvs_metadata::Document::new("p1")
            .with_field("yolo_v10_dla_e", "0000803f")
            .with_field("gv_ocr", json!({ "text": "Invoice" }))
            .with_field("reducto", json!({ "blocks": [] }));
        let record = EnrichedPageRecord::from_document(document).unwrap();
        assert_eq!(record.layout_embedding, Some(vec![1.0]));
        assert_eq!(record.ocr, Some(json!({ "text": "Invoice" })));
        assert_eq!(record.layout, Some(json!({ "blocks": [] })));
    }

    #[test]
    fn test_layout_embedding_rejects_partial_floats() {
        let document = rvs_metadata::Document::new("p1").with_field("layout_embedding", "00ff00");
        assert!(EnrichedPageRecord::from_document(document).is_err());
    }

    #[test]
    fn test_raw_page_metadata() {
        let page = RawPageRecord {
            id: "p1".to_string(),
            page_hash: Some("abc".to_string()),
            image_format: Some("PNG".to_string()),
            image: Some(vec![1, 2, 3]),
            ..Default::default()
        };
        let metadata = page.to_metadata("PNG", "raw_page/p1.PNG".to_string(), LocationType::File);
        assert_eq!(metadata.image_format.as_deref(), Some("PNG"));
        assert_eq!(RawPageRecord::content_location(&metadata), Some("raw_page/p1.PNG"));

        let document = metadata.to_document().unwrap();
        assert_eq!(document.get("location_type"), Some(&json!("FILE")));
        let restored = RawPageRecord::from_metadata(RawPageMetadataRecord::from_document(document).unwrap(), None);
        assert_eq!(restored.page_hash.as_deref(), Some("abc"));
        assert!(restored.image.is_none());
    }
}
