use actix_multipart::Multipart;
use chrono::Utc;
use futures::StreamExt;
use serde::Deserialize;

use crate::errors::ApiError;

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

const MAX_TEXT_FIELD_BYTES: usize = 64 * 1024;

const ALLOWED_MIME_TYPES: [&str; 5] = [
    "image/jpg",
    "image/jpeg",
    "image/pjpeg",
    "image/png",
    "image/gif",
];

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("transport failure talking to the image store: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("image store rejected the request with status {0}")]
    Rejected(reqwest::StatusCode),
}

#[derive(Debug)]
pub struct StoredImage {
    pub public_id: String,
    pub secure_url: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
}

/// Client for the external object storage holding product banners. Assets
/// live under a single folder; keys are `{unix-millis}-{basename}` so
/// re-uploads of the same file never collide.
#[derive(Clone)]
pub struct ImageStore {
    http: reqwest::Client,
    base_url: String,
    folder: String,
}

impl ImageStore {
    pub fn new(base_url: String, folder: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            folder,
        }
    }

    pub async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<StoredImage, UploadError> {
        let key = object_key(filename);
        let public_id = format!("{}/{}", self.folder, key);

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(filename.to_owned()),
            )
            .text("folder", self.folder.clone())
            .text("public_id", key);

        let resp = self
            .http
            .post(format!("{}/image/upload", self.base_url))
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(UploadError::Rejected(resp.status()));
        }

        let body: UploadResponse = resp.json().await?;
        Ok(StoredImage {
            public_id,
            secure_url: body.secure_url,
        })
    }

    /// Compensation path: called when the product insert fails after the
    /// asset already landed remotely.
    pub async fn delete(&self, public_id: &str) -> Result<(), UploadError> {
        let resp = self
            .http
            .post(format!("{}/image/destroy", self.base_url))
            .json(&serde_json::json!({ "public_id": public_id }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(UploadError::Rejected(resp.status()));
        }

        Ok(())
    }
}

fn object_key(filename: &str) -> String {
    let stem = filename.split('.').next().unwrap_or(filename);
    format!("{}-{}", Utc::now().timestamp_millis(), stem)
}

fn mime_allowed(essence: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&essence)
}

#[derive(Debug)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub filename: String,
}

/// The multipart form of `POST /product`.
#[derive(Debug)]
pub struct ProductForm {
    pub name: String,
    pub price: i32,
    pub description: String,
    pub category_id: i64,
    pub image: ImageUpload,
}

fn push_chunk(
    buf: &mut Vec<u8>,
    chunk: &[u8],
    limit: usize,
    over_limit: &str,
) -> Result<(), ApiError> {
    if buf.len() + chunk.len() > limit {
        return Err(ApiError::Validation(over_limit.into()));
    }
    buf.extend_from_slice(chunk);
    Ok(())
}

async fn read_text_field(field: &mut actix_multipart::Field) -> Result<String, ApiError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk =
            chunk.map_err(|err| ApiError::Validation(format!("malformed multipart payload: {err}")))?;
        push_chunk(
            &mut buf,
            &chunk,
            MAX_TEXT_FIELD_BYTES,
            "form field exceeds the 64 KB limit",
        )?;
    }

    String::from_utf8(buf)
        .map_err(|_| ApiError::Validation("form fields must be valid utf-8".into()))
}

/// Consumes a field without keeping or inspecting its bytes.
async fn drain_field(field: &mut actix_multipart::Field) -> Result<(), ApiError> {
    while let Some(chunk) = field.next().await {
        chunk.map_err(|err| ApiError::Validation(format!("malformed multipart payload: {err}")))?;
    }

    Ok(())
}

async fn read_image_field(field: &mut actix_multipart::Field) -> Result<ImageUpload, ApiError> {
    let filename = field
        .content_disposition()
        .get_filename()
        .map(|name| name.to_owned())
        .ok_or_else(|| ApiError::Validation("image filename is missing".into()))?;

    let mime = field
        .content_type()
        .map(|m| m.essence_str().to_owned())
        .unwrap_or_default();
    if !mime_allowed(&mime) {
        return Err(ApiError::Validation(
            "invalid file type, use jpg, png or gif".into(),
        ));
    }

    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk =
            chunk.map_err(|err| ApiError::Validation(format!("failed to read image: {err}")))?;
        push_chunk(
            &mut bytes,
            &chunk,
            MAX_IMAGE_BYTES,
            "image exceeds the 5 MB limit",
        )?;
    }

    if bytes.is_empty() {
        return Err(ApiError::Validation("image file is empty".into()));
    }

    Ok(ImageUpload { bytes, filename })
}

pub async fn read_product_form(mut payload: Multipart) -> Result<ProductForm, ApiError> {
    let mut name = None;
    let mut price = None;
    let mut description = None;
    let mut category_id = None;
    let mut image = None;

    while let Some(entry) = payload.next().await {
        let mut field = entry
            .map_err(|err| ApiError::Validation(format!("malformed multipart payload: {err}")))?;
        let field_name = field
            .content_disposition()
            .get_name()
            .unwrap_or_default()
            .to_owned();

        match field_name.as_str() {
            "name" => name = Some(read_text_field(&mut field).await?),
            "price" => price = Some(read_text_field(&mut field).await?),
            "description" => description = Some(read_text_field(&mut field).await?),
            "category_id" => category_id = Some(read_text_field(&mut field).await?),
            "file" => image = Some(read_image_field(&mut field).await?),
            // unknown fields are drained and ignored, whatever their content
            _ => drain_field(&mut field).await?,
        }
    }

    let name = name
        .filter(|val| !val.is_empty())
        .ok_or_else(|| ApiError::Validation("product name is required".into()))?;
    let description = description
        .filter(|val| !val.is_empty())
        .ok_or_else(|| ApiError::Validation("product description is required".into()))?;
    let price: i32 = price
        .ok_or_else(|| ApiError::Validation("product price is required".into()))?
        .parse()
        .map_err(|_| ApiError::Validation("price must be an integer amount of cents".into()))?;
    if price <= 0 {
        return Err(ApiError::Validation("price must be positive".into()));
    }
    let category_id: i64 = category_id
        .ok_or_else(|| ApiError::Validation("category_id is required".into()))?
        .parse()
        .map_err(|_| ApiError::Validation("category_id must be an integer id".into()))?;
    let image = image.ok_or_else(|| ApiError::Validation("image file is required".into()))?;

    Ok(ProductForm {
        name,
        price,
        description,
        category_id,
        image,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_is_timestamp_prefixed_and_drops_the_extension() {
        let key = object_key("classic-burger.jpeg");

        let (millis, stem) = key.split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(stem, "classic-burger");

        let key = object_key("banner.tar.gz");
        assert!(key.ends_with("-banner"));
    }

    #[test]
    fn only_the_image_whitelist_is_accepted() {
        for ok in ["image/jpg", "image/jpeg", "image/pjpeg", "image/png", "image/gif"] {
            assert!(mime_allowed(ok), "{ok} should be allowed");
        }
        assert!(!mime_allowed("image/webp"));
        assert!(!mime_allowed("application/pdf"));
        assert!(!mime_allowed(""));
    }

    #[test]
    fn oversized_fields_are_rejected_mid_stream() {
        let mut buf = vec![0u8; 10];
        assert!(push_chunk(&mut buf, &[0u8; 6], 16, "too big").is_ok());
        assert_eq!(buf.len(), 16);

        let err = push_chunk(&mut buf, &[0u8; 1], 16, "too big").unwrap_err();
        assert!(matches!(err, ApiError::Validation(msg) if msg == "too big"));
        // nothing past the limit is buffered
        assert_eq!(buf.len(), 16);
    }

    #[test]
    fn store_urls_are_folder_scoped() {
        let store = ImageStore::new("https://img.example.com/".into(), "products".into());

        assert_eq!(store.base_url, "https://img.example.com");
        assert_eq!(store.folder, "products");
    }
}
