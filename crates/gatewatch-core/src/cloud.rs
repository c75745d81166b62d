//! Cloud feed service client (Adafruit IO REST v2 dialect).
//!
//! Used for the shared `lock` authorization feed and for publishing face
//! snapshots to the `known` / `unknown` image feeds. Requests are blocking
//! (`ureq`) and run on tokio's blocking pool.

use crate::alert::{AlertError, Channel, Uploader};
use crate::feed::{AuthorizationFeed, FeedError, FeedRecord};
use crate::frame::encode_jpeg;
use crate::types::Authorization;
use base64::Engine as _;
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_CLOUD_URL: &str = "https://io.adafruit.com";
pub const LOCK_FEED_KEY: &str = "lock";

/// Uploaded snapshots are resized to this square edge length.
const UPLOAD_EDGE: u32 = 300;
const UPLOAD_JPEG_QUALITY: u8 = 80;

/// One data point as returned by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct DataPoint {
    pub id: String,
    pub value: Option<String>,
}

/// Blocking REST client. Cheap to clone (the agent is reference counted).
#[derive(Clone)]
pub struct CloudClient {
    agent: ureq::Agent,
    base_url: String,
    username: String,
    key: String,
}

impl CloudClient {
    /// `timeout` bounds every request end to end.
    pub fn new(base_url: &str, username: &str, key: &str, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            key: key.to_string(),
        }
    }

    fn data_url(&self, feed: &str) -> String {
        format!("{}/api/v2/{}/feeds/{}/data", self.base_url, self.username, feed)
    }

    /// Latest data point of `feed`, or `None` if it has none.
    pub fn latest(&self, feed: &str) -> Result<Option<DataPoint>, FeedError> {
        let url = format!("{}/last", self.data_url(feed));
        match self.agent.get(&url).set("X-AIO-Key", &self.key).call() {
            Ok(response) => response
                .into_json::<DataPoint>()
                .map(Some)
                .map_err(|e| FeedError::Malformed(e.to_string())),
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(e) => Err(FeedError::Http(e.to_string())),
        }
    }

    /// Append a data point to `feed`.
    pub fn publish(&self, feed: &str, value: &str) -> Result<DataPoint, FeedError> {
        let response = self
            .agent
            .post(&self.data_url(feed))
            .set("X-AIO-Key", &self.key)
            .send_json(serde_json::json!({ "value": value }))
            .map_err(|e| FeedError::Http(e.to_string()))?;
        response
            .into_json::<DataPoint>()
            .map_err(|e| FeedError::Malformed(e.to_string()))
    }
}

/// The authorization slot backed by a cloud feed. The data point id is the
/// revision.
#[derive(Clone)]
pub struct CloudFeed {
    client: CloudClient,
    feed_key: String,
}

impl CloudFeed {
    pub fn new(client: CloudClient, feed_key: impl Into<String>) -> Self {
        Self {
            client,
            feed_key: feed_key.into(),
        }
    }

    pub fn feed_key(&self) -> &str {
        &self.feed_key
    }
}

fn to_record(point: DataPoint) -> FeedRecord {
    FeedRecord {
        value: Authorization::from_wire(point.value.as_deref().unwrap_or("")),
        revision: Some(point.id),
    }
}

impl AuthorizationFeed for CloudFeed {
    async fn read(&self) -> Result<Option<FeedRecord>, FeedError> {
        let client = self.client.clone();
        let key = self.feed_key.clone();
        let point = tokio::task::spawn_blocking(move || client.latest(&key))
            .await
            .map_err(|e| FeedError::Join(e.to_string()))??;
        Ok(point.map(to_record))
    }

    async fn write(&self, value: Authorization) -> Result<FeedRecord, FeedError> {
        let client = self.client.clone();
        let key = self.feed_key.clone();
        let point = tokio::task::spawn_blocking(move || client.publish(&key, value.as_wire()))
            .await
            .map_err(|e| FeedError::Join(e.to_string()))??;
        Ok(to_record(point))
    }
}

/// Publishes face snapshots to the `known` / `unknown` image feeds as
/// base64 JPEG. Without a client, uploads are skipped.
#[derive(Clone, Default)]
pub struct CloudUploader {
    client: Option<CloudClient>,
}

impl CloudUploader {
    pub fn new(client: Option<CloudClient>) -> Self {
        Self { client }
    }
}

/// Resize to the upload size and encode as base64 JPEG.
pub fn snapshot_payload(image: &RgbImage) -> Result<String, image::ImageError> {
    let resized = imageops::resize(image, UPLOAD_EDGE, UPLOAD_EDGE, FilterType::Triangle);
    let jpeg = encode_jpeg(&resized, UPLOAD_JPEG_QUALITY)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(jpeg))
}

impl Uploader for CloudUploader {
    async fn upload(&self, channel: Channel, image: &RgbImage) -> Result<(), AlertError> {
        let Some(client) = self.client.clone() else {
            tracing::debug!(channel = channel.feed_key(), "cloud upload not configured; skipped");
            return Ok(());
        };
        let payload = snapshot_payload(image)?;
        let key = channel.feed_key();
        tokio::task::spawn_blocking(move || client.publish(key, &payload))
            .await
            .map_err(|e| AlertError::Join(e.to_string()))??;
        tracing::info!(channel = key, "snapshot uploaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_url() {
        let client = CloudClient::new("https://io.example.com/", "door", "k", Duration::from_secs(1));
        assert_eq!(
            client.data_url("lock"),
            "https://io.example.com/api/v2/door/feeds/lock/data"
        );
    }

    #[test]
    fn test_data_point_to_record() {
        let point: DataPoint = serde_json::from_str(r#"{"id":"0F3A","value":"1","feed_id":7}"#).unwrap();
        let record = to_record(point);
        assert_eq!(record.value, Authorization::Grant);
        assert_eq!(record.revision.as_deref(), Some("0F3A"));

        let empty: DataPoint = serde_json::from_str(r#"{"id":"0F3B","value":null}"#).unwrap();
        assert_eq!(to_record(empty).value, Authorization::Deny);
    }

    #[test]
    fn test_snapshot_payload_is_300px_jpeg() {
        let frame = RgbImage::from_pixel(640, 480, image::Rgb([10, 200, 30]));
        let payload = snapshot_payload(&frame).unwrap();
        let jpeg = base64::engine::general_purpose::STANDARD.decode(payload).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (300, 300));
    }

    #[tokio::test]
    async fn test_unconfigured_uploader_is_noop() {
        let uploader = CloudUploader::default();
        uploader.upload(Channel::Unknown, &RgbImage::new(4, 4)).await.unwrap();
    }
}
