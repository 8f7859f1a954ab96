//! HTTP model-server classifier
//!
//! Posts the compressed JPEG as multipart `image` and reads
//! `{"label": .., "confidence": ..}`. Health is `GET healthz` next to the
//! predict endpoint.

use super::{Classifier, Prediction};
use crate::error::{Error, Result};
use crate::image_processor::CompressedFrame;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use std::time::Duration;
use tokio::runtime::Handle;

pub struct HttpClassifier {
    client: Client,
    predict_url: Url,
    health_url: Url,
    /// Runtime that drives requests issued from blocking threads
    runtime: Handle,
}

impl HttpClassifier {
    /// Must be called from within the tokio runtime
    pub fn new(predict_url: &str, timeout: Duration) -> Result<Self> {
        let predict_url = Url::parse(predict_url)
            .map_err(|e| Error::Config(format!("Invalid classifier_url {}: {}", predict_url, e)))?;
        let health_url = predict_url
            .join("healthz")
            .map_err(|e| Error::Config(format!("Invalid classifier_url: {}", e)))?;

        let client = Client::builder().timeout(timeout).build()?;
        let runtime = Handle::try_current()
            .map_err(|e| Error::Internal(format!("No tokio runtime for classifier: {}", e)))?;

        Ok(Self {
            client,
            predict_url,
            health_url,
            runtime,
        })
    }

    async fn predict(&self, jpeg: Vec<u8>) -> Result<Prediction> {
        let form = Form::new().part(
            "image",
            Part::bytes(jpeg)
                .file_name("frame.jpg")
                .mime_str("image/jpeg")?,
        );

        let resp = self
            .client
            .post(self.predict_url.clone())
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Error::Classifier(format!(
                "Prediction failed: {}",
                resp.status()
            )));
        }

        let prediction: Prediction = resp.json().await?;
        Ok(prediction)
    }
}

impl Classifier for HttpClassifier {
    fn health_check(&self) -> Result<()> {
        let url = self.health_url.clone();
        let resp = self
            .runtime
            .block_on(self.client.get(url).send())
            .map_err(|e| Error::Classifier(format!("Model server unreachable: {}", e)))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Error::Classifier(format!(
                "Model server not ready: {}",
                resp.status()
            )))
        }
    }

    fn classify(&self, frame: &CompressedFrame) -> Result<Prediction> {
        self.runtime.block_on(self.predict(frame.jpeg.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 65536];
            // headers and the small multipart body arrive in the first reads
            let _ = tokio::time::timeout(Duration::from_millis(200), async {
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
            })
            .await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{}/predict", addr)
    }

    fn frame() -> CompressedFrame {
        CompressedFrame {
            jpeg: vec![0xff, 0xd8, 0xff, 0xd9],
            resized: RgbImage::new(4, 4),
        }
    }

    #[test]
    fn test_health_url_sits_next_to_predict() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        let classifier =
            HttpClassifier::new("http://model:9000/v1/predict", Duration::from_secs(1)).unwrap();
        assert_eq!(classifier.health_url.as_str(), "http://model:9000/v1/healthz");
    }

    #[test]
    fn test_invalid_url_rejected() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        assert!(matches!(
            HttpClassifier::new("not a url", Duration::from_secs(1)),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_classify_parses_prediction() {
        let url = serve_once("200 OK", r#"{"label":"accident","confidence":0.91}"#).await;
        let classifier = Arc::new(HttpClassifier::new(&url, Duration::from_secs(5)).unwrap());

        let prediction = tokio::task::spawn_blocking(move || classifier.classify(&frame()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prediction, Prediction::new("accident", 0.91));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_classify_server_error() {
        let url = serve_once("500 Internal Server Error", "{}").await;
        let classifier = Arc::new(HttpClassifier::new(&url, Duration::from_secs(5)).unwrap());

        let result = tokio::task::spawn_blocking(move || classifier.classify(&frame()))
            .await
            .unwrap();
        assert!(matches!(result, Err(Error::Classifier(_))));
    }
}
