#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use securestore_server::config::Config;
use tokio::net::TcpListener;

pub struct TestServer {
    pub url: String,
    pub addr: SocketAddr,
    pub client: Client,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::with_config(Config::default()).await
    }

    pub async fn with_config(mut config: Config) -> Self {
        config.port = 0; // OS assigns port

        let state = securestore_server::state::AppState::new(&config).await.unwrap();
        let app = securestore_server::routes::router(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give server a moment to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        Self {
            url: format!("http://{addr}"),
            addr,
            client: Client::new(),
        }
    }

    pub fn at(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }

    /// Create a bucket and upload one object into it
    pub async fn seed(&self, bucket: &str, object: &str, filename: &str, data: &'static [u8]) {
        let response = self
            .client
            .post(self.at(&format!("/buckets/{bucket}")))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = self
            .client
            .put(self.at(&format!("/buckets/{bucket}/objects/{object}")))
            .header("filename", filename)
            .body(data)
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    pub async fn add_key(&self, key: serde_json::Value) -> StatusCode {
        self.client
            .post(self.at("/api/keys"))
            .json(&key)
            .send()
            .await
            .expect("Failed to send request")
            .status()
    }

    pub async fn download(&self, url_key: &str) -> reqwest::Response {
        self.client
            .get(self.at("/api/download"))
            .query(&[("urlKey", url_key)])
            .send()
            .await
            .expect("Failed to send request")
    }

    /// Poll until downloads of `url_key` fail with `status`
    pub async fn wait_for_download_status(&self, url_key: &str, status: StatusCode) {
        for _ in 0..100 {
            if self.download(url_key).await.status() == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("download of {url_key} never returned {status}");
    }
}
