//! Test doubles shared by the pipeline tests.

use std::sync::Mutex;

use serde_json::{Value, json};

use crate::api::types::sanitize_file_name;
use crate::api::{ApiError, CatalogApi, CoursePage, DownloadedPackage, Paging};

/// Serves canned pages and fake package downloads.
pub struct MockCatalog {
    pages: Vec<CoursePage>,
    fail_downloads: bool,
    list_calls: Mutex<Vec<(u32, u32)>>,
    downloads: Mutex<Vec<String>>,
}

impl MockCatalog {
    pub fn new(pages: Vec<CoursePage>) -> Self {
        Self {
            pages,
            fail_downloads: false,
            list_calls: Mutex::new(Vec::new()),
            downloads: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_downloads(mut self) -> Self {
        self.fail_downloads = true;
        self
    }

    pub fn list_calls(&self) -> Vec<(u32, u32)> {
        self.list_calls.lock().unwrap().clone()
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

impl CatalogApi for MockCatalog {
    async fn list_courses(&self, page_size: u32, page: u32) -> Result<CoursePage, ApiError> {
        self.list_calls.lock().unwrap().push((page_size, page));
        self.pages
            .get(page.saturating_sub(1) as usize)
            .cloned()
            .ok_or(ApiError::Client {
                status: 404,
                body: format!("no page {page}"),
            })
    }

    async fn download_package(
        &self,
        url: &str,
        file_name: &str,
    ) -> Result<DownloadedPackage, ApiError> {
        self.downloads.lock().unwrap().push(url.to_string());
        if self.fail_downloads {
            return Err(ApiError::Download {
                url: url.to_string(),
                reason: "HTTP 500 Internal Server Error".into(),
            });
        }
        let file_name = sanitize_file_name(file_name).ok_or_else(|| ApiError::Download {
            url: url.to_string(),
            reason: format!("unusable file name {file_name:?}"),
        })?;
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(file_name);
        std::fs::write(&path, b"PK\x03\x04package")?;
        Ok(DownloadedPackage::new(dir, path))
    }
}

/// A listing record with the given category paths.
pub fn remote_course(id: &str, categories: &[&str], active: bool) -> Value {
    json!({
        "id": id,
        "title": format!("Course {id}"),
        "descriptionText": format!("About {id}"),
        "descriptionHtml": format!("<p>About {id}</p>"),
        "thumbnailUrl": format!("https://cdn.example.com/{id}.jpg"),
        "duration": "00:45:00",
        "languages": ["English"],
        "categories": categories,
        "publisherName": "Acme Learning",
        "packageDownloadUrl": format!("https://api.example.com/v1/content/{id}/package"),
        "aiccLaunchUrl": format!("https://aicc.example.com/{id}"),
        "active": active
    })
}

pub fn page(data: Vec<Value>, next: Option<&str>) -> CoursePage {
    CoursePage {
        data,
        paging: Paging {
            next: next.map(str::to_string),
        },
    }
}
