use crate::db::models::Sender;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// Defaults to "New Chat" when absent.
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameSessionRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct FavoriteSessionRequest {
    pub favorite: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub sender: Sender,
    pub message: String,
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: usize,
    #[serde(default = "default_size")]
    pub size: usize,
}

fn default_size() -> usize {
    20
}

/// Paged response envelope.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total_elements: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, page: usize, size: usize, total_elements: i64) -> Self {
        let total_pages = if size == 0 {
            0
        } else {
            (total_elements + size as i64 - 1) / size as i64
        };
        Page {
            content,
            page,
            size,
            total_elements,
            total_pages,
        }
    }
}
