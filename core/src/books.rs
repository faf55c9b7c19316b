//! `/libros` endpoints.

use serde_json::json;

use crate::client::{ApiClient, RequestOptions};
use crate::error::ApiError;
use crate::http::HttpMethod;
use crate::types::{Book, BookInput, BookPage, BookSearch, MessageResponse};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy)]
pub struct BooksApi<'a> {
    client: &'a ApiClient,
}

impl<'a> BooksApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// `GET /libros/?page=&per_page=`. Accepts the paginated envelope or a
    /// bare array from the server; see [`BookPage::from_response`].
    pub fn list(&self, page: u32, per_page: u32) -> Result<BookPage, ApiError> {
        let options = RequestOptions::new().query("page", page).query("per_page", per_page);
        let data = self.client.execute(HttpMethod::Get, "/libros/", options)?;
        BookPage::from_response(data)
    }

    pub fn get(&self, id: i64) -> Result<Book, ApiError> {
        self.client
            .execute_as(HttpMethod::Get, &format!("/libros/{id}"), RequestOptions::new())
    }

    pub fn genres(&self) -> Result<Vec<String>, ApiError> {
        self.client
            .execute_as(HttpMethod::Get, "/libros/generos", RequestOptions::new())
    }

    pub fn search(&self, filter: &BookSearch) -> Result<Vec<Book>, ApiError> {
        let options = RequestOptions::new().query_pairs(filter.query_pairs());
        self.client.execute_as(HttpMethod::Get, "/libros/search", options)
    }

    pub fn create(&self, book: &BookInput) -> Result<MessageResponse, ApiError> {
        self.client
            .execute_as(HttpMethod::Post, "/libros/", RequestOptions::json(book)?)
    }

    pub fn update(&self, id: i64, book: &BookInput) -> Result<MessageResponse, ApiError> {
        self.client
            .execute_as(HttpMethod::Put, &format!("/libros/{id}"), RequestOptions::json(book)?)
    }

    pub fn delete(&self, id: i64) -> Result<MessageResponse, ApiError> {
        self.client
            .execute_as(HttpMethod::Delete, &format!("/libros/{id}"), RequestOptions::new())
    }

    /// Books with fewer than two copies available.
    pub fn low_stock(&self) -> Result<Vec<Book>, ApiError> {
        self.client
            .execute_as(HttpMethod::Get, "/libros/bajo-stock", RequestOptions::new())
    }

    /// `PATCH /libros/{id}/copias`: overwrite the available-copies counter.
    pub fn update_copies(&self, id: i64, copias_disponibles: i64) -> Result<MessageResponse, ApiError> {
        let options = RequestOptions::json(&json!({ "copias_disponibles": copias_disponibles }))?;
        self.client
            .execute_as(HttpMethod::Patch, &format!("/libros/{id}/copias"), options)
    }
}
