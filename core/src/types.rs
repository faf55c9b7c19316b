//! DTOs for the library API.
//!
//! # Design
//! Records come back with the upper-case column names the server selects
//! (`ID_LIBRO`, `TITULO`, ...). Only identifiers and names are required;
//! every other column is optional and unknown columns are kept in `extra`, so
//! the client never rejects a response the server considers valid.
//!
//! Request payloads use the lower-case field names the server reads.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ApiError;

/// Roles the server assigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Lector,
    Bibliotecario,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Lector => "LECTOR",
            Role::Bibliotecario => "BIBLIOTECARIO",
        }
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub nombre: String,
    pub email: String,
    pub password: String,
    pub rol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginUser {
    pub id: i64,
    pub nombre: String,
    pub email: String,
    pub rol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub success: bool,
    pub token: String,
    pub user: LoginUser,
    #[serde(default)]
    pub message: String,
}

/// The `{ success, message }` acknowledgement returned by write endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

// ---------------------------------------------------------------------------
// Books
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Book {
    pub id_libro: i64,
    pub titulo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anio_publicacion: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genero: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numero_copias: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copias_disponibles: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editorial: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fecha_registro: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload for creating or replacing a book.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookInput {
    pub titulo: String,
    pub autor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anio_publicacion: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genero: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numero_copias: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub editorial: Option<String>,
}

/// Filters for the book search endpoint. Empty filters are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookSearch {
    pub titulo: Option<String>,
    pub autor: Option<String>,
    pub genero: Option<String>,
    pub limit: Option<u32>,
}

impl BookSearch {
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let text_filters = [("titulo", &self.titulo), ("autor", &self.autor), ("genero", &self.genero)];
        for (name, value) in text_filters {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                pairs.push((name.to_string(), value.to_string()));
            }
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }
}

/// One page of books, as the server sent it.
///
/// `libros` rows are kept as raw JSON so null columns and unknown fields
/// survive a round trip; [`BookPage::books`] gives the typed view. Every
/// other envelope field (`total`, `page`, `per_page`, `total_pages`, ...)
/// lives in `meta` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookPage {
    pub libros: Vec<Value>,
    #[serde(flatten)]
    pub meta: Map<String, Value>,
}

impl BookPage {
    /// Accept either the pagination envelope or a bare array of books.
    ///
    /// An object carrying `libros` is kept as-is, missing `total` included.
    /// A bare array is wrapped with `total` set to its length.
    pub fn from_response(data: Value) -> Result<Self, ApiError> {
        let data = match data {
            Value::Array(libros) => {
                let total = libros.len();
                json!({ "libros": libros, "total": total })
            }
            other => other,
        };
        serde_json::from_value(data).map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    /// The envelope's `total`, or the number of rows when it has none.
    pub fn total(&self) -> u64 {
        self.meta_u64("total").unwrap_or(self.libros.len() as u64)
    }

    pub fn page(&self) -> Option<u64> {
        self.meta_u64("page")
    }

    pub fn per_page(&self) -> Option<u64> {
        self.meta_u64("per_page")
    }

    pub fn total_pages(&self) -> Option<u64> {
        self.meta_u64("total_pages")
    }

    /// The rows deserialized as [`Book`] records.
    pub fn books(&self) -> Result<Vec<Book>, ApiError> {
        self.libros
            .iter()
            .map(|row| Book::deserialize(row).map_err(|e| ApiError::Deserialization(e.to_string())))
            .collect()
    }

    fn meta_u64(&self, key: &str) -> Option<u64> {
        self.meta.get(key).and_then(Value::as_u64)
    }
}

// ---------------------------------------------------------------------------
// Loans
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoanStatus {
    Activo,
    Vencido,
    Devuelto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Loan {
    pub id_prestamo: i64,
    pub id_libro: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_usuario: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fecha_prestamo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fecha_devolucion_esperada: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fecha_devolucion_real: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estado: Option<LoanStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub titulo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nombre_usuario: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLoan {
    pub id_libro: i64,
    pub id_usuario: i64,
    /// Loan length in days; the server defaults to 14.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dias_prestamo: Option<i64>,
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct User {
    pub id_usuario: i64,
    pub nombre: String,
    pub email: String,
    #[serde(default)]
    pub rol: String,
    /// `S` or `N`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fecha_registro: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.activo.as_deref() == Some("S")
    }
}

/// Payload for the librarian-only user creation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub nombre: String,
    pub email: String,
    pub password: String,
    pub rol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserUpdate {
    pub nombre: String,
    pub email: String,
    pub rol: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_reads_uppercase_columns_and_keeps_unknown_ones() {
        let book: Book = serde_json::from_value(json!({
            "ID_LIBRO": 7,
            "TITULO": "Rayuela",
            "AUTOR": "Julio Cortazar",
            "COPIAS_DISPONIBLES": 1,
            "UBICACION": "Estante 3"
        }))
        .unwrap();
        assert_eq!(book.id_libro, 7);
        assert_eq!(book.autor.as_deref(), Some("Julio Cortazar"));
        assert_eq!(book.copias_disponibles, Some(1));
        assert!(book.isbn.is_none());
        assert_eq!(book.extra["UBICACION"], "Estante 3");
    }

    #[test]
    fn book_input_omits_unset_fields() {
        let input = BookInput {
            titulo: "Ficciones".to_string(),
            autor: "Jorge Luis Borges".to_string(),
            numero_copias: Some(5),
            ..BookInput::default()
        };
        let body = serde_json::to_value(&input).unwrap();
        assert_eq!(body, json!({"titulo": "Ficciones", "autor": "Jorge Luis Borges", "numero_copias": 5}));
    }

    #[test]
    fn book_search_skips_empty_filters() {
        let search = BookSearch {
            titulo: Some(String::new()),
            autor: Some("Borges".to_string()),
            genero: None,
            limit: Some(20),
        };
        assert_eq!(
            search.query_pairs(),
            vec![
                ("autor".to_string(), "Borges".to_string()),
                ("limit".to_string(), "20".to_string()),
            ]
        );
    }

    #[test]
    fn bare_array_is_wrapped_with_its_length() {
        let page = BookPage::from_response(json!([
            {"ID_LIBRO": 1, "TITULO": "1984"},
            {"ID_LIBRO": 2, "TITULO": "El Aleph"}
        ]))
        .unwrap();
        assert_eq!(page.total(), 2);
        assert_eq!(page.libros.len(), 2);
        assert!(page.page().is_none());
        assert_eq!(page.books().unwrap()[1].titulo, "El Aleph");
    }

    #[test]
    fn envelope_is_kept_as_is() {
        let envelope = json!({
            "libros": [{"ID_LIBRO": 1, "TITULO": "1984"}],
            "page": 2,
            "per_page": 1,
            "total": 10,
            "total_pages": 10
        });
        let page = BookPage::from_response(envelope.clone()).unwrap();
        assert_eq!(page.total(), 10);
        assert_eq!(page.page(), Some(2));
        assert_eq!(serde_json::to_value(&page).unwrap(), envelope);
    }

    #[test]
    fn envelope_keeps_null_columns() {
        let envelope = json!({
            "libros": [{"ID_LIBRO": 1, "TITULO": "1984", "ISBN": null, "EDITORIAL": null}],
            "page": 1,
            "per_page": 100,
            "total": 1,
            "total_pages": 1
        });
        let page = BookPage::from_response(envelope.clone()).unwrap();
        assert_eq!(serde_json::to_value(&page).unwrap(), envelope);

        let books = page.books().unwrap();
        assert!(books[0].isbn.is_none());
        assert!(books[0].editorial.is_none());
    }

    #[test]
    fn envelope_without_total_is_accepted() {
        let envelope = json!({"libros": [{"ID_LIBRO": 1, "TITULO": "1984"}]});
        let page = BookPage::from_response(envelope.clone()).unwrap();
        assert_eq!(page.total(), 1);
        assert!(page.meta.get("total").is_none());
        assert_eq!(serde_json::to_value(&page).unwrap(), envelope);
    }

    #[test]
    fn object_without_libros_is_rejected() {
        let err = BookPage::from_response(json!({"total": 3})).unwrap_err();
        assert!(matches!(err, ApiError::Deserialization(_)));
    }

    #[test]
    fn loan_status_is_uppercase() {
        let loan: Loan = serde_json::from_value(json!({
            "ID_PRESTAMO": 3,
            "ID_LIBRO": 1,
            "ESTADO": "VENCIDO"
        }))
        .unwrap();
        assert_eq!(loan.estado, Some(LoanStatus::Vencido));
        assert!(loan.id_usuario.is_none());
    }

    #[test]
    fn role_names_match_the_server() {
        assert_eq!(serde_json::to_value(Role::Bibliotecario).unwrap(), "BIBLIOTECARIO");
        assert_eq!(Role::Lector.as_ref(), "LECTOR");
    }

    #[test]
    fn user_active_flag() {
        let user: User = serde_json::from_value(json!({
            "ID_USUARIO": 2,
            "NOMBRE": "Juan Perez",
            "EMAIL": "juan@email.com",
            "ROL": "LECTOR",
            "ACTIVO": "N"
        }))
        .unwrap();
        assert!(!user.is_active());
    }
}
