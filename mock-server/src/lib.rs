//! In-memory stand-in for the library REST API.
//!
//! Routes live under `/api` with the same paths, status codes and
//! `{"error": ...}` bodies as the production service. Tokens are opaque
//! UUIDs; passwords are stored in plain text because nothing here persists.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Json, Router,
};
use chrono::{Days, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{info, warn};
use uuid::Uuid;

pub const LIBRARIAN: &str = "BIBLIOTECARIO";
pub const READER: &str = "LECTOR";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct BookRow {
    pub id_libro: i64,
    pub titulo: String,
    pub autor: String,
    pub isbn: Option<String>,
    pub anio_publicacion: Option<i32>,
    pub genero: Option<String>,
    pub numero_copias: i64,
    pub copias_disponibles: i64,
    pub editorial: Option<String>,
    pub fecha_registro: NaiveDate,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct UserRow {
    pub id_usuario: i64,
    pub nombre: String,
    pub email: String,
    pub rol: String,
    pub activo: String,
    pub fecha_registro: NaiveDate,
    #[serde(skip)]
    pub password: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct LoanRow {
    pub id_prestamo: i64,
    pub id_libro: i64,
    pub id_usuario: i64,
    pub fecha_prestamo: NaiveDate,
    pub fecha_devolucion_esperada: NaiveDate,
    pub fecha_devolucion_real: Option<NaiveDate>,
    pub estado: String,
}

/// Server behaviour switches.
#[derive(Clone, Copy, Debug)]
pub struct MockOptions {
    /// Serve `/api/libros/` as a pagination envelope (`true`) or a bare array.
    pub paginated_books: bool,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self { paginated_books: true }
    }
}

#[derive(Debug, Default)]
pub struct Library {
    pub books: BTreeMap<i64, BookRow>,
    pub users: BTreeMap<i64, UserRow>,
    pub loans: BTreeMap<i64, LoanRow>,
    tokens: HashMap<String, i64>,
    next_book: i64,
    next_user: i64,
    next_loan: i64,
}

impl Library {
    /// Three users (one librarian) and a handful of books.
    pub fn seeded() -> Self {
        let mut library = Self::default();
        for (nombre, email, password, rol) in [
            ("Admin Biblioteca", "admin@biblioteca.com", "admin123", LIBRARIAN),
            ("Juan Perez", "juan@email.com", "lector123", READER),
            ("Maria Garcia", "maria@email.com", "lector123", READER),
        ] {
            library.insert_user(nombre, email, password, rol);
        }
        for (titulo, autor, isbn, anio, genero, copias, editorial) in [
            ("Cien Anios de Soledad", "Gabriel Garcia Marquez", "978-0307474728", 1967, "Realismo Magico", 5, "Editorial Sudamericana"),
            ("1984", "George Orwell", "978-0451524935", 1949, "Distopia", 3, "Secker and Warburg"),
            ("El Principito", "Antoine de Saint-Exupery", "978-0156012195", 1943, "Fabula", 7, "Reynal and Hitchcock"),
            ("Rayuela", "Julio Cortazar", "978-8437604572", 1963, "Novela Experimental", 1, "Editorial Sudamericana"),
            ("Ficciones", "Jorge Luis Borges", "978-0802130303", 1944, "Cuentos", 5, "Editorial Sur"),
            ("El Aleph", "Jorge Luis Borges", "978-8499089515", 1949, "Cuentos", 4, "Editorial Losada"),
        ] {
            library.insert_book(BookRow {
                id_libro: 0,
                titulo: titulo.to_string(),
                autor: autor.to_string(),
                isbn: Some(isbn.to_string()),
                anio_publicacion: Some(anio),
                genero: Some(genero.to_string()),
                numero_copias: copias,
                copias_disponibles: copias,
                editorial: Some(editorial.to_string()),
                fecha_registro: today(),
            });
        }
        library
    }

    fn insert_user(&mut self, nombre: &str, email: &str, password: &str, rol: &str) -> i64 {
        self.next_user += 1;
        let id = self.next_user;
        self.users.insert(
            id,
            UserRow {
                id_usuario: id,
                nombre: nombre.to_string(),
                email: email.to_string(),
                rol: rol.to_string(),
                activo: "S".to_string(),
                fecha_registro: today(),
                password: password.to_string(),
            },
        );
        id
    }

    fn insert_book(&mut self, mut book: BookRow) -> i64 {
        self.next_book += 1;
        book.id_libro = self.next_book;
        self.books.insert(book.id_libro, book);
        self.next_book
    }

    fn email_taken(&self, email: &str) -> bool {
        self.users.values().any(|u| u.email == email)
    }

    fn books_by_title(&self) -> Vec<BookRow> {
        let mut books: Vec<BookRow> = self.books.values().cloned().collect();
        books.sort_by(|a, b| a.titulo.cmp(&b.titulo));
        books
    }

    /// Loan row joined with book and user columns.
    fn loan_view(&self, loan: &LoanRow) -> Value {
        let mut row = serde_json::to_value(loan).unwrap_or_else(|_| json!({}));
        if let Some(book) = self.books.get(&loan.id_libro) {
            row["TITULO"] = json!(book.titulo);
            row["AUTOR"] = json!(book.autor);
        }
        if let Some(user) = self.users.get(&loan.id_usuario) {
            row["NOMBRE_USUARIO"] = json!(user.nombre);
            row["EMAIL"] = json!(user.email);
        }
        row
    }
}

#[derive(Clone)]
struct AppState {
    db: Arc<RwLock<Library>>,
    options: MockOptions,
}

/// An error answered as `{"error": message}`.
#[derive(Debug)]
pub struct ApiFailure {
    status: StatusCode,
    message: String,
}

impl ApiFailure {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiFailure>;

pub fn app() -> Router {
    app_with(MockOptions::default())
}

pub fn app_with(options: MockOptions) -> Router {
    let state = AppState {
        db: Arc::new(RwLock::new(Library::seeded())),
        options,
    };
    Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/login", post(login))
        .route("/api/auth/register", post(register))
        .route("/api/libros/", get(list_books).post(create_book))
        .route("/api/libros/generos", get(list_genres))
        .route("/api/libros/search", get(search_books))
        .route("/api/libros/bajo-stock", get(low_stock))
        .route("/api/libros/{id}", get(get_book).put(update_book).delete(delete_book))
        .route("/api/libros/{id}/copias", patch(update_copies))
        .route("/api/prestamos/", get(list_loans).post(create_loan))
        .route("/api/prestamos/activos", get(active_loans))
        .route("/api/prestamos/vencidos", get(overdue_loans))
        .route("/api/prestamos/usuario/{id}", get(loans_by_user))
        .route("/api/prestamos/{id}/devolver", put(return_loan))
        .route("/api/usuarios/", get(list_users))
        .route("/api/usuarios/admin", post(create_user))
        .route("/api/usuarios/{id}", get(get_user).put(update_user).delete(delete_user))
        .route("/api/usuarios/{id}/estado", patch(toggle_user))
        .fallback(|| async { ApiFailure::not_found("Endpoint no encontrado") })
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with(listener, MockOptions::default()).await
}

pub async fn run_with(listener: TcpListener, options: MockOptions) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(options)).await
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Resolve the bearer token to a user, as the production token check does.
fn authenticate(db: &Library, headers: &HeaderMap) -> ApiResult<UserRow> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiFailure::unauthorized("Token requerido"))?;
    let token = value
        .split(' ')
        .nth(1)
        .ok_or_else(|| ApiFailure::unauthorized("Formato de token inválido"))?;
    db.tokens
        .get(token)
        .and_then(|id| db.users.get(id))
        .cloned()
        .ok_or_else(|| ApiFailure::unauthorized("Token inválido"))
}

fn require_librarian(db: &Library, headers: &HeaderMap) -> ApiResult<UserRow> {
    let user = authenticate(db, headers)?;
    if user.rol != LIBRARIAN {
        return Err(ApiFailure::new(
            StatusCode::FORBIDDEN,
            "No tiene permisos para realizar esta acción",
        ));
    }
    Ok(user)
}

fn str_field<'a>(body: &'a Value, name: &str) -> Option<&'a str> {
    body.get(name).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn int_param(params: &HashMap<String, String>, name: &str, default: i64) -> i64 {
    params.get(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn ack(message: impl Into<String>) -> Json<Value> {
    Json(json!({ "success": true, "message": message.into() }))
}

fn created(message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (StatusCode::CREATED, ack(message))
}

// ---------------------------------------------------------------------------
// health / auth
// ---------------------------------------------------------------------------

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "database": "connected" }))
}

async fn login(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<Json<Value>> {
    let (Some(email), Some(password)) = (str_field(&body, "email"), str_field(&body, "password")) else {
        return Err(ApiFailure::bad_request("Email y contraseña son requeridos"));
    };
    let mut db = state.db.write().await;
    let user = db
        .users
        .values()
        .find(|u| u.email == email && u.activo == "S")
        .cloned();
    let Some(user) = user.filter(|u| u.password == password) else {
        warn!(email, "failed login attempt");
        return Err(ApiFailure::unauthorized("Credenciales inválidas"));
    };
    let token = Uuid::new_v4().to_string();
    db.tokens.insert(token.clone(), user.id_usuario);
    info!(email, "login succeeded");
    Ok(Json(json!({
        "success": true,
        "token": token,
        "user": {
            "id": user.id_usuario,
            "nombre": user.nombre,
            "email": user.email,
            "rol": user.rol,
        },
        "message": "Login exitoso",
    })))
}

/// Self-registration always creates a reader, whatever role was sent.
async fn register(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<(StatusCode, Json<Value>)> {
    let (Some(nombre), Some(email), Some(password)) = (
        str_field(&body, "nombre"),
        str_field(&body, "email"),
        str_field(&body, "password"),
    ) else {
        return Err(ApiFailure::bad_request("Nombre, email y contraseña son requeridos"));
    };
    if password.chars().count() < 6 {
        return Err(ApiFailure::bad_request("La contraseña debe tener al menos 6 caracteres"));
    }
    let mut db = state.db.write().await;
    if db.email_taken(email) {
        return Err(ApiFailure::bad_request("El email ya está registrado"));
    }
    db.insert_user(nombre, email, password, READER);
    info!(email, "user registered");
    Ok(created("Usuario registrado exitosamente"))
}

// ---------------------------------------------------------------------------
// books
// ---------------------------------------------------------------------------

async fn list_books(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Value>> {
    let db = state.db.read().await;
    authenticate(&db, &headers)?;
    let page = int_param(&params, "page", 1).max(1);
    let mut per_page = int_param(&params, "per_page", 100);
    if !(1..=500).contains(&per_page) {
        per_page = 100;
    }
    let books = db.books_by_title();
    let total = books.len() as i64;
    let offset = usize::try_from((page - 1) * per_page).unwrap_or(usize::MAX);
    let slice: Vec<BookRow> = books
        .into_iter()
        .skip(offset)
        .take(per_page as usize)
        .collect();

    if !state.options.paginated_books {
        return Ok(Json(json!(slice)));
    }
    Ok(Json(json!({
        "libros": slice,
        "page": page,
        "per_page": per_page,
        "total": total,
        "total_pages": (total + per_page - 1) / per_page,
    })))
}

async fn get_book(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<i64>) -> ApiResult<Json<BookRow>> {
    let db = state.db.read().await;
    authenticate(&db, &headers)?;
    db.books
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiFailure::not_found("Libro no encontrado"))
}

async fn list_genres(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Vec<String>>> {
    let db = state.db.read().await;
    authenticate(&db, &headers)?;
    let mut genres: Vec<String> = db.books.values().filter_map(|b| b.genero.clone()).collect();
    genres.sort();
    genres.dedup();
    Ok(Json(genres))
}

async fn search_books(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Vec<BookRow>>> {
    let db = state.db.read().await;
    authenticate(&db, &headers)?;
    let mut limit = int_param(&params, "limit", 200);
    if !(1..=500).contains(&limit) {
        limit = 200;
    }
    let filter = |name: &str| params.get(name).cloned().unwrap_or_default();
    let (titulo, autor, genero) = (filter("titulo"), filter("autor"), filter("genero"));
    let books = db
        .books_by_title()
        .into_iter()
        .filter(|b| contains_ci(Some(b.titulo.as_str()), &titulo))
        .filter(|b| contains_ci(Some(b.autor.as_str()), &autor))
        .filter(|b| contains_ci(b.genero.as_deref(), &genero))
        .take(limit as usize)
        .collect::<Vec<_>>();
    info!(results = books.len(), "book search");
    Ok(Json(books))
}

/// Case-insensitive substring match; an empty filter matches everything.
fn contains_ci(value: Option<&str>, filter: &str) -> bool {
    filter.is_empty() || value.is_some_and(|v| v.to_uppercase().contains(&filter.to_uppercase()))
}

fn book_from_body(body: &Value) -> (Option<String>, Option<i32>, Option<String>, Option<String>) {
    (
        str_field(body, "isbn").map(str::to_string),
        body.get("anio_publicacion")
            .and_then(Value::as_i64)
            .and_then(|y| i32::try_from(y).ok()),
        str_field(body, "genero").map(str::to_string),
        str_field(body, "editorial").map(str::to_string),
    )
}

async fn create_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut db = state.db.write().await;
    require_librarian(&db, &headers)?;
    for field in ["titulo", "autor"] {
        if str_field(&body, field).is_none() {
            return Err(ApiFailure::bad_request(format!("El campo {field} es requerido")));
        }
    }
    let copias = body.get("numero_copias").and_then(Value::as_i64).unwrap_or(1);
    let (isbn, anio_publicacion, genero, editorial) = book_from_body(&body);
    db.insert_book(BookRow {
        id_libro: 0,
        titulo: str_field(&body, "titulo").unwrap_or_default().to_string(),
        autor: str_field(&body, "autor").unwrap_or_default().to_string(),
        isbn,
        anio_publicacion,
        genero,
        numero_copias: copias,
        copias_disponibles: copias,
        editorial,
        fecha_registro: today(),
    });
    Ok(created("Libro creado exitosamente"))
}

/// Replaces the book. Changing `numero_copias` shifts the available count by
/// the same amount and may not drop it below zero.
async fn update_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let mut db = state.db.write().await;
    require_librarian(&db, &headers)?;
    let book = db
        .books
        .get_mut(&id)
        .ok_or_else(|| ApiFailure::not_found("Libro no encontrado"))?;

    let nuevas_copias = body
        .get("numero_copias")
        .and_then(Value::as_i64)
        .unwrap_or(book.numero_copias);
    let nuevas_disponibles = book.copias_disponibles + (nuevas_copias - book.numero_copias);
    if nuevas_disponibles < 0 {
        let prestadas = book.numero_copias - book.copias_disponibles;
        return Err(ApiFailure::bad_request(format!(
            "No se puede reducir a {nuevas_copias} copias. Hay {prestadas} copias prestadas."
        )));
    }

    let (isbn, anio_publicacion, genero, editorial) = book_from_body(&body);
    book.titulo = str_field(&body, "titulo").unwrap_or_default().to_string();
    book.autor = str_field(&body, "autor").unwrap_or_default().to_string();
    book.isbn = isbn;
    book.anio_publicacion = anio_publicacion;
    book.genero = genero;
    book.editorial = editorial;
    book.numero_copias = nuevas_copias;
    book.copias_disponibles = nuevas_disponibles;
    Ok(ack(format!(
        "Libro actualizado exitosamente. Copias disponibles: {nuevas_disponibles}"
    )))
}

async fn update_copies(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let mut db = state.db.write().await;
    authenticate(&db, &headers)?;
    let copias = body
        .get("copias_disponibles")
        .and_then(Value::as_i64)
        .ok_or_else(|| ApiFailure::bad_request("copias_disponibles es requerido"))?;
    let book = db
        .books
        .get_mut(&id)
        .ok_or_else(|| ApiFailure::not_found("Libro no encontrado"))?;
    book.copias_disponibles = copias;
    Ok(ack("Copias actualizadas exitosamente"))
}

async fn delete_book(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<i64>) -> ApiResult<Json<Value>> {
    let mut db = state.db.write().await;
    require_librarian(&db, &headers)?;
    db.books
        .remove(&id)
        .map(|_| ack("Libro eliminado exitosamente"))
        .ok_or_else(|| ApiFailure::not_found("Libro no encontrado"))
}

async fn low_stock(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Vec<Value>>> {
    let db = state.db.read().await;
    authenticate(&db, &headers)?;
    let mut books: Vec<&BookRow> = db.books.values().filter(|b| b.copias_disponibles < 2).collect();
    books.sort_by_key(|b| b.copias_disponibles);
    Ok(Json(
        books
            .into_iter()
            .map(|b| {
                json!({
                    "ID_LIBRO": b.id_libro,
                    "TITULO": b.titulo,
                    "AUTOR": b.autor,
                    "COPIAS_DISPONIBLES": b.copias_disponibles,
                    "NUMERO_COPIAS": b.numero_copias,
                })
            })
            .collect(),
    ))
}

// ---------------------------------------------------------------------------
// loans
// ---------------------------------------------------------------------------

fn is_open(loan: &LoanRow) -> bool {
    loan.estado == "ACTIVO" || loan.estado == "VENCIDO"
}

async fn list_loans(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Vec<Value>>> {
    let db = state.db.read().await;
    authenticate(&db, &headers)?;
    let mut loans: Vec<&LoanRow> = db.loans.values().collect();
    loans.sort_by(|a, b| b.fecha_prestamo.cmp(&a.fecha_prestamo));
    Ok(Json(loans.into_iter().map(|l| db.loan_view(l)).collect()))
}

async fn active_loans(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Vec<Value>>> {
    let db = state.db.read().await;
    authenticate(&db, &headers)?;
    let mut loans: Vec<&LoanRow> = db.loans.values().filter(|l| is_open(l)).collect();
    loans.sort_by_key(|l| l.fecha_devolucion_esperada);
    Ok(Json(loans.into_iter().map(|l| db.loan_view(l)).collect()))
}

async fn overdue_loans(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Vec<Value>>> {
    let db = state.db.read().await;
    authenticate(&db, &headers)?;
    let today = today();
    let mut loans: Vec<&LoanRow> = db
        .loans
        .values()
        .filter(|l| l.estado == "ACTIVO" && l.fecha_devolucion_esperada < today)
        .collect();
    loans.sort_by_key(|l| l.fecha_devolucion_esperada);
    Ok(Json(loans.into_iter().map(|l| db.loan_view(l)).collect()))
}

async fn loans_by_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<Value>>> {
    let db = state.db.read().await;
    authenticate(&db, &headers)?;
    let mut loans: Vec<&LoanRow> = db.loans.values().filter(|l| l.id_usuario == id).collect();
    loans.sort_by(|a, b| b.fecha_prestamo.cmp(&a.fecha_prestamo));
    Ok(Json(
        loans
            .into_iter()
            .map(|l| {
                let mut row = db.loan_view(l);
                if let Some(obj) = row.as_object_mut() {
                    for column in ["ID_USUARIO", "NOMBRE_USUARIO", "EMAIL"] {
                        obj.remove(column);
                    }
                }
                row
            })
            .collect(),
    ))
}

/// Opens a loan and takes one available copy. `dias_prestamo` defaults to 14
/// and may be negative, which produces an already overdue loan.
async fn create_loan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut db = state.db.write().await;
    require_librarian(&db, &headers)?;
    let (Some(id_libro), Some(id_usuario)) = (
        body.get("id_libro").and_then(Value::as_i64),
        body.get("id_usuario").and_then(Value::as_i64),
    ) else {
        return Err(ApiFailure::bad_request("id_libro e id_usuario son requeridos"));
    };
    let dias = body.get("dias_prestamo").and_then(Value::as_i64).unwrap_or(14);

    let book = db
        .books
        .get_mut(&id_libro)
        .filter(|b| b.copias_disponibles > 0)
        .ok_or_else(|| ApiFailure::bad_request("No hay copias disponibles"))?;
    book.copias_disponibles -= 1;

    let prestado = today();
    let offset = Days::new(dias.unsigned_abs());
    let esperada = if dias >= 0 {
        prestado.checked_add_days(offset)
    } else {
        prestado.checked_sub_days(offset)
    }
    .unwrap_or(prestado);

    db.next_loan += 1;
    let id = db.next_loan;
    db.loans.insert(
        id,
        LoanRow {
            id_prestamo: id,
            id_libro,
            id_usuario,
            fecha_prestamo: prestado,
            fecha_devolucion_esperada: esperada,
            fecha_devolucion_real: None,
            estado: "ACTIVO".to_string(),
        },
    );
    Ok(created("Préstamo creado exitosamente"))
}

async fn return_loan(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<i64>) -> ApiResult<Json<Value>> {
    let mut db = state.db.write().await;
    require_librarian(&db, &headers)?;
    let loan = db
        .loans
        .get_mut(&id)
        .filter(|l| l.estado != "DEVUELTO")
        .ok_or_else(|| ApiFailure::not_found("Préstamo no encontrado o ya devuelto"))?;
    loan.estado = "DEVUELTO".to_string();
    loan.fecha_devolucion_real = Some(today());
    let id_libro = loan.id_libro;
    if let Some(book) = db.books.get_mut(&id_libro) {
        book.copias_disponibles += 1;
    }
    Ok(ack("Devolución registrada exitosamente"))
}

// ---------------------------------------------------------------------------
// users
// ---------------------------------------------------------------------------

async fn list_users(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Vec<UserRow>>> {
    let db = state.db.read().await;
    authenticate(&db, &headers)?;
    let mut users: Vec<UserRow> = db.users.values().cloned().collect();
    users.sort_by(|a, b| a.nombre.cmp(&b.nombre));
    Ok(Json(users))
}

async fn get_user(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<i64>) -> ApiResult<Json<UserRow>> {
    let db = state.db.read().await;
    authenticate(&db, &headers)?;
    db.users
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiFailure::not_found("Usuario no encontrado"))
}

async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut db = state.db.write().await;
    require_librarian(&db, &headers)?;
    let (Some(nombre), Some(email), Some(password), Some(rol)) = (
        str_field(&body, "nombre"),
        str_field(&body, "email"),
        str_field(&body, "password"),
        str_field(&body, "rol"),
    ) else {
        return Err(ApiFailure::bad_request("Nombre, email, contraseña y rol son requeridos"));
    };
    if rol != READER && rol != LIBRARIAN {
        return Err(ApiFailure::bad_request("Rol inválido. Debe ser LECTOR o BIBLIOTECARIO"));
    }
    if password.chars().count() < 6 {
        return Err(ApiFailure::bad_request("La contraseña debe tener al menos 6 caracteres"));
    }
    if db.email_taken(email) {
        return Err(ApiFailure::bad_request("El email ya está registrado"));
    }
    db.insert_user(nombre, email, password, rol);
    info!(email, rol, "user created by librarian");
    Ok(created(format!("Usuario creado exitosamente como {rol}")))
}

async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let mut db = state.db.write().await;
    require_librarian(&db, &headers)?;
    let user = db
        .users
        .get_mut(&id)
        .ok_or_else(|| ApiFailure::not_found("Usuario no encontrado"))?;
    user.nombre = str_field(&body, "nombre").unwrap_or_default().to_string();
    user.email = str_field(&body, "email").unwrap_or_default().to_string();
    user.rol = str_field(&body, "rol").unwrap_or_default().to_string();
    Ok(ack("Usuario actualizado exitosamente"))
}

async fn toggle_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let mut db = state.db.write().await;
    require_librarian(&db, &headers)?;
    let activo = match body.get("activo").and_then(Value::as_str) {
        Some(flag @ ("S" | "N")) => flag.to_string(),
        _ => return Err(ApiFailure::bad_request("Estado inválido. Debe ser 'S' o 'N'")),
    };
    let user = db
        .users
        .get_mut(&id)
        .ok_or_else(|| ApiFailure::not_found("Usuario no encontrado"))?;
    let texto = if activo == "S" { "activado" } else { "desactivado" };
    user.activo = activo;
    info!(id, texto, "user state changed");
    Ok(ack(format!("Usuario {texto} exitosamente")))
}

/// Deletes the user and revokes their tokens, unless they hold open loans.
async fn delete_user(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<i64>) -> ApiResult<Json<Value>> {
    let mut db = state.db.write().await;
    require_librarian(&db, &headers)?;
    if db.loans.values().any(|l| l.id_usuario == id && is_open(l)) {
        return Err(ApiFailure::bad_request(
            "No se puede eliminar el usuario. Tiene préstamos activos.",
        ));
    }
    if db.users.remove(&id).is_none() {
        return Err(ApiFailure::not_found("Usuario no encontrado"));
    }
    db.tokens.retain(|_, user_id| *user_id != id);
    info!(id, "user deleted");
    Ok(ack("Usuario eliminado permanentemente"))
}
