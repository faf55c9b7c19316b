//! End-to-end runs against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives every resource
//! client over real HTTP through the default `ureq` transport. Validates that
//! request building and response normalization agree with the server.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use biblioteca_core::{
    ApiClient, ApiError, BookInput, BookSearch, ClientConfig, LoanStatus, NewLoan, NewUser, Role, SessionStore,
};
use mock_server::MockOptions;

fn start_server(options: MockOptions) -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run_with(listener, options).await
        })
        .unwrap();
    });
    addr
}

fn client_for(addr: SocketAddr) -> (ApiClient, Arc<Mutex<Vec<String>>>) {
    let redirects = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&redirects);
    let client = ApiClient::new(ClientConfig::new(&format!("http://{addr}/api")), SessionStore::in_memory())
        .with_navigator(move |path: &str| sink.lock().unwrap().push(path.to_string()));
    (client, redirects)
}

#[test]
fn librarian_workflow() {
    let addr = start_server(MockOptions::default());
    let (client, redirects) = client_for(addr);

    // Step 1: unauthenticated call is rejected and redirects.
    assert!(!client.guard().is_authenticated());
    let err = client.books().genres().unwrap_err();
    assert!(matches!(err, ApiError::AuthenticationExpired));
    assert_eq!(redirects.lock().unwrap().len(), 1);

    // Step 2: log in; the session is stored.
    let login = client.auth().login("admin@biblioteca.com", "admin123").unwrap();
    assert_eq!(login.user.nombre, "Admin Biblioteca");
    assert!(client.guard().is_authenticated());
    assert!(client.guard().has_role(Role::Bibliotecario));

    // Step 3: paginated list.
    let page = client.books().list(1, 4).unwrap();
    assert_eq!(page.total(), 6);
    assert_eq!(page.libros.len(), 4);
    assert_eq!(page.total_pages(), Some(2));
    assert_eq!(page.books().unwrap()[0].titulo, "1984");

    // Step 4: create and find a book.
    let input = BookInput {
        titulo: "Pedro Paramo".to_string(),
        autor: "Juan Rulfo".to_string(),
        genero: Some("Realismo Magico".to_string()),
        numero_copias: Some(2),
        ..BookInput::default()
    };
    let ack = client.books().create(&input).unwrap();
    assert!(ack.success);
    let found = client
        .books()
        .search(&BookSearch {
            titulo: Some("pedro".to_string()),
            ..BookSearch::default()
        })
        .unwrap();
    assert_eq!(found.len(), 1);
    let id = found[0].id_libro;
    assert_eq!(client.books().get(id).unwrap().copias_disponibles, Some(2));

    // Step 5: lend it overdue, then return it.
    client
        .loans()
        .create(&NewLoan {
            id_libro: id,
            id_usuario: 2,
            dias_prestamo: Some(-1),
        })
        .unwrap();
    let overdue = client.loans().overdue().unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].titulo.as_deref(), Some("Pedro Paramo"));
    assert_eq!(client.books().get(id).unwrap().copias_disponibles, Some(1));

    let loan_id = overdue[0].id_prestamo;
    client.loans().mark_returned(loan_id).unwrap();
    let history = client.loans().by_user(2).unwrap();
    assert_eq!(history[0].estado, Some(LoanStatus::Devuelto));
    assert!(history[0].fecha_devolucion_real.is_some());

    // Step 6: server error messages come through.
    let err = client.loans().mark_returned(loan_id).unwrap_err();
    assert_eq!(err.to_string(), "Préstamo no encontrado o ya devuelto");
    assert_eq!(err.status(), Some(404));

    // Step 7: low stock and genres.
    let low = client.books().low_stock().unwrap();
    assert!(low.iter().any(|b| b.titulo == "Rayuela"));
    assert!(client.books().genres().unwrap().contains(&"Cuentos".to_string()));

    // Step 8: delete the book.
    client.books().delete(id).unwrap();
    let err = client.books().get(id).unwrap_err();
    assert_eq!(err.to_string(), "Libro no encontrado");

    // Step 9: health does not need the session.
    assert_eq!(client.health().unwrap()["status"], "healthy");

    // Step 10: logout.
    client.guard().logout();
    assert!(!client.guard().is_authenticated());
    assert_eq!(redirects.lock().unwrap().len(), 2);
}

#[test]
fn user_administration() {
    let addr = start_server(MockOptions::default());
    let (client, _) = client_for(addr);
    client.auth().login("admin@biblioteca.com", "admin123").unwrap();

    client
        .users()
        .create_admin(&NewUser {
            nombre: "Lucia Rojas".to_string(),
            email: "lucia@biblioteca.com".to_string(),
            password: "secreto1".to_string(),
            rol: Role::Lector.to_string(),
        })
        .unwrap();
    let users = client.users().list().unwrap();
    let lucia = users.iter().find(|u| u.email == "lucia@biblioteca.com").unwrap();
    assert!(lucia.is_active());

    client.users().toggle_active(lucia.id_usuario, false).unwrap();
    assert!(!client.users().get(lucia.id_usuario).unwrap().is_active());

    let err = client
        .users()
        .create_admin(&NewUser {
            nombre: "Otra".to_string(),
            email: "lucia@biblioteca.com".to_string(),
            password: "secreto1".to_string(),
            rol: "LECTOR".to_string(),
        })
        .unwrap_err();
    assert_eq!(err.to_string(), "El email ya está registrado");

    client.users().delete(lucia.id_usuario).unwrap();
    assert!(client.users().get(lucia.id_usuario).is_err());
}

#[test]
fn reader_is_forbidden_but_keeps_session() {
    let addr = start_server(MockOptions::default());
    let (client, redirects) = client_for(addr);

    client
        .auth()
        .register("Nuevo Lector", "nuevo@email.com", "secreto1", "LECTOR")
        .unwrap();
    assert!(!client.guard().is_authenticated());

    client.auth().login("nuevo@email.com", "secreto1").unwrap();
    assert!(client.guard().has_role("LECTOR"));
    assert!(!client.guard().is_librarian());

    let err = client.books().delete(1).unwrap_err();
    assert_eq!(err.status(), Some(403));
    assert!(client.guard().is_authenticated());
    assert!(redirects.lock().unwrap().is_empty());
}

#[test]
fn revoked_token_forces_logout() {
    let addr = start_server(MockOptions::default());
    let (admin, _) = client_for(addr);
    let (reader, redirects) = client_for(addr);

    admin.auth().login("admin@biblioteca.com", "admin123").unwrap();
    admin
        .auth()
        .register("Temporal", "temporal@email.com", "secreto1", "LECTOR")
        .unwrap();
    reader.auth().login("temporal@email.com", "secreto1").unwrap();
    assert!(reader.books().genres().is_ok());

    let id = admin
        .users()
        .list()
        .unwrap()
        .into_iter()
        .find(|u| u.email == "temporal@email.com")
        .unwrap()
        .id_usuario;
    admin.users().delete(id).unwrap();

    let err = reader.books().genres().unwrap_err();
    assert!(matches!(err, ApiError::AuthenticationExpired));
    assert!(reader.session().current_user().is_none());
    assert_eq!(*redirects.lock().unwrap(), vec!["/index.html".to_string()]);
}

#[test]
fn bare_array_book_list_is_wrapped() {
    let addr = start_server(MockOptions { paginated_books: false });
    let (client, _) = client_for(addr);
    client.auth().login("juan@email.com", "lector123").unwrap();

    let page = client.books().list(1, 100).unwrap();
    assert_eq!(page.total(), page.libros.len() as u64);
    assert_eq!(page.total(), 6);
    assert!(page.page().is_none());
}
