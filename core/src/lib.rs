//! Blocking client for the library-management API.
//!
//! # Overview
//! `ApiClient` is the request facade: it builds authenticated requests from
//! the injected `SessionStore`, sends them through a `Transport`, and
//! normalizes every response into parsed JSON or an `ApiError`. Resource
//! clients (`auth`, `books`, `loans`, `users`) are thin endpoint maps on top.
//!
//! # Design
//! - Session state is passed in explicitly; nothing reads global storage.
//! - Redirects on logout or 401 go through the `Navigator` callback, so the
//!   embedding application decides what navigation means.
//! - `build_request` / `handle_response` are public: hosts that do their own
//!   I/O can skip the transport entirely.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod auth;
pub mod books;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod loans;
pub mod navigator;
pub mod session;
pub mod transport;
pub mod types;
pub mod users;

pub use auth::{AuthApi, AuthGuard};
pub use books::BooksApi;
pub use client::{ApiClient, RequestOptions};
pub use config::ClientConfig;
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use loans::LoansApi;
pub use navigator::{Navigator, NoopNavigator};
pub use session::{FileStorage, MemoryStorage, Session, SessionStore, Storage};
pub use transport::{Transport, UreqTransport};
pub use types::{
    Book, BookInput, BookPage, BookSearch, Credentials, Loan, LoanStatus, LoginResponse, LoginUser, MessageResponse,
    NewLoan, NewUser, Registration, Role, User, UserUpdate,
};
pub use users::UsersApi;
